//! `tempo-schedule` — pure scheduling math.
//!
//! [`next_run`] maps a job's schedule configuration plus "now" to the next
//! due instant. No I/O, no clock reads: callers pass `now` explicitly.
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                              |
//! |------------|--------------------------------------------------------|
//! | `Interval` | Repeat every N seconds                                 |
//! | `Daily`    | Fire at HH:MM in the job's timezone every day          |
//! | `Weekly`   | Fire at HH:MM on a weekday (0 = Monday … 6 = Sunday)   |
//! | `Monthly`  | Fire at HH:MM on a day-of-month, clamped to month end  |
//! | `Cron`     | Full cron expression evaluated in the job's timezone   |
//!
//! Invalid or incomplete configurations are rejected by [`validate`] at
//! job-save time; nothing here ever falls back to a default interval.

pub mod error;
pub mod next_run;
pub mod types;

pub use error::{Result, ScheduleError};
pub use next_run::{next_run, validate};
pub use types::ScheduleConfig;
