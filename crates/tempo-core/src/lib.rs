//! `tempo-core` — shared seams between the tempo engine and its host framework.
//!
//! The engine crates never reach for ambient state: the host hands them a
//! store connection, an account scope, a permission gate and a clock, and
//! every operation takes what it needs explicitly. This crate holds those
//! contracts plus the workspace configuration loader.

pub mod clock;
pub mod config;
pub mod error;
pub mod permissions;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::TempoConfig;
pub use error::{CoreError, Result};
pub use permissions::{Action, AllowAll, PermissionGate};
pub use types::{AccountId, ActorId, Subject, SubjectKind};
