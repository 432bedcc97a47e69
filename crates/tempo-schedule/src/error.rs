use thiserror::Error;

/// Configuration errors raised at job-save time.
///
/// Every variant means the schedule definition itself is wrong; none of
/// these can surface from a config that passed [`crate::validate`].
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Invalid interval: {seconds} (must be at least 1 second)")]
    InvalidInterval { seconds: u64 },

    #[error("Invalid time of day: {hour:02}:{minute:02}")]
    InvalidTimeOfDay { hour: u8, minute: u8 },

    #[error("Invalid day of week: {0} (expected 0=Monday … 6=Sunday)")]
    InvalidDayOfWeek(u8),

    #[error("Invalid day of month: {0} (expected 1–31)")]
    InvalidDayOfMonth(u8),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// The expression parses but yields no occurrence after `now`.
    #[error("Cron expression '{expression}' has no future occurrence")]
    CronExhausted { expression: String },
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
