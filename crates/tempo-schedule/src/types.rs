use serde::{Deserialize, Serialize};

/// Defines when and how often a job should run.
///
/// Stored JSON-encoded in the job row. Time-of-day variants carry an IANA
/// timezone name; all occurrence math happens in that zone, never in the
/// server's local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleConfig {
    /// Run repeatedly with a fixed interval in seconds.
    Interval { interval_seconds: u64 },

    /// Run every day at the given hour and minute.
    Daily {
        hour: u8,
        minute: u8,
        #[serde(default = "default_timezone")]
        timezone: String,
    },

    /// Run on a specific weekday (0 = Monday … 6 = Sunday).
    Weekly {
        day_of_week: u8,
        hour: u8,
        minute: u8,
        #[serde(default = "default_timezone")]
        timezone: String,
    },

    /// Run on a day of the month, clamped to the month's length
    /// (day 31 in February fires on the last day of February).
    Monthly {
        day_of_month: u8,
        hour: u8,
        minute: u8,
        #[serde(default = "default_timezone")]
        timezone: String,
    },

    /// Run according to a cron expression.
    Cron {
        expression: String,
        #[serde(default = "default_timezone")]
        timezone: String,
    },
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl ScheduleConfig {
    /// Schedule type tag as stored in logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleConfig::Interval { .. } => "interval",
            ScheduleConfig::Daily { .. } => "daily",
            ScheduleConfig::Weekly { .. } => "weekly",
            ScheduleConfig::Monthly { .. } => "monthly",
            ScheduleConfig::Cron { .. } => "cron",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip_with_tag() {
        let config = ScheduleConfig::Weekly {
            day_of_week: 2,
            hour: 9,
            minute: 30,
            timezone: "Europe/Berlin".to_string(),
        };
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(json.contains("\"kind\":\"weekly\""));
        let parsed: ScheduleConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, config);
    }

    #[test]
    fn timezone_defaults_to_utc() {
        let parsed: ScheduleConfig =
            serde_json::from_str(r#"{"kind":"daily","hour":6,"minute":0}"#).expect("deserialize");
        match parsed {
            ScheduleConfig::Daily { timezone, .. } => assert_eq!(timezone, "UTC"),
            other => panic!("expected daily, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_fails_to_parse() {
        let result = serde_json::from_str::<ScheduleConfig>(r#"{"kind":"hourly"}"#);
        assert!(result.is_err());
    }
}
