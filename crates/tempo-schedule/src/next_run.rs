use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Result, ScheduleError};
use crate::types::ScheduleConfig;

/// Reject invalid or incomplete schedule definitions.
///
/// Called at job-save time so a bad config never reaches the scheduler;
/// [`next_run`] also re-checks, keeping it total over arbitrary input.
pub fn validate(config: &ScheduleConfig) -> Result<()> {
    match config {
        ScheduleConfig::Interval { interval_seconds } => {
            if *interval_seconds == 0 {
                return Err(ScheduleError::InvalidInterval {
                    seconds: *interval_seconds,
                });
            }
            Ok(())
        }
        ScheduleConfig::Daily {
            hour,
            minute,
            timezone,
        } => {
            check_time(*hour, *minute)?;
            parse_tz(timezone)?;
            Ok(())
        }
        ScheduleConfig::Weekly {
            day_of_week,
            hour,
            minute,
            timezone,
        } => {
            if *day_of_week > 6 {
                return Err(ScheduleError::InvalidDayOfWeek(*day_of_week));
            }
            check_time(*hour, *minute)?;
            parse_tz(timezone)?;
            Ok(())
        }
        ScheduleConfig::Monthly {
            day_of_month,
            hour,
            minute,
            timezone,
        } => {
            if !(1..=31).contains(day_of_month) {
                return Err(ScheduleError::InvalidDayOfMonth(*day_of_month));
            }
            check_time(*hour, *minute)?;
            parse_tz(timezone)?;
            Ok(())
        }
        ScheduleConfig::Cron {
            expression,
            timezone,
        } => {
            parse_tz(timezone)?;
            parse_cron(expression)?;
            Ok(())
        }
    }
}

/// Compute the next due instant for `config`, strictly after `now`.
///
/// All time-of-day math runs in the schedule's IANA timezone; the result is
/// converted back to UTC. Deterministic: the same `(config, now)` pair
/// always yields the same instant.
pub fn next_run(config: &ScheduleConfig, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    validate(config)?;

    match config {
        ScheduleConfig::Interval { interval_seconds } => {
            Ok(now + Duration::seconds(*interval_seconds as i64))
        }

        ScheduleConfig::Daily {
            hour,
            minute,
            timezone,
        } => {
            let tz = parse_tz(timezone)?;
            let today = now.with_timezone(&tz).date_naive();
            let candidate = resolve_local(tz, today, *hour, *minute)?;
            if candidate > now {
                Ok(candidate)
            } else {
                // Today's slot has passed — roll to tomorrow.
                resolve_local(tz, advance_days(today, 1), *hour, *minute)
            }
        }

        ScheduleConfig::Weekly {
            day_of_week,
            hour,
            minute,
            timezone,
        } => {
            let tz = parse_tz(timezone)?;
            let local_now = now.with_timezone(&tz);
            let today = local_now.date_naive();
            // 0 = Monday … 6 = Sunday, matching num_days_from_monday.
            let today_dow = local_now.weekday().num_days_from_monday() as i64;
            let days_ahead = (*day_of_week as i64 - today_dow).rem_euclid(7);

            let candidate = resolve_local(tz, advance_days(today, days_ahead), *hour, *minute)?;
            if candidate > now {
                Ok(candidate)
            } else {
                // Target weekday is today but the time has passed: a full
                // week out, never zero days.
                resolve_local(tz, advance_days(today, days_ahead + 7), *hour, *minute)
            }
        }

        ScheduleConfig::Monthly {
            day_of_month,
            hour,
            minute,
            timezone,
        } => {
            let tz = parse_tz(timezone)?;
            let local_now = now.with_timezone(&tz);
            let (year, month) = (local_now.year(), local_now.month());

            let candidate = monthly_candidate(tz, year, month, *day_of_month, *hour, *minute)?;
            if candidate > now {
                Ok(candidate)
            } else {
                let (next_year, next_month) = if month == 12 {
                    (year + 1, 1)
                } else {
                    (year, month + 1)
                };
                // Re-clamp: day 31 lands on the last day of the next month too.
                monthly_candidate(tz, next_year, next_month, *day_of_month, *hour, *minute)
            }
        }

        ScheduleConfig::Cron {
            expression,
            timezone,
        } => {
            let tz = parse_tz(timezone)?;
            let schedule = parse_cron(expression)?;
            schedule
                .after(&now.with_timezone(&tz))
                .next()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| ScheduleError::CronExhausted {
                    expression: expression.clone(),
                })
        }
    }
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn check_time(hour: u8, minute: u8) -> Result<()> {
    if hour > 23 || minute > 59 {
        return Err(ScheduleError::InvalidTimeOfDay { hour, minute });
    }
    Ok(())
}

fn parse_tz(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| ScheduleError::UnknownTimezone(name.to_string()))
}

fn parse_cron(expression: &str) -> Result<cron::Schedule> {
    // `cron` wants a seconds field; accept the common 5-field form by
    // pinning seconds to zero.
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    cron::Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

fn advance_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + Duration::days(days)
}

/// Resolve a wall-clock time on `date` in `tz` to a UTC instant.
///
/// DST gaps (the local time does not exist) resolve to the first valid
/// instant after the jump; ambiguous times take the earlier offset.
fn resolve_local(tz: Tz, date: NaiveDate, hour: u8, minute: u8) -> Result<DateTime<Utc>> {
    let naive = date
        .and_hms_opt(hour as u32, minute as u32, 0)
        .ok_or(ScheduleError::InvalidTimeOfDay { hour, minute })?;

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earlier, _) => Ok(earlier.with_timezone(&Utc)),
        LocalResult::None => {
            // Spring-forward gap; DST jumps are one hour everywhere we care
            // about, so the shifted wall time resolves.
            let shifted = naive + Duration::hours(1);
            match tz.from_local_datetime(&shifted) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                    Ok(dt.with_timezone(&Utc))
                }
                LocalResult::None => Err(ScheduleError::UnknownTimezone(tz.to_string())),
            }
        }
    }
}

fn monthly_candidate(
    tz: Tz,
    year: i32,
    month: u32,
    day_of_month: u8,
    hour: u8,
    minute: u8,
) -> Result<DateTime<Utc>> {
    let day = (day_of_month as u32).min(days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(ScheduleError::InvalidDayOfMonth(day_of_month))?;
    resolve_local(tz, date, hour, minute)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn interval_adds_seconds() {
        let config = ScheduleConfig::Interval {
            interval_seconds: 60,
        };
        let now = at(2026, 3, 9, 10, 0);
        assert_eq!(next_run(&config, now).unwrap(), at(2026, 3, 9, 10, 1));
    }

    #[test]
    fn next_run_is_deterministic_and_future() {
        let configs = [
            ScheduleConfig::Interval { interval_seconds: 1 },
            ScheduleConfig::Daily {
                hour: 0,
                minute: 0,
                timezone: "UTC".into(),
            },
            ScheduleConfig::Weekly {
                day_of_week: 6,
                hour: 23,
                minute: 59,
                timezone: "Asia/Tokyo".into(),
            },
            ScheduleConfig::Monthly {
                day_of_month: 31,
                hour: 12,
                minute: 0,
                timezone: "America/New_York".into(),
            },
            ScheduleConfig::Cron {
                expression: "*/5 * * * *".into(),
                timezone: "UTC".into(),
            },
        ];
        let now = at(2026, 2, 28, 23, 59);
        for config in &configs {
            let a = next_run(config, now).unwrap();
            let b = next_run(config, now).unwrap();
            assert_eq!(a, b, "{} not deterministic", config.kind());
            assert!(a > now, "{} not strictly in the future", config.kind());
        }
    }

    #[test]
    fn daily_rolls_to_tomorrow_when_passed() {
        let config = ScheduleConfig::Daily {
            hour: 12,
            minute: 0,
            timezone: "UTC".into(),
        };
        assert_eq!(
            next_run(&config, at(2026, 3, 9, 10, 0)).unwrap(),
            at(2026, 3, 9, 12, 0)
        );
        assert_eq!(
            next_run(&config, at(2026, 3, 9, 13, 0)).unwrap(),
            at(2026, 3, 10, 12, 0)
        );
        // Exactly on the slot counts as passed — strictly greater only.
        assert_eq!(
            next_run(&config, at(2026, 3, 9, 12, 0)).unwrap(),
            at(2026, 3, 10, 12, 0)
        );
    }

    #[test]
    fn daily_respects_timezone() {
        // 2026-03-10: New York is on EDT (UTC-4).
        let config = ScheduleConfig::Daily {
            hour: 10,
            minute: 0,
            timezone: "America/New_York".into(),
        };
        // 15:00 UTC = 11:00 EDT, today's 10:00 has passed.
        assert_eq!(
            next_run(&config, at(2026, 3, 10, 15, 0)).unwrap(),
            at(2026, 3, 11, 14, 0)
        );
    }

    #[test]
    fn weekly_same_day_before_time_fires_today() {
        // 2026-03-09 is a Monday.
        let config = ScheduleConfig::Weekly {
            day_of_week: 0,
            hour: 10,
            minute: 0,
            timezone: "UTC".into(),
        };
        assert_eq!(
            next_run(&config, at(2026, 3, 9, 9, 0)).unwrap(),
            at(2026, 3, 9, 10, 0)
        );
    }

    #[test]
    fn weekly_same_day_after_time_advances_a_full_week() {
        let config = ScheduleConfig::Weekly {
            day_of_week: 0,
            hour: 10,
            minute: 0,
            timezone: "UTC".into(),
        };
        assert_eq!(
            next_run(&config, at(2026, 3, 9, 11, 0)).unwrap(),
            at(2026, 3, 16, 10, 0)
        );
    }

    #[test]
    fn weekly_later_in_week() {
        // Friday (4) from Monday 2026-03-09.
        let config = ScheduleConfig::Weekly {
            day_of_week: 4,
            hour: 8,
            minute: 30,
            timezone: "UTC".into(),
        };
        assert_eq!(
            next_run(&config, at(2026, 3, 9, 12, 0)).unwrap(),
            at(2026, 3, 13, 8, 30)
        );
    }

    #[test]
    fn weekly_earlier_in_week_wraps() {
        // Monday (0) requested on Friday 2026-03-13 → next Monday.
        let config = ScheduleConfig::Weekly {
            day_of_week: 0,
            hour: 10,
            minute: 0,
            timezone: "UTC".into(),
        };
        assert_eq!(
            next_run(&config, at(2026, 3, 13, 12, 0)).unwrap(),
            at(2026, 3, 16, 10, 0)
        );
    }

    #[test]
    fn monthly_day_31_clamps_to_short_month() {
        let config = ScheduleConfig::Monthly {
            day_of_month: 31,
            hour: 6,
            minute: 0,
            timezone: "UTC".into(),
        };
        // April has 30 days.
        assert_eq!(
            next_run(&config, at(2026, 4, 10, 0, 0)).unwrap(),
            at(2026, 4, 30, 6, 0)
        );
        // February 2026 has 28 days.
        assert_eq!(
            next_run(&config, at(2026, 2, 1, 0, 0)).unwrap(),
            at(2026, 2, 28, 6, 0)
        );
    }

    #[test]
    fn monthly_passed_advances_and_reclamps() {
        let config = ScheduleConfig::Monthly {
            day_of_month: 31,
            hour: 6,
            minute: 0,
            timezone: "UTC".into(),
        };
        // Past Feb 28 06:00 — next occurrence is March 31.
        assert_eq!(
            next_run(&config, at(2026, 2, 28, 7, 0)).unwrap(),
            at(2026, 3, 31, 6, 0)
        );
        // Past Dec 31 — wraps the year.
        assert_eq!(
            next_run(&config, at(2026, 12, 31, 7, 0)).unwrap(),
            at(2027, 1, 31, 6, 0)
        );
    }

    #[test]
    fn cron_five_field_form_is_accepted() {
        let config = ScheduleConfig::Cron {
            expression: "30 9 * * *".into(),
            timezone: "UTC".into(),
        };
        assert_eq!(
            next_run(&config, at(2026, 3, 9, 8, 0)).unwrap(),
            at(2026, 3, 9, 9, 30)
        );
        assert_eq!(
            next_run(&config, at(2026, 3, 9, 9, 30)).unwrap(),
            at(2026, 3, 10, 9, 30)
        );
    }

    #[test]
    fn cron_runs_in_configured_timezone() {
        // 09:30 Tokyo = 00:30 UTC.
        let config = ScheduleConfig::Cron {
            expression: "30 9 * * *".into(),
            timezone: "Asia/Tokyo".into(),
        };
        assert_eq!(
            next_run(&config, at(2026, 3, 9, 0, 0)).unwrap(),
            at(2026, 3, 9, 0, 30)
        );
    }

    #[test]
    fn dst_gap_resolves_past_the_jump() {
        // Berlin springs forward 2026-03-29 02:00 → 03:00; 02:30 never exists.
        let config = ScheduleConfig::Daily {
            hour: 2,
            minute: 30,
            timezone: "Europe/Berlin".into(),
        };
        // 00:00 UTC is 01:00 CET; the 02:30 slot resolves to 03:30 CEST = 01:30 UTC.
        assert_eq!(
            next_run(&config, at(2026, 3, 29, 0, 0)).unwrap(),
            at(2026, 3, 29, 1, 30)
        );
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let cases = [
            ScheduleConfig::Interval { interval_seconds: 0 },
            ScheduleConfig::Daily {
                hour: 24,
                minute: 0,
                timezone: "UTC".into(),
            },
            ScheduleConfig::Weekly {
                day_of_week: 7,
                hour: 0,
                minute: 0,
                timezone: "UTC".into(),
            },
            ScheduleConfig::Monthly {
                day_of_month: 0,
                hour: 0,
                minute: 0,
                timezone: "UTC".into(),
            },
            ScheduleConfig::Monthly {
                day_of_month: 32,
                hour: 0,
                minute: 0,
                timezone: "UTC".into(),
            },
            ScheduleConfig::Daily {
                hour: 9,
                minute: 0,
                timezone: "Mars/Olympus_Mons".into(),
            },
            ScheduleConfig::Cron {
                expression: "not a cron".into(),
                timezone: "UTC".into(),
            },
        ];
        for config in &cases {
            assert!(validate(config).is_err(), "accepted: {config:?}");
            assert!(
                next_run(config, at(2026, 1, 1, 0, 0)).is_err(),
                "computed: {config:?}"
            );
        }
    }
}
