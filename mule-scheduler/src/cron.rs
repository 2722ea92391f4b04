//! Cron evaluation for time triggers.
//!
//! `next_fire` is a pure function of (expression, timezone, from-instant);
//! the scheduler persists its result explicitly after each fire instead of
//! recomputing lazily on read.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::error::{SchedulerError, SchedulerResult};

/// Parse a cron expression.
///
/// The cron crate wants a seconds column; classic five-field expressions get
/// `0` prepended so both forms are accepted.
pub fn parse_schedule(expression: &str) -> SchedulerResult<Schedule> {
    let fields = expression.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
        expression: expression.to_string(),
        message: e.to_string(),
    })
}

/// Parse an IANA timezone name
pub fn parse_timezone(timezone: &str) -> SchedulerResult<Tz> {
    timezone
        .parse::<Tz>()
        .map_err(|_| SchedulerError::UnknownTimezone(timezone.to_string()))
}

/// Compute the first fire instant strictly after `after`, evaluating the
/// expression in the trigger's timezone.
pub fn next_fire(
    expression: &str,
    timezone: &str,
    after: DateTime<Utc>,
) -> SchedulerResult<DateTime<Utc>> {
    let schedule = parse_schedule(expression)?;
    let tz = parse_timezone(timezone)?;

    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(|| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            message: "expression has no future fire time".to_string(),
        })
}
