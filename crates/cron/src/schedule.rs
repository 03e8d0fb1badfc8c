//! Schedule expressions and next-fire computation.

use std::{fmt, str::FromStr, time::Duration};

use {
    chrono::{DateTime, TimeZone, Utc},
    chrono_tz::Tz,
};

use crate::{Error, Result, parse::parse_interval};

const EVERY_PREFIX: &str = "@every";

/// A parsed schedule.
///
/// Accepted forms:
/// - 5-field cron: `min hour dom month dow`
/// - 6/7-field cron with seconds (and optional year)
/// - descriptors: `@yearly`, `@monthly`, `@weekly`, `@daily`, `@hourly`
/// - fixed intervals: `@every 30s`, `@every 1h30m`
#[derive(Clone)]
pub struct Schedule {
    expr: String,
    kind: Kind,
}

#[derive(Clone)]
enum Kind {
    Cron(Box<cron::Schedule>),
    Every(Duration),
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(Error::EmptySchedule);
        }

        if let Some(interval) = expr.strip_prefix(EVERY_PREFIX) {
            if !interval.starts_with(char::is_whitespace) {
                return Err(Error::invalid_interval(
                    expr,
                    "expected whitespace after @every",
                ));
            }
            return Ok(Self {
                expr: expr.to_string(),
                kind: Kind::Every(parse_interval(interval)?),
            });
        }

        // The `cron` crate wants a leading seconds field.
        let normalized = if expr.split_whitespace().count() == 5 {
            format!("0 {expr}")
        } else {
            expr.to_string()
        };
        let schedule = cron::Schedule::from_str(&normalized).map_err(|source| Error::CronParse {
            expr: expr.to_string(),
            source,
        })?;

        Ok(Self {
            expr: expr.to_string(),
            kind: Kind::Cron(Box::new(schedule)),
        })
    }

    /// The expression this schedule was parsed from.
    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// First fire time strictly after `now`, evaluated in `tz`.
    ///
    /// `None` when a cron expression has no future occurrence.
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        match &self.kind {
            Kind::Cron(schedule) => schedule
                .after(&tz.from_utc_datetime(&now.naive_utc()))
                .next()
                .map(|next| next.with_timezone(&Utc)),
            Kind::Every(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .and_then(|d| now.checked_add_signed(d)),
        }
    }

    /// Time to wait from `now` until the next fire.
    pub(crate) fn delay_from(&self, now: DateTime<Utc>, tz: Tz) -> Option<Duration> {
        match &self.kind {
            // Fixed intervals are measured on the runtime clock, not the wall clock.
            Kind::Every(interval) => Some(*interval),
            Kind::Cron(_) => self
                .next_after(now, tz)
                .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO)),
        }
    }
}

impl FromStr for Schedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Schedule").field(&self.expr).finish()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    // 2024-02-01T00:00:00Z
    fn feb_first() -> DateTime<Utc> {
        DateTime::from_timestamp(1_706_745_600, 0).unwrap()
    }

    #[rstest]
    #[case("0 9 * * *")]
    #[case("*/5 * * * * *")]
    #[case("0 0 12 * * Mon-Fri 2030")]
    #[case("@daily")]
    #[case("@hourly")]
    #[case("@every 30s")]
    #[case("  @every 1h30m ")]
    fn accepts(#[case] expr: &str) {
        let schedule = Schedule::parse(expr).unwrap();
        assert_eq!(schedule.as_str(), expr.trim());
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(Schedule::parse("   "), Err(Error::EmptySchedule)));
    }

    #[rstest]
    #[case("not valid")]
    #[case("61 * * * *")]
    fn rejects_malformed_cron(#[case] expr: &str) {
        assert!(matches!(
            Schedule::parse(expr),
            Err(Error::CronParse { .. })
        ));
    }

    #[rstest]
    #[case("@every1h")]
    #[case("@everyday")]
    #[case("@every")]
    fn every_requires_separated_interval(#[case] expr: &str) {
        assert!(matches!(
            Schedule::parse(expr),
            Err(Error::InvalidInterval { .. })
        ));
    }

    #[test]
    fn rejects_zero_interval() {
        assert!(matches!(
            Schedule::parse("@every 0s"),
            Err(Error::InvalidInterval { .. })
        ));
    }

    #[test]
    fn five_field_fires_at_utc_time() {
        let schedule = Schedule::parse("0 9 * * *").unwrap();
        let next = schedule.next_after(feb_first(), Tz::UTC).unwrap();
        assert_eq!(next.format("%Y-%m-%d %H:%M").to_string(), "2024-02-01 09:00");
    }

    #[test]
    fn cron_is_evaluated_in_zone() {
        let schedule = Schedule::parse("0 9 * * *").unwrap();
        let next = schedule
            .next_after(feb_first(), chrono_tz::Europe::Paris)
            .unwrap();
        // 09:00 CET is 08:00 UTC in winter.
        assert_eq!(next.format("%H:%M").to_string(), "08:00");
    }

    #[test]
    fn every_adds_interval() {
        let schedule = Schedule::parse("@every 90s").unwrap();
        let now = feb_first();
        assert_eq!(
            schedule.next_after(now, Tz::UTC).unwrap() - now,
            chrono::Duration::seconds(90)
        );
        assert_eq!(
            schedule.delay_from(now, Tz::UTC),
            Some(Duration::from_secs(90))
        );
    }
}
