//! Parsing for `@every` interval literals.

use std::time::Duration;

use crate::{Error, Result};

/// Parse a human-friendly interval such as `"30s"`, `"5m"`, `"2h"` or `"1d"`.
///
/// Several units may be chained (`"1h30m"`). Zero-length intervals are
/// rejected since they would fire continuously.
pub fn parse_interval(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_interval(input, "empty interval"));
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| Error::invalid_interval(input, "missing unit suffix (s/m/h/d)"))?;
        if digits == 0 {
            return Err(Error::invalid_interval(input, "expected a number"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| Error::invalid_interval(input, "number out of range"))?;

        let after = &rest[digits..];
        let unit_len = after
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(after.len());
        let secs = match &after[..unit_len] {
            "s" => value,
            "m" => value.saturating_mul(60),
            "h" => value.saturating_mul(3_600),
            "d" => value.saturating_mul(86_400),
            other => {
                return Err(Error::invalid_interval(
                    input,
                    format!("unknown unit '{other}' (expected s/m/h/d)"),
                ));
            },
        };
        total = total.saturating_add(Duration::from_secs(secs));
        rest = &after[unit_len..];
    }

    if total.is_zero() {
        return Err(Error::invalid_interval(input, "interval must be > 0"));
    }
    Ok(total)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("30s", 30)]
    #[case("5m", 300)]
    #[case("2h", 7_200)]
    #[case("1d", 86_400)]
    #[case("1h30m", 5_400)]
    #[case("  10m  ", 600)]
    fn parses_intervals(#[case] input: &str, #[case] secs: u64) {
        assert_eq!(parse_interval(input).unwrap(), Duration::from_secs(secs));
    }

    #[rstest]
    #[case("")]
    #[case("100")]
    #[case("0s")]
    #[case("10x")]
    #[case("m")]
    fn rejects_bad_intervals(#[case] input: &str) {
        assert!(matches!(
            parse_interval(input),
            Err(Error::InvalidInterval { .. })
        ));
    }
}
