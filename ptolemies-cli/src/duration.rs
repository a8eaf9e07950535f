//! `--retention` parsing: `<number><unit>` where unit is one of `s`, `m`,
//! `h`, `d` (e.g. `30d`, `12h`). No fractional values, no combined units.

use crate::error::CliError;

pub fn parse_retention(raw: &str) -> Result<chrono::Duration, CliError> {
    let bad = |message: String| CliError::BadRetention {
        value: raw.to_string(),
        message,
    };

    let unit = raw.chars().last().ok_or_else(|| bad("empty value".to_string()))?;
    let (digits, multiplier) = match unit {
        's' => (&raw[..raw.len() - 1], 1i64),
        'm' => (&raw[..raw.len() - 1], 60),
        'h' => (&raw[..raw.len() - 1], 3600),
        'd' => (&raw[..raw.len() - 1], 86400),
        _ => (raw, 1),
    };

    let count: i64 = digits.parse().map_err(|_| bad(format!("not a whole number: {digits}")))?;
    if count < 0 {
        return Err(bad("must not be negative".to_string()));
    }

    Ok(chrono::Duration::seconds(count * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_days() {
        assert_eq!(parse_retention("30d").unwrap(), chrono::Duration::days(30));
    }

    #[test]
    fn parses_hours_and_bare_seconds() {
        assert_eq!(parse_retention("12h").unwrap(), chrono::Duration::hours(12));
        assert_eq!(parse_retention("90").unwrap(), chrono::Duration::seconds(90));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_retention("abc").is_err());
        assert!(parse_retention("-5d").is_err());
    }
}
