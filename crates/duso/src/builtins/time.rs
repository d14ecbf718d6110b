//! Time builtins.
//!
//! Timestamps are integer seconds since the Unix epoch, in UTC. Formatting
//! and parsing accept preset names (`iso`, `date`, `time`, `datetime`) or
//! token patterns built from `YYYY MM DD HH mm ss`.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{
    error::{RunError, RunResult},
    value::Value,
};

use super::Builtins;

pub(super) fn register(builtins: &mut Builtins) {
    builtins.register("now", |_, _| Ok(Value::Number(Utc::now().timestamp() as f64)));

    builtins.register("sleep", |evaluator, args| {
        let seconds = args.number("sleep", 0, "seconds")?;
        if seconds < 0.0 {
            return Err(RunError::type_error("sleep() duration must not be negative"));
        }
        if evaluator.cancel_token().sleep(Duration::from_secs_f64(seconds)) {
            return Err(RunError::cancelled());
        }
        Ok(Value::Nil)
    });

    builtins.register("format_time", |_, args| {
        let timestamp = args.integer("format_time", 0, "timestamp")?;
        let pattern = args.optional_string("format_time", 1, "pattern")?.unwrap_or_else(|| "iso".into());
        let time = DateTime::<Utc>::from_timestamp(timestamp, 0)
            .ok_or_else(|| RunError::bounds_error(format!("timestamp {timestamp} out of range")))?;
        let format = chrono_format(&pattern);
        Ok(Value::string(time.format(&format).to_string()))
    });

    builtins.register("parse_time", |_, args| {
        let text = args.string("parse_time", 0, "text")?;
        let pattern = args.optional_string("parse_time", 1, "pattern")?.unwrap_or_else(|| "iso".into());
        let timestamp = parse_time(&text, &pattern)?;
        Ok(Value::Number(timestamp as f64))
    });
}

/// Translates a preset name or `YYYY/MM/DD/HH/mm/ss` token pattern into a
/// chrono format string.
fn chrono_format(pattern: &str) -> String {
    match pattern {
        "iso" => "%Y-%m-%dT%H:%M:%SZ".to_owned(),
        "date" => "%Y-%m-%d".to_owned(),
        "time" => "%H:%M:%S".to_owned(),
        "datetime" => "%Y-%m-%d %H:%M:%S".to_owned(),
        tokens => tokens
            .replace("YYYY", "%Y")
            .replace("MM", "%m")
            .replace("DD", "%d")
            .replace("HH", "%H")
            .replace("mm", "%M")
            .replace("ss", "%S"),
    }
}

fn parse_time(text: &str, pattern: &str) -> RunResult<i64> {
    if pattern == "iso" {
        return DateTime::parse_from_rfc3339(text)
            .map(|t| t.timestamp())
            .map_err(|err| RunError::type_error(format!("cannot parse time '{text}': {err}")));
    }
    let format = chrono_format(pattern);
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, &format) {
        return Ok(datetime.and_utc().timestamp());
    }
    // Date-only patterns produce a midnight timestamp.
    NaiveDate::parse_from_str(text, &format)
        .map(|date| date.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc().timestamp())
        .map_err(|err| RunError::type_error(format!("cannot parse time '{text}': {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_patterns_translate() {
        assert_eq!(chrono_format("YYYY-MM-DD HH:mm:ss"), "%Y-%m-%d %H:%M:%S");
    }

    #[test]
    fn parse_and_format_round_trip() {
        let ts = parse_time("2026-03-01 12:30:00", "datetime").unwrap();
        let time = DateTime::<Utc>::from_timestamp(ts, 0).unwrap();
        assert_eq!(time.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-03-01 12:30:00");
    }

    #[test]
    fn date_only_pattern_is_midnight() {
        let ts = parse_time("2026-03-01", "date").unwrap();
        assert_eq!(ts % 86_400, 0);
    }
}
