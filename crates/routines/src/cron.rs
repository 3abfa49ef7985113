//! Timezone-aware cron evaluator (5-field: min hour dom month dow) and
//! trigger-config validation.

use chrono::{DateTime, Datelike, Timelike, Utc};

pub fn parse_tz(tz: &str) -> chrono_tz::Tz {
    tz.parse::<chrono_tz::Tz>().unwrap_or(chrono_tz::UTC)
}

/// Which of the 5 fields a token came from — only `Month` and `Dow` accept
/// names (`croniter`, which the original implementation uses, accepts both).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Minute,
    Hour,
    Dom,
    Month,
    Dow,
}

/// Resolves one token (no ranges/steps/commas) to its numeric value.
/// Day-of-week names are case-insensitive (`MON`..`SUN`); `7` is also
/// accepted as Sunday alongside `0`, matching standard cron semantics.
fn resolve_token(token: &str, kind: FieldKind) -> Option<u32> {
    if let Ok(n) = token.parse::<u32>() {
        return match kind {
            FieldKind::Dow if n == 7 => Some(0),
            _ => Some(n),
        };
    }
    match kind {
        FieldKind::Dow => match token.to_ascii_uppercase().as_str() {
            "SUN" => Some(0),
            "MON" => Some(1),
            "TUE" => Some(2),
            "WED" => Some(3),
            "THU" => Some(4),
            "FRI" => Some(5),
            "SAT" => Some(6),
            _ => None,
        },
        FieldKind::Month => match token.to_ascii_uppercase().as_str() {
            "JAN" => Some(1),
            "FEB" => Some(2),
            "MAR" => Some(3),
            "APR" => Some(4),
            "MAY" => Some(5),
            "JUN" => Some(6),
            "JUL" => Some(7),
            "AUG" => Some(8),
            "SEP" => Some(9),
            "OCT" => Some(10),
            "NOV" => Some(11),
            "DEC" => Some(12),
            _ => None,
        },
        _ => None,
    }
}

fn cron_field_matches(field: &str, kind: FieldKind, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(step) = field.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u32>() {
            return n > 0 && value % n == 0;
        }
    }
    for part in field.split(',') {
        if let Some((start_s, end_s)) = part.split_once('-') {
            if let (Some(start), Some(end)) = (resolve_token(start_s, kind), resolve_token(end_s, kind)) {
                if value >= start && value <= end {
                    return true;
                }
            }
        } else if let Some(n) = resolve_token(part, kind) {
            if value == n {
                return true;
            }
        }
    }
    false
}

fn cron_matches_naive(cron: &str, dt: &chrono::NaiveDateTime) -> bool {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    cron_field_matches(fields[0], FieldKind::Minute, dt.minute())
        && cron_field_matches(fields[1], FieldKind::Hour, dt.hour())
        && cron_field_matches(fields[2], FieldKind::Dom, dt.day())
        && cron_field_matches(fields[3], FieldKind::Month, dt.month())
        && cron_field_matches(fields[4], FieldKind::Dow, dt.weekday().num_days_from_sunday())
}

pub fn cron_matches(cron: &str, dt: &DateTime<Utc>) -> bool {
    cron_matches_naive(cron, &dt.naive_utc())
}

const FIELD_KINDS: [FieldKind; 5] =
    [FieldKind::Minute, FieldKind::Hour, FieldKind::Dom, FieldKind::Month, FieldKind::Dow];

/// Whether `cron` is a syntactically valid 5-field expression. Accepts
/// day-of-week and month names (`MON`, `JAN`, ...) alongside numbers,
/// matching `croniter`'s leniency in the reference implementation.
pub fn validate_cron(cron: &str) -> bool {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    fields
        .iter()
        .zip(FIELD_KINDS)
        .all(|(f, kind)| field_is_syntactically_valid(f, kind))
}

fn field_is_syntactically_valid(field: &str, kind: FieldKind) -> bool {
    if field == "*" {
        return true;
    }
    if let Some(step) = field.strip_prefix("*/") {
        return step.parse::<u32>().map(|n| n > 0).unwrap_or(false);
    }
    field.split(',').all(|part| {
        if let Some((start, end)) = part.split_once('-') {
            resolve_token(start, kind).is_some() && resolve_token(end, kind).is_some()
        } else {
            resolve_token(part, kind).is_some()
        }
    })
}

/// Next occurrence strictly after `after`, evaluated in `tz`.
///
/// DST handling: spring-forward gaps (local times that don't exist) are
/// skipped; fall-back overlaps resolve to the earliest (pre-transition)
/// mapping.
pub fn cron_next_tz(cron: &str, after: &DateTime<Utc>, tz: chrono_tz::Tz) -> Option<DateTime<Utc>> {
    use chrono::TimeZone;

    let local_after = after.with_timezone(&tz).naive_local();
    let next_min_secs = 60 - (local_after.second() as i64);
    let mut candidate = local_after + chrono::Duration::seconds(next_min_secs);
    candidate = candidate.with_second(0).unwrap_or(candidate);

    let max_checks = 366 * 24 * 60;
    for _ in 0..max_checks {
        if cron_matches_naive(cron, &candidate) {
            match tz.from_local_datetime(&candidate) {
                chrono::LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                chrono::LocalResult::Ambiguous(earliest, _) => {
                    return Some(earliest.with_timezone(&Utc));
                }
                chrono::LocalResult::None => {}
            }
        }
        candidate += chrono::Duration::minutes(1);
    }
    None
}

pub fn cron_next(cron: &str, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    cron_next_tz(cron, after, chrono_tz::UTC)
}

/// Validates a trigger's config shape against its declared type. Mirrors
/// the reference engine's up-front rejection of malformed routines
/// before they ever reach the scheduler.
pub fn validate_trigger_config(
    trigger_type: &str,
    trigger_config: &serde_json::Value,
) -> Result<(), String> {
    match trigger_type {
        "cron" => {
            let cron = trigger_config
                .get("cron")
                .and_then(|v| v.as_str())
                .ok_or_else(|| "cron trigger requires a string 'cron' key".to_string())?;
            if !validate_cron(cron) {
                return Err(format!("invalid cron expression: {cron}"));
            }
            Ok(())
        }
        "event" => {
            trigger_config
                .get("event")
                .and_then(|v| v.as_str())
                .ok_or_else(|| "event trigger requires a string 'event' key".to_string())?;
            Ok(())
        }
        "interval" => {
            let seconds = trigger_config
                .get("seconds")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| "interval trigger requires an integer 'seconds' key".to_string())?;
            if seconds < 1 {
                return Err("interval 'seconds' must be >= 1".to_string());
            }
            Ok(())
        }
        other => Err(format!("unknown trigger_type: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cron_every_5_minutes() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert!(cron_matches("*/5 * * * *", &dt));
        let dt2 = Utc.with_ymd_and_hms(2024, 6, 15, 10, 3, 0).unwrap();
        assert!(!cron_matches("*/5 * * * *", &dt2));
    }

    #[test]
    fn cron_range() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert!(cron_matches("0 9-17 * * *", &dt));
        let dt2 = Utc.with_ymd_and_hms(2024, 6, 15, 20, 0, 0).unwrap();
        assert!(!cron_matches("0 9-17 * * *", &dt2));
    }

    #[test]
    fn cron_next_finds_occurrence() {
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let next = cron_next("30 * * * *", &after).unwrap();
        assert_eq!(next.minute(), 30);
    }

    #[test]
    fn cron_next_tz_spring_forward_skips_gap() {
        let after = Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap();
        let tz = parse_tz("US/Eastern");
        let next = cron_next_tz("30 2 * * *", &after, tz).unwrap();
        assert_eq!(next.day(), 11);
        assert_eq!(next.hour(), 6);
        assert_eq!(next.minute(), 30);
    }

    #[test]
    fn validate_cron_rejects_wrong_field_count() {
        assert!(!validate_cron("* * * *"));
        assert!(validate_cron("*/5 * * * *"));
    }

    #[test]
    fn validate_cron_accepts_named_weekday_and_month() {
        assert!(validate_cron("0 9 * * MON"));
        assert!(validate_cron("0 9 * * mon"));
        assert!(validate_cron("0 9 1 JAN *"));
        assert!(!validate_cron("0 9 * * FRIYAY"));
    }

    #[test]
    fn cron_matches_named_weekday() {
        // 2024-06-17 is a Monday.
        let monday_9am = Utc.with_ymd_and_hms(2024, 6, 17, 9, 0, 0).unwrap();
        assert!(cron_matches("0 9 * * MON", &monday_9am));
        let tuesday_9am = Utc.with_ymd_and_hms(2024, 6, 18, 9, 0, 0).unwrap();
        assert!(!cron_matches("0 9 * * MON", &tuesday_9am));
    }

    #[test]
    fn cron_matches_dow_7_means_sunday() {
        let sunday = Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap();
        assert!(cron_matches("0 0 * * 7", &sunday));
        assert!(cron_matches("0 0 * * 0", &sunday));
    }

    #[test]
    fn cron_next_finds_next_monday_9am() {
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap(); // Saturday
        let next = cron_next("0 9 * * MON", &after).unwrap();
        assert_eq!(next.weekday(), chrono::Weekday::Mon);
        assert_eq!(next.hour(), 9);
        assert_eq!(next.minute(), 0);
    }

    #[test]
    fn validate_trigger_config_cron_requires_valid_expression() {
        assert!(validate_trigger_config("cron", &serde_json::json!({"cron": "bad"})).is_err());
        assert!(validate_trigger_config("cron", &serde_json::json!({"cron": "0 * * * *"})).is_ok());
    }

    #[test]
    fn validate_trigger_config_interval_requires_positive_seconds() {
        assert!(validate_trigger_config("interval", &serde_json::json!({"seconds": 0})).is_err());
        assert!(validate_trigger_config("interval", &serde_json::json!({"seconds": 30})).is_ok());
    }

    #[test]
    fn validate_trigger_config_unknown_type_errors() {
        assert!(validate_trigger_config("carrier_pigeon", &serde_json::json!({})).is_err());
    }
}
