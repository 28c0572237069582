//! Date conversion between storage form and a field's external pattern.

use crate::catalog::{DefaultValue, FieldMapping, FieldType};
use crate::value::{STORAGE_DATE, STORAGE_DATETIME, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const ZERO_DATES: [&str; 5] = [
    "0000-00-00",
    "0000-00-00 00:00:00",
    "0.0.0000",
    "00.00.0000",
    "00-00-0000",
];

/// Stored values that mean "no date".
pub(crate) fn is_zero_date(s: &str) -> bool {
    let s = s.trim();
    s.is_empty() || ZERO_DATES.contains(&s)
}

/// Validate a storage-order date and normalize it to `YYYY-MM-DD`.
fn normalize_date(storage: &str) -> Option<String> {
    NaiveDate::parse_from_str(storage.trim(), STORAGE_DATE)
        .ok()
        .map(|d| d.format(STORAGE_DATE).to_string())
}

/// Validate a time and normalize it to `HH:MM:SS`. `HH:MM` is accepted.
fn normalize_time(time: &str) -> Option<String> {
    let time = time.trim();
    NaiveTime::parse_from_str(time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
        .ok()
        .map(|t| t.format("%H:%M:%S").to_string())
}

/// Convert a submitted external date into storage form.
///
/// Returns `None` when the value is malformed or not a calendar date; the
/// caller then applies its fallback. A datetime without a time part gets
/// midnight.
pub(crate) fn to_storage(field: &FieldMapping, external: &str) -> Option<String> {
    let mut parts = external.split_whitespace();
    let date = parts.next()?;
    let time = parts.next();
    if parts.next().is_some() {
        return None;
    }

    let storage = match &field.date_pattern {
        Some(pattern) => pattern.to_storage(date)?,
        None => date.to_string(),
    };
    let date = normalize_date(&storage)?;

    match field.field_type {
        FieldType::DateTime => {
            let time = match time {
                Some(t) => normalize_time(t)?,
                None => "00:00:00".to_string(),
            };
            Some(format!("{date} {time}"))
        }
        _ if time.is_some() => None,
        _ => Some(date),
    }
}

/// Render a stored date through the field's pattern. Null and zero dates
/// render as an empty string; a time part is kept as-is.
pub(crate) fn to_external(field: &FieldMapping, stored: &Value) -> Value {
    let text = match stored {
        Value::Null => return Value::Text(String::new()),
        Value::Text(s) => s.as_str(),
        other => return other.clone(),
    };
    if is_zero_date(text) {
        return Value::Text(String::new());
    }
    let Some(pattern) = &field.date_pattern else {
        return Value::Text(text.to_string());
    };
    let rendered = match text.split_once(' ') {
        Some((date, time)) => format!("{} {time}", pattern.to_external(date)),
        None => pattern.to_external(text),
    };
    Value::Text(rendered)
}

/// Resolve a mapping default to a storage value. `Now` is taken from `now`;
/// zero-date literals on date fields mean null.
pub(crate) fn resolve_default(field: &FieldMapping, now: NaiveDateTime) -> Option<Value> {
    match field.default.as_ref()? {
        DefaultValue::Now => Some(Value::Text(match field.field_type {
            FieldType::DateTime => now.format(STORAGE_DATETIME).to_string(),
            _ => now.format(STORAGE_DATE).to_string(),
        })),
        DefaultValue::Literal(Value::Text(s)) if field.field_type.is_date() && is_zero_date(s) => {
            Some(Value::Null)
        }
        DefaultValue::Literal(v) => Some(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DatePattern;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .unwrap()
    }

    fn dotted(field: FieldMapping) -> FieldMapping {
        field.pattern(DatePattern::parse("DD.MM.YYYY").unwrap())
    }

    #[test]
    fn external_round_trip() {
        let field = dotted(FieldMapping::date("BirthUser"));
        let stored = to_storage(&field, "05.03.2024").unwrap();
        assert_eq!(stored, "2024-03-05");
        assert_eq!(
            to_external(&field, &Value::Text(stored)),
            Value::from("05.03.2024")
        );
    }

    #[test]
    fn rejects_calendar_invalid_dates() {
        let field = dotted(FieldMapping::date("BirthUser"));
        assert_eq!(to_storage(&field, "31.02.2024"), None);
        assert_eq!(to_storage(&field, "2024-02-01"), None);
        assert_eq!(to_storage(&field, "05.03.2024 10:00:00"), None);
    }

    #[test]
    fn datetime_keeps_or_adds_time() {
        let field = dotted(FieldMapping::datetime("CreatedAt"));
        assert_eq!(
            to_storage(&field, "05.03.2024 9:05").as_deref(),
            Some("2024-03-05 09:05:00")
        );
        assert_eq!(
            to_storage(&field, "05.03.2024").as_deref(),
            Some("2024-03-05 00:00:00")
        );
        assert_eq!(to_storage(&field, "05.03.2024 25:00:00"), None);
        assert_eq!(
            to_external(&field, &Value::from("2024-03-05 09:05:00")),
            Value::from("05.03.2024 09:05:00")
        );
    }

    #[test]
    fn zero_and_null_render_blank() {
        let field = dotted(FieldMapping::date("BirthUser"));
        assert_eq!(to_external(&field, &Value::Null), Value::from(""));
        assert_eq!(to_external(&field, &Value::from("0000-00-00")), Value::from(""));
    }

    #[test]
    fn defaults_resolve_now_and_zero() {
        let date = FieldMapping::date("D").default_now();
        assert_eq!(resolve_default(&date, at()), Some(Value::from("2024-03-05")));

        let datetime = FieldMapping::datetime("T").default_now();
        assert_eq!(
            resolve_default(&datetime, at()),
            Some(Value::from("2024-03-05 14:30:00"))
        );

        let zero = FieldMapping::date("Z").default_value("0000-00-00");
        assert_eq!(resolve_default(&zero, at()), Some(Value::Null));

        assert_eq!(resolve_default(&FieldMapping::date("N"), at()), None);
    }
}
