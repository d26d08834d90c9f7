use crate::types::ValidationError;
use serde_json::Value;

/// Normalize a record id to its string form. Numbers keep their decimal rendering.
pub fn normalize_id(value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::String(id) if !id.is_empty() => Ok(id.clone()),
        Value::String(_) | Value::Null => Err(ValidationError::MissingId),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(ValidationError::InvalidId {
            value: other.to_string(),
        }),
    }
}

/// JavaScript-style truthiness, used for `not` mappings.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Slug helpers
pub mod slugs {
    use slug::slugify;

    /// Lower-cased title with every run of non-alphanumerics collapsed to `-`.
    /// Titles that slugify to nothing fall back to the default title.
    pub fn base_slug(title: &str, fallback_title: &str) -> String {
        let candidate = slugify(title);
        if !candidate.is_empty() {
            return candidate;
        }
        let fallback = slugify(fallback_title);
        if fallback.is_empty() {
            "post".to_string()
        } else {
            fallback
        }
    }

    /// First of `base`, `base-2`, `base-3`, ... that is not taken.
    pub fn unique_slug<F>(base: &str, mut is_taken: F) -> String
    where
        F: FnMut(&str) -> bool,
    {
        if !is_taken(base) {
            return base.to_string();
        }
        let mut attempt: usize = 2;
        loop {
            let candidate = format!("{}-{}", base, attempt);
            if !is_taken(&candidate) {
                return candidate;
            }
            attempt += 1;
        }
    }
}

/// Date parsing
pub mod time {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
    use serde_json::Value;

    /// Parse a record date: a string in RFC 3339 or one of `formats`, or an
    /// integer number of milliseconds since the epoch.
    pub fn parse_date(value: &Value, formats: &[String]) -> Option<DateTime<Utc>> {
        match value {
            Value::String(text) => parse_date_str(text.trim(), formats),
            Value::Number(number) => number
                .as_i64()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
            _ => None,
        }
    }

    pub fn parse_date_str(text: &str, formats: &[String]) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
            return Some(parsed.with_timezone(&Utc));
        }
        for format in formats {
            if let Ok(parsed) = DateTime::parse_from_str(text, format) {
                return Some(parsed.with_timezone(&Utc));
            }
            if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
                return Some(parsed.and_utc());
            }
            if let Ok(parsed) = NaiveDate::parse_from_str(text, format) {
                return parsed.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc());
            }
        }
        None
    }
}
