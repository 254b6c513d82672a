//! Lenient field conversions
//!
//! Numbers degrade to zero and dates to `None`; no conversion here fails.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};

/// Tried in order, first match wins
///
/// `%.f` also admits a trailing fraction such as `14:30:00.123`.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Date-only layouts, stored as midnight
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%-d/%-m/%Y", "%Y/%m/%d"];

/// Strip thousands separators and surrounding whitespace
fn clean_number(raw: &str) -> String {
    raw.replace(',', "").trim().to_string()
}

/// Decimal amount; anything unparsable (empty included) is zero
pub fn parse_decimal(raw: &str) -> BigDecimal {
    BigDecimal::from_str(&clean_number(raw)).unwrap_or_default()
}

/// Integer count or rank
///
/// Falls back to a decimal parse truncated toward zero, so "12.9" is 12.
/// Values outside the `i32` range are zero, not clamped.
pub fn parse_int(raw: &str) -> i32 {
    let cleaned = clean_number(raw);
    if let Ok(value) = cleaned.parse::<i32>() {
        return value;
    }
    cleaned
        .parse::<f64>()
        .ok()
        .map(f64::trunc)
        .filter(|value| (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(value))
        .map(|value| value as i32)
        .unwrap_or(0)
}

/// Dates are matched as given; trailing whitespace makes them absent
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    if raw.is_empty() {
        return None;
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Column `index` verbatim, or `None` when missing or empty
pub fn optional_text(record: &csv::StringRecord, index: usize) -> Option<String> {
    record
        .get(index)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
