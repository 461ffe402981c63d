//! "Expiring today" selection over a loaded market collection.
//!
//! Dates are compared as UTC calendar days. End dates are parsed leniently:
//! - RFC 3339 (`2024-03-15T23:59:00Z`, `2024-03-15T23:59:00.123+02:00`)
//! - offsets without a colon (`2024-03-15T23:59:00+0000`)
//! - naive date-times, `T` or space separated, taken as UTC
//! - bare dates (`2024-03-15`), taken as UTC midnight
//!
//! Anything else is treated as unparsable and the market is skipped.
//! Numeric end dates (epoch milliseconds) never reach this parser: extraction
//! treats a non-string `endDate` as absent, so those markets are skipped too.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::market::Market;

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

pub fn parse_end_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

/// True when the market's end date falls on the same UTC calendar day as `now`.
pub fn is_expiring_on_day(market: &Market, now: DateTime<Utc>) -> bool {
    market
        .end_date
        .as_deref()
        .and_then(parse_end_date)
        .is_some_and(|end| end.date_naive() == now.date_naive())
}

pub fn filter_expiring_today(markets: &[Market], now: DateTime<Utc>) -> Vec<Market> {
    markets
        .iter()
        .filter(|market| is_expiring_on_day(market, now))
        .cloned()
        .collect()
}
