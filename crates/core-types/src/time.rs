//! Civil-calendar helpers for the broker's market timezone.
//!
//! The broker reports and expects dates in China Standard Time (UTC+8). All
//! conversions here are independent of the host timezone.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

/// Offset of the market calendar from UTC, in seconds.
pub const MARKET_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Milliseconds in one civil day.
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// The fixed UTC+8 offset used for every civil-date conversion.
pub fn market_offset() -> FixedOffset {
    FixedOffset::east_opt(MARKET_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Today's date in the market calendar.
pub fn market_today() -> NaiveDate {
    Utc::now().with_timezone(&market_offset()).date_naive()
}

/// Epoch milliseconds of 00:00:00.000 on `date` in the market calendar.
pub fn day_start_millis(date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::default());
    midnight.and_utc().timestamp_millis() - i64::from(MARKET_UTC_OFFSET_SECS) * 1000
}

/// Epoch milliseconds of 23:59:59.999 on `date` in the market calendar.
pub fn day_end_millis(date: NaiveDate) -> i64 {
    day_start_millis(date) + MILLIS_PER_DAY - 1
}

/// Formats epoch milliseconds as `YYYY-MM-DD HH:MM:SS` in the market calendar.
pub fn format_millis(millis: i64) -> Option<String> {
    let utc = DateTime::<Utc>::from_timestamp_millis(millis)?;
    Some(
        utc.with_timezone(&market_offset())
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    )
}
