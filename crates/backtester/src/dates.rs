//! Date range validation against an instrument's trading life.
//!
//! Never fails: malformed input falls back to defaults and every
//! substitution or clamp is explained in `messages`.

use api_client::UpstreamApi;
use chrono::{Duration, NaiveDate};
use core_types::InstrumentInfo;
use core_types::time::market_today;
use serde::Serialize;

/// Days before today used when no start date is given.
const DEFAULT_LOOKBACK_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateValidationResult {
    pub adjusted_from: NaiveDate,
    pub adjusted_to: NaiveDate,
    pub from_adjusted: bool,
    pub to_adjusted: bool,
    pub listing_date: Option<NaiveDate>,
    pub last_trade_date: Option<NaiveDate>,
    pub messages: Vec<String>,
}

/// Parses `YYYY-MM-DD`, `YYYY.MM.DD`, `YYYY/MM/DD` (unpadded parts allowed)
/// or compact `YYYYMMDD`. Impossible calendar dates yield `None`.
pub fn parse_loose_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if input.len() == 8 && input.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(input, "%Y%m%d").ok();
    }

    let parts: Vec<&str> = input.split(['-', '.', '/']).collect();
    let [year, month, day] = parts.as_slice() else {
        return None;
    };
    let year: i32 = year.trim().parse().ok()?;
    let month: u32 = month.trim().parse().ok()?;
    let day: u32 = day.trim().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

pub struct DateRangeValidator<'a> {
    api: &'a dyn UpstreamApi,
    today: NaiveDate,
}

impl<'a> DateRangeValidator<'a> {
    pub fn new(api: &'a dyn UpstreamApi) -> Self {
        Self {
            api,
            today: market_today(),
        }
    }

    /// Pins "today" instead of reading the market clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Validates the requested range for `instrument_id`.
    ///
    /// A failed metadata lookup is recorded as a message and disables clamping.
    pub async fn validate(
        &self,
        instrument_id: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> DateValidationResult {
        let mut lookup_message = None;
        let info = match instrument_id {
            Some(id) => match self.api.fetch_instrument(id).await {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::warn!(
                        instrument_id = id,
                        error = %e,
                        "Instrument metadata unavailable."
                    );
                    lookup_message = Some(format!(
                        "Could not load trading dates for {id} ({e}); \
                         the range was not checked against them."
                    ));
                    None
                }
            },
            None => None,
        };

        let mut result = adjust_range(info.as_ref(), from, to, self.today);
        if let Some(message) = lookup_message {
            result.messages.push(message);
        }
        for message in &result.messages {
            tracing::info!(message = %message, "Date range adjusted.");
        }
        result
    }
}

/// The pure part of validation: parsing, defaulting, swapping and clamping.
pub fn adjust_range(
    info: Option<&InstrumentInfo>,
    from: Option<&str>,
    to: Option<&str>,
    today: NaiveDate,
) -> DateValidationResult {
    let mut messages = Vec::new();
    let default_from = today - Duration::days(DEFAULT_LOOKBACK_DAYS);

    let mut from = resolve_date("start", from, default_from, &mut messages);
    let mut to = resolve_date("end", to, today, &mut messages);

    if from > to {
        messages.push(format!(
            "Start date {from} was after end date {to}; the two were swapped."
        ));
        std::mem::swap(&mut from, &mut to);
    }

    let listing_date = info.and_then(|i| i.listing_date);
    let last_trade_date = info.and_then(|i| i.last_trade_date);
    let instrument = info.map_or("the instrument", |i| i.instrument_id.as_str());
    let mut from_adjusted = false;
    let mut to_adjusted = false;

    if let Some(last) = last_trade_date {
        if last < today && to > last {
            messages.push(format!(
                "End date {to} is after the last trade date {last} of {instrument}; using {last}."
            ));
            to = last;
            to_adjusted = true;
        }
    }

    if let Some(listing) = listing_date {
        if listing > from {
            messages.push(format!(
                "Start date {from} is before the listing date {listing} of {instrument}; \
                 using {listing}."
            ));
            from = listing;
            from_adjusted = true;
        }
    }

    if from > to {
        messages.push(format!(
            "{instrument} did not trade in the requested range; start date set to {to}."
        ));
        from = to;
        from_adjusted = true;
    }

    DateValidationResult {
        adjusted_from: from,
        adjusted_to: to,
        from_adjusted,
        to_adjusted,
        listing_date,
        last_trade_date,
        messages,
    }
}

fn resolve_date(
    label: &str,
    input: Option<&str>,
    default: NaiveDate,
    messages: &mut Vec<String>,
) -> NaiveDate {
    let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return default;
    };
    match parse_loose_date(raw) {
        Some(date) => date,
        None => {
            messages.push(format!("Invalid {label} date '{raw}'; using {default}."));
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::error::ApiError;
    use api_client::{ConnectionCredentials, StrategyDetail, StrategyGroup};
    use async_trait::async_trait;
    use core_types::{Instrument, Kline};
    use serde_json::Value;

    /// Answers instrument lookups only; `None` makes every lookup fail.
    struct MetadataService {
        info: Option<InstrumentInfo>,
    }

    #[async_trait]
    impl UpstreamApi for MetadataService {
        async fn fetch_strategy(
            &self,
            _: &str,
            _: StrategyGroup,
        ) -> Result<StrategyDetail, ApiError> {
            unimplemented!()
        }

        async fn submit_backtest(&self, _: &Value) -> Result<String, ApiError> {
            unimplemented!()
        }

        async fn issue_credentials(&self) -> Result<ConnectionCredentials, ApiError> {
            unimplemented!()
        }

        async fn fetch_instrument(&self, _: &str) -> Result<InstrumentInfo, ApiError> {
            self.info
                .clone()
                .ok_or_else(|| ApiError::InvalidData("instrument service offline".to_string()))
        }

        async fn fetch_klines(
            &self,
            _: &Instrument,
            _: NaiveDate,
            _: NaiveDate,
            _: &str,
        ) -> Result<Vec<Kline>, ApiError> {
            unimplemented!()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn info(listing: Option<NaiveDate>, last: Option<NaiveDate>) -> InstrumentInfo {
        InstrumentInfo {
            instrument_id: "600000.XSHG".to_string(),
            name: None,
            listing_date: listing,
            last_trade_date: last,
        }
    }

    #[test]
    fn valid_ordered_range_is_left_untouched() {
        let today = date(2025, 6, 1);
        let meta = info(Some(date(1999, 11, 10)), None);
        let result = adjust_range(Some(&meta), Some("2024-01-01"), Some("2024-05-28"), today);

        assert_eq!(result.adjusted_from, date(2024, 1, 1));
        assert_eq!(result.adjusted_to, date(2024, 5, 28));
        assert!(!result.from_adjusted);
        assert!(!result.to_adjusted);
        assert!(result.messages.is_empty());
    }

    #[test]
    fn reversed_range_is_swapped() {
        let result = adjust_range(None, Some("2024-05-28"), Some("2024-01-01"), date(2025, 6, 1));
        assert_eq!(result.adjusted_from, date(2024, 1, 1));
        assert_eq!(result.adjusted_to, date(2024, 5, 28));
        assert_eq!(result.messages.len(), 1);
    }

    #[test]
    fn impossible_calendar_dates_are_rejected() {
        assert_eq!(parse_loose_date("2025-02-29"), None);
        assert_eq!(parse_loose_date("2024-02-29"), Some(date(2024, 2, 29)));
        assert_eq!(parse_loose_date("2024-13-01"), None);
    }

    #[test]
    fn loose_separators_and_compact_form_parse() {
        assert_eq!(parse_loose_date("2024.3.5"), Some(date(2024, 3, 5)));
        assert_eq!(parse_loose_date("2024/03/05"), Some(date(2024, 3, 5)));
        assert_eq!(parse_loose_date(" 20240305 "), Some(date(2024, 3, 5)));
        assert_eq!(parse_loose_date("March 5"), None);
    }

    #[test]
    fn garbage_input_falls_back_to_defaults() {
        let today = date(2025, 6, 1);
        let result = adjust_range(None, Some("yesterday"), Some("2025-02-29"), today);
        assert_eq!(result.adjusted_from, date(2024, 6, 1));
        assert_eq!(result.adjusted_to, today);
        assert_eq!(result.messages.len(), 2);

        let result = adjust_range(None, None, None, today);
        assert_eq!(result.adjusted_from, date(2024, 6, 1));
        assert_eq!(result.adjusted_to, today);
        assert!(result.messages.is_empty());
    }

    #[test]
    fn clamps_to_listing_and_last_trade_dates() {
        let today = date(2025, 6, 1);
        let meta = info(Some(date(2023, 3, 1)), Some(date(2024, 4, 30)));
        let result = adjust_range(Some(&meta), Some("2023-01-01"), Some("2024-12-31"), today);

        assert_eq!(result.adjusted_from, date(2023, 3, 1));
        assert_eq!(result.adjusted_to, date(2024, 4, 30));
        assert!(result.from_adjusted);
        assert!(result.to_adjusted);
        assert!(result.messages[0].contains("2024-12-31"));
        assert!(result.messages[0].contains("2024-04-30"));
    }

    #[test]
    fn future_last_trade_date_does_not_clamp() {
        let today = date(2025, 6, 1);
        let meta = info(None, Some(date(2030, 1, 1)));
        let result = adjust_range(Some(&meta), Some("2024-01-01"), Some("2025-05-01"), today);
        assert!(!result.to_adjusted);
        assert_eq!(result.adjusted_to, date(2025, 5, 1));
    }

    #[test]
    fn range_entirely_after_delisting_collapses_to_one_day() {
        let today = date(2025, 6, 1);
        let meta = info(None, Some(date(2023, 1, 31)));
        let result = adjust_range(Some(&meta), Some("2024-01-01"), Some("2024-02-01"), today);
        assert_eq!(result.adjusted_from, date(2023, 1, 31));
        assert_eq!(result.adjusted_to, date(2023, 1, 31));
        assert!(result.from_adjusted);
    }

    #[tokio::test]
    async fn failed_metadata_lookup_is_reported_and_skips_clamping() {
        let api = MetadataService { info: None };
        let result = DateRangeValidator::new(&api)
            .with_today(date(2025, 6, 1))
            .validate(Some("600000.XSHG"), Some("2024-05-28"), Some("2024-01-01"))
            .await;

        assert_eq!(result.adjusted_from, date(2024, 1, 1));
        assert_eq!(result.adjusted_to, date(2024, 5, 28));
        assert!(!result.from_adjusted);
        assert!(!result.to_adjusted);
        assert_eq!(result.listing_date, None);
        assert_eq!(result.last_trade_date, None);
        assert_eq!(result.messages.len(), 2);
        assert!(result.messages[0].contains("swapped"));
        assert!(result.messages[1].contains("Could not load trading dates for 600000.XSHG"));
        assert!(result.messages[1].contains("instrument service offline"));
    }

    #[tokio::test]
    async fn successful_lookup_clamps_to_listing_date() {
        let api = MetadataService {
            info: Some(info(Some(date(2024, 3, 1)), None)),
        };
        let result = DateRangeValidator::new(&api)
            .with_today(date(2025, 6, 1))
            .validate(Some("600000.XSHG"), Some("2024-01-01"), Some("2024-05-28"))
            .await;

        assert_eq!(result.adjusted_from, date(2024, 3, 1));
        assert!(result.from_adjusted);
        assert_eq!(result.listing_date, Some(date(2024, 3, 1)));
        assert_eq!(result.messages.len(), 1);
    }
}
