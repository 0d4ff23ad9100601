//! Converts reference-quoted rates into rates relative to any base currency.
//!
//! Every row is quoted against the same reference currency, so the rate of a
//! target `t` against a base `b` is `row[t] / row[b]` and the reference cancels
//! out. Whichever currency the archive publisher quotes in, the result is
//! normalized to the requested base.

use crate::core::currency::{RateTable, normalize_code};
use crate::core::error::{RateError, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub base: String,
    /// Currencies to quote. Empty means every currency in the resolved row.
    pub targets: Vec<String>,
    pub date: NaiveDate,
    /// Rejects rows older than the requested date by more than this many days.
    pub max_gap_days: Option<u32>,
}

impl ConversionRequest {
    pub fn new<S: AsRef<str>>(base: &str, targets: &[S], date: NaiveDate) -> Self {
        ConversionRequest {
            base: base.to_string(),
            targets: targets.iter().map(|t| t.as_ref().to_string()).collect(),
            date,
            max_gap_days: None,
        }
    }

    pub fn with_max_gap_days(mut self, days: Option<u32>) -> Self {
        self.max_gap_days = days;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub base: String,
    pub requested_date: NaiveDate,
    /// Date of the row the rates were taken from.
    pub as_of: NaiveDate,
    pub rates: BTreeMap<String, f64>,
}

/// Quotes every requested target against `request.base` using the most
/// recent row at or before `request.date`.
///
/// Either all targets are converted or an error is returned; a partial
/// mapping is never produced.
pub fn convert(table: &RateTable, request: &ConversionRequest) -> Result<ConversionResult> {
    let base = normalize_code(&request.base)?;
    let targets = request
        .targets
        .iter()
        .map(|t| normalize_code(t))
        .collect::<Result<Vec<_>>>()?;

    let (as_of, row) = table.resolve(request.date)?;
    if let Some(max_gap) = request.max_gap_days {
        let gap = (request.date - as_of).num_days();
        if gap > i64::from(max_gap) {
            debug!(
                requested = %request.date,
                %as_of,
                gap,
                max_gap,
                "Closest row is too old"
            );
            return Err(RateError::NoDataAvailable { date: request.date });
        }
    }

    let base_rate = *row
        .get(&base)
        .ok_or_else(|| RateError::UnknownCurrency(base.clone()))?;

    let targets = if targets.is_empty() {
        row.keys().cloned().collect()
    } else {
        targets
    };

    let mut rates = BTreeMap::new();
    for target in targets {
        let target_rate = *row
            .get(&target)
            .ok_or_else(|| RateError::UnknownCurrency(target.clone()))?;
        rates.insert(target, target_rate / base_rate);
    }

    debug!(
        %base,
        requested = %request.date,
        %as_of,
        count = rates.len(),
        "Converted rates"
    );

    Ok(ConversionResult {
        base,
        requested_date: request.date,
        as_of,
        rates,
    })
}
