//! Currency codes and the date-indexed rate table

use crate::core::error::{RateError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Rates published for a single date, keyed by ISO 4217 code and quoted
/// against the table's reference currency.
pub type RateRow = HashMap<String, f64>;

/// Trims and uppercases a currency code. Anything other than three ASCII
/// letters cannot appear in the table and is reported as unknown.
pub fn normalize_code(code: &str) -> Result<String> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(RateError::UnknownCurrency(code.to_string()))
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| RateError::InvalidDate(value.to_string()))
}

/// Historical rates ordered by date. Built once and shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    reference: String,
    rows: BTreeMap<NaiveDate, RateRow>,
}

impl RateTable {
    pub fn new(reference: &str) -> Self {
        RateTable {
            reference: reference.to_ascii_uppercase(),
            rows: BTreeMap::new(),
        }
    }

    /// The currency every row is quoted against.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Adds the row for `date`, pinning the reference currency at 1.0.
    /// Returns `false` if the date was already present (the row is replaced).
    pub fn insert_row(&mut self, date: NaiveDate, mut row: RateRow) -> bool {
        row.insert(self.reference.clone(), 1.0);
        self.rows.insert(date, row).is_none()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn earliest(&self) -> Option<NaiveDate> {
        self.rows.keys().next().copied()
    }

    pub fn latest(&self) -> Option<NaiveDate> {
        self.rows.keys().next_back().copied()
    }

    /// Checks the invariants `insert_row` and the parser uphold, for tables
    /// that were built elsewhere (e.g. read back from a cache).
    pub fn validate(&self) -> Result<()> {
        if normalize_code(&self.reference).ok().as_deref() != Some(self.reference.as_str()) {
            return Err(RateError::InvalidArchive(format!(
                "invalid reference currency '{}'",
                self.reference
            )));
        }
        for (date, row) in &self.rows {
            if row.get(&self.reference) != Some(&1.0) {
                return Err(RateError::InvalidArchive(format!(
                    "{date}: {} is not quoted at 1.0",
                    self.reference
                )));
            }
            for (code, rate) in row {
                if normalize_code(code).ok().as_deref() != Some(code.as_str()) {
                    return Err(RateError::InvalidArchive(format!(
                        "{date}: invalid currency code '{code}'"
                    )));
                }
                if !rate.is_finite() || *rate <= 0.0 {
                    return Err(RateError::InvalidArchive(format!(
                        "{date}: rate for {code} must be positive, got {rate}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Finds the most recent row at or before `date`. Markets publish nothing
    /// on weekends and holidays, so gaps fall back to the previous business
    /// day. Later rows are never used.
    pub fn resolve(&self, date: NaiveDate) -> Result<(NaiveDate, &RateRow)> {
        self.rows
            .range(..=date)
            .next_back()
            .map(|(resolved, row)| (*resolved, row))
            .ok_or(RateError::NoDataAvailable { date })
    }
}
