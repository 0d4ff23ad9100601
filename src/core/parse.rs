//! Parses the archive's CSV into a [`RateTable`].
//!
//! The first column holds the date, every other header names a currency.
//! Cells marked `N/A` or left empty mean the currency was not quoted that day.

use crate::core::currency::{RateRow, RateTable, normalize_code};
use crate::core::error::{RateError, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use tracing::debug;

const NOT_QUOTED: &str = "N/A";

fn position_line(record: &StringRecord) -> u64 {
    record.position().map_or(0, |p| p.line())
}

fn currency_columns(headers: &StringRecord) -> Result<Vec<Option<String>>> {
    headers
        .iter()
        .skip(1)
        .map(|name| {
            if name.is_empty() {
                // ECB lines end with a trailing comma
                Ok(None)
            } else {
                normalize_code(name).map(Some).map_err(|_| {
                    RateError::malformed(1, format!("invalid currency header '{name}'"))
                })
            }
        })
        .collect()
}

fn parse_rate(value: &str, currency: &str, line: u64) -> Result<Option<f64>> {
    if value.is_empty() || value.eq_ignore_ascii_case(NOT_QUOTED) {
        return Ok(None);
    }
    let rate: f64 = value.parse().map_err(|_| {
        RateError::malformed(line, format!("non-numeric rate '{value}' for {currency}"))
    })?;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(RateError::malformed(
            line,
            format!("rate for {currency} must be positive, got {value}"),
        ));
    }
    Ok(Some(rate))
}

/// Reads CSV rates quoted against `reference`. Malformed rows are rejected,
/// never repaired.
pub fn parse<R: Read>(raw_csv: R, reference: &str) -> Result<RateTable> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(raw_csv);

    let headers = reader
        .headers()
        .map_err(|e| RateError::malformed(1, e.to_string()))?
        .clone();
    let columns = currency_columns(&headers)?;

    let mut table = RateTable::new(reference);
    for record in reader.records() {
        let record = record.map_err(|e| {
            let line = e.position().map_or(0, |p| p.line());
            RateError::malformed(line, e.to_string())
        })?;
        let line = position_line(&record);
        if record.len() < headers.len() {
            return Err(RateError::malformed(
                line,
                format!(
                    "expected {} fields, found {}",
                    headers.len(),
                    record.len()
                ),
            ));
        }

        let date_field = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(date_field, "%Y-%m-%d")
            .map_err(|_| RateError::malformed(line, format!("invalid date '{date_field}'")))?;

        let mut row = RateRow::new();
        for (index, value) in record.iter().skip(1).enumerate() {
            match columns.get(index) {
                Some(Some(currency)) => {
                    if let Some(rate) = parse_rate(value, currency, line)? {
                        row.insert(currency.clone(), rate);
                    }
                }
                Some(None) | None if value.is_empty() => {}
                _ => {
                    return Err(RateError::malformed(
                        line,
                        format!("value '{value}' has no currency header"),
                    ));
                }
            }
        }

        if !table.insert_row(date, row) {
            return Err(RateError::malformed(line, format!("duplicate date {date}")));
        }
    }

    debug!(
        rows = table.len(),
        earliest = ?table.earliest(),
        latest = ?table.latest(),
        "Parsed rate table"
    );
    Ok(table)
}
