pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::currency::parse_date;
use crate::core::error::Result as RateResult;
use crate::core::{ConversionRequest, RateSource, convert};
use crate::providers::EcbArchiveProvider;
use crate::store::KeyValueStore;
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tokio::task;
use tracing::{debug, warn};

pub use crate::core::RateError;

pub enum AppCommand {
    Rates {
        base: Option<String>,
        targets: Vec<String>,
        date: Option<String>,
        max_gap_days: Option<u32>,
    },
    Currencies {
        date: Option<String>,
    },
    Refresh,
}

fn open_store(config: &AppConfig) -> KeyValueStore {
    if !config.cache.enabled {
        return KeyValueStore::in_memory();
    }
    match config.default_data_path() {
        Ok(path) => KeyValueStore::open(&path),
        Err(e) => {
            warn!("{}. Caching in memory only", e);
            KeyValueStore::in_memory()
        }
    }
}

fn build_default_provider() -> EcbArchiveProvider {
    let config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {:#}", e);
        AppConfig::default()
    });
    EcbArchiveProvider::new(&config, &open_store(&config))
}

// One download per process, shared by every `get_exchange_rates` call
static DEFAULT_PROVIDER: OnceCell<EcbArchiveProvider> = OnceCell::const_new();

/// Builds the shared provider on first use. Reading the config file and
/// opening the disk cache block, so that runs on the blocking pool.
async fn default_provider() -> &'static EcbArchiveProvider {
    DEFAULT_PROVIDER
        .get_or_init(|| async {
            match task::spawn_blocking(build_default_provider).await {
                Ok(provider) => provider,
                Err(e) => {
                    warn!("Failed to set up default provider, caching in memory only: {}", e);
                    EcbArchiveProvider::new(&AppConfig::default(), &KeyValueStore::in_memory())
                }
            }
        })
        .await
}

/// Returns the rate of each target currency relative to `base_currency` on
/// `on_date` (`YYYY-MM-DD`), using the ECB historical archive.
///
/// Codes are case-insensitive and returned uppercase. On dates without
/// published rates the closest earlier business day is used. The base maps
/// to exactly `1.0` when requested.
///
/// ```no_run
/// # async fn example() -> Result<(), xrates::RateError> {
/// let rates = xrates::get_exchange_rates("USD", &["EUR", "CAD", "USD"], "2023-10-01").await?;
/// assert_eq!(rates["USD"], 1.0);
/// # Ok(())
/// # }
/// ```
pub async fn get_exchange_rates<S: AsRef<str> + Sync>(
    base_currency: &str,
    target_currencies: &[S],
    on_date: &str,
) -> RateResult<BTreeMap<String, f64>> {
    let provider = default_provider().await;
    get_exchange_rates_from(provider, base_currency, target_currencies, on_date).await
}

/// Same as [`get_exchange_rates`] but reads rates from `source`.
pub async fn get_exchange_rates_from<S: AsRef<str> + Sync>(
    source: &dyn RateSource,
    base_currency: &str,
    target_currencies: &[S],
    on_date: &str,
) -> RateResult<BTreeMap<String, f64>> {
    let date = parse_date(on_date)?;
    let table = source.rate_table().await?;
    let request = ConversionRequest::new(base_currency, target_currencies, date);
    Ok(convert(&table, &request)?.rates)
}

fn resolve_date(date: Option<&str>) -> RateResult<NaiveDate> {
    date.map_or_else(|| Ok(Utc::now().date_naive()), parse_date)
}

pub async fn run_command(
    command: AppCommand,
    config_path: Option<&str>,
    no_cache: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    if no_cache {
        config.cache.enabled = false;
    }
    debug!("Loaded config: {config:#?}");

    let store = open_store(&config);
    let provider = EcbArchiveProvider::new(&config, &store);

    match command {
        AppCommand::Rates {
            base,
            targets,
            date,
            max_gap_days,
        } => {
            let base = base
                .or_else(|| config.default_base.clone())
                .unwrap_or_else(|| config.source.reference_currency.clone());
            let date = resolve_date(date.as_deref())?;
            cli::rates::run(
                &provider,
                &base,
                &targets,
                date,
                max_gap_days.or(config.max_gap_days),
            )
            .await
        }
        AppCommand::Currencies { date } => {
            let date = resolve_date(date.as_deref())?;
            cli::currencies::run(&provider, date).await
        }
        AppCommand::Refresh => cli::refresh::run(&provider).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RateTable;

    fn example_table() -> RateTable {
        let mut table = RateTable::new("EUR");
        table.insert_row(
            NaiveDate::from_ymd_opt(2023, 10, 1).unwrap(),
            [("USD".to_string(), 1.053), ("CAD".to_string(), 1.4335)].into(),
        );
        table
    }

    #[tokio::test]
    async fn test_get_exchange_rates_from_table() {
        let table = example_table();
        let rates = get_exchange_rates_from(&table, "usd", &["EUR", "CAD", "USD"], "2023-10-01")
            .await
            .unwrap();

        assert_eq!(rates.len(), 3);
        assert!((rates["EUR"] - 0.9496676163342831).abs() < 1e-12);
        assert!((rates["CAD"] - 1.3613485280151947).abs() < 1e-12);
        assert_eq!(rates["USD"], 1.0);

        let rates = get_exchange_rates_from(&table, "EUR", &["EUR", "CAD", "USD"], "2023-10-01")
            .await
            .unwrap();
        assert_eq!(rates["EUR"], 1.0);
        assert_eq!(rates["CAD"], 1.4335);
        assert_eq!(rates["USD"], 1.053);
    }

    #[tokio::test]
    async fn test_get_exchange_rates_errors() {
        let table = example_table();

        let result = get_exchange_rates_from(&table, "EUR", &["XYZ"], "2023-10-01").await;
        assert!(matches!(result, Err(RateError::UnknownCurrency(c)) if c == "XYZ"));

        let result = get_exchange_rates_from(&table, "EUR", &["USD"], "2023-09-30").await;
        assert!(matches!(result, Err(RateError::NoDataAvailable { .. })));

        let result = get_exchange_rates_from(&table, "EUR", &["USD"], "October 1st").await;
        assert!(matches!(result, Err(RateError::InvalidDate(d)) if d == "October 1st"));
    }

    #[tokio::test]
    async fn test_default_provider_is_built_once() {
        let (first, second) = tokio::join!(default_provider(), default_provider());
        assert!(std::ptr::eq(first, second));
        assert!(std::ptr::eq(first, default_provider().await));
    }

    #[test]
    fn test_resolve_date() {
        assert_eq!(
            resolve_date(Some("2023-10-01")).unwrap(),
            NaiveDate::from_ymd_opt(2023, 10, 1).unwrap()
        );
        assert_eq!(resolve_date(None).unwrap(), Utc::now().date_naive());
        assert!(resolve_date(Some("2023-13-01")).is_err());
    }
}
