//! European Central Bank historical reference rates.
//!
//! The ECB publishes every daily reference rate since 1999 as a zip archive
//! holding a single CSV, quoted against EUR.

use crate::core::cache::{KeyValueCollection, Store};
use crate::core::config::AppConfig;
use crate::core::error::{RateError, Result};
use crate::core::parse::parse;
use crate::core::{RateSource, RateTable};
use crate::providers::util::with_retry;
use async_trait::async_trait;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

const CACHE_COLLECTION: &str = "ecb";
const USER_AGENT: &str = concat!("xrates/", env!("CARGO_PKG_VERSION"));

/// Downloads the archive at `url`. Transport failures and non-success
/// statuses are reported as [`RateError::FetchFailed`]; no retry happens here.
pub async fn fetch(url: &str) -> Result<Vec<u8>> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| RateError::fetch_failed(url, e))?;

    debug!("Requesting exchange rate archive from {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| RateError::fetch_failed(url, format!("Request error: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RateError::http_status(
            url,
            status.as_u16(),
            format!("HTTP error: {status}"),
        ));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| RateError::fetch_failed(url, format!("Failed to read body: {e}")))?;
    debug!(bytes = body.len(), "Received exchange rate archive");
    Ok(body.to_vec())
}

/// Decompresses the archive in memory and returns the first CSV entry, or the
/// first file if none is named `*.csv`.
pub fn extract_csv(archive: &[u8]) -> Result<Vec<u8>> {
    let mut zip = ZipArchive::new(Cursor::new(archive))
        .map_err(|e| RateError::InvalidArchive(format!("Failed to read ZIP: {e}")))?;

    let mut first_file = None;
    let mut first_csv = None;
    for i in 0..zip.len() {
        let file = zip
            .by_index(i)
            .map_err(|e| RateError::InvalidArchive(format!("Failed to access file {i}: {e}")))?;
        if file.is_dir() {
            continue;
        }
        first_file.get_or_insert(i);
        if file.name().to_ascii_lowercase().ends_with(".csv") {
            first_csv = Some(i);
            break;
        }
    }

    let index = first_csv
        .or(first_file)
        .ok_or_else(|| RateError::InvalidArchive("archive contains no files".to_string()))?;

    let mut file = zip
        .by_index(index)
        .map_err(|e| RateError::InvalidArchive(format!("Failed to access file {index}: {e}")))?;
    let name = file.name().to_string();
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .map_err(|e| RateError::InvalidArchive(format!("Failed to read file {name}: {e}")))?;
    debug!(file = %name, bytes = contents.len(), "Extracted rate table");
    Ok(contents)
}

/// Loads the ECB rate table at most once per provider, going through the
/// cache collection before the network.
pub struct EcbArchiveProvider {
    url: String,
    reference: String,
    cache: Option<Arc<dyn KeyValueCollection>>,
    cache_ttl: Duration,
    retries: usize,
    retry_delay_ms: u64,
    table: OnceCell<Arc<RateTable>>,
}

impl EcbArchiveProvider {
    pub fn new(config: &AppConfig, store: &dyn Store) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| store.get_collection(CACHE_COLLECTION, true));
        Self::with_cache(config, cache)
    }

    pub fn with_cache(config: &AppConfig, cache: Option<Arc<dyn KeyValueCollection>>) -> Self {
        EcbArchiveProvider {
            url: config.source.url.clone(),
            reference: config.source.reference_currency.to_ascii_uppercase(),
            cache,
            cache_ttl: config.cache.ttl(),
            retries: config.fetch.retries,
            retry_delay_ms: config.fetch.retry_delay_ms,
            table: OnceCell::new(),
        }
    }

    fn cache_key(&self) -> String {
        format!("{}#{}", self.url, self.reference)
    }

    /// Drops the cached copy of the archive so the next load on a fresh
    /// provider downloads it again. A table already loaded by this provider
    /// is kept.
    pub async fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            debug!("Invalidating cached rate table for {}", self.url);
            cache.remove(self.cache_key().as_bytes()).await;
        }
    }

    async fn load_cached(&self) -> Option<RateTable> {
        let cache = self.cache.as_ref()?;
        let bytes = cache.get(self.cache_key().as_bytes()).await?;
        let table = match serde_json::from_slice::<RateTable>(&bytes) {
            Ok(table) => table,
            Err(e) => {
                warn!("Ignoring unreadable cached rate table: {}", e);
                return None;
            }
        };
        if table.is_empty() || table.reference() != self.reference {
            return None;
        }
        match table.validate() {
            Ok(()) => Some(table),
            Err(e) => {
                warn!("Ignoring corrupt cached rate table: {}", e);
                None
            }
        }
    }

    async fn store_cached(&self, table: &RateTable) {
        let Some(cache) = &self.cache else {
            return;
        };
        match serde_json::to_vec(table) {
            Ok(bytes) => {
                cache
                    .put(self.cache_key().as_bytes(), &bytes, Some(self.cache_ttl))
                    .await
            }
            Err(e) => warn!("Could not serialize rate table for caching: {}", e),
        }
    }

    #[instrument(name = "EcbArchiveLoad", skip(self), fields(url = %self.url))]
    async fn load(&self) -> Result<Arc<RateTable>> {
        if let Some(table) = self.load_cached().await {
            debug!(rows = table.len(), "Loaded rate table from cache");
            return Ok(Arc::new(table));
        }

        info!("Downloading exchange rate archive");
        let archive = with_retry(
            || fetch(&self.url),
            self.retries,
            self.retry_delay_ms,
            RateError::is_transient,
        )
        .await?;
        let csv = extract_csv(&archive)?;
        let table = parse(csv.as_slice(), &self.reference)?;
        if table.is_empty() {
            return Err(RateError::InvalidArchive(
                "archive contains no exchange rates".to_string(),
            ));
        }
        info!(
            rows = table.len(),
            earliest = ?table.earliest(),
            latest = ?table.latest(),
            "Loaded rate table"
        );

        self.store_cached(&table).await;
        Ok(Arc::new(table))
    }
}

#[async_trait]
impl RateSource for EcbArchiveProvider {
    async fn rate_table(&self) -> Result<Arc<RateTable>> {
        self.table.get_or_try_init(|| self.load()).await.cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;
    use chrono::NaiveDate;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zip::write::SimpleFileOptions;

    const ARCHIVE_PATH: &str = "/stats/eurofxref/eurofxref-hist.zip";

    const SAMPLE_CSV: &str = "\
Date,USD,JPY,CAD,
2023-10-02,1.0469,156.61,1.4354,
2023-09-29,1.0594,158.1,1.4316,
";

    fn zip_files(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in files {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn test_config(server: &MockServer) -> AppConfig {
        let mut config = AppConfig::default();
        config.source.url = format!("{}{}", server.uri(), ARCHIVE_PATH);
        config.fetch.retries = 0;
        config
    }

    async fn mount_archive(server: &MockServer, body: Vec<u8>, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path(ARCHIVE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_extract_prefers_csv_entry() {
        let archive = zip_files(&[("README.txt", "not rates"), ("eurofxref-hist.csv", SAMPLE_CSV)]);
        let csv = extract_csv(&archive).unwrap();
        assert_eq!(csv, SAMPLE_CSV.as_bytes());
    }

    #[test]
    fn test_extract_falls_back_to_first_file() {
        let archive = zip_files(&[("rates.dat", SAMPLE_CSV)]);
        assert_eq!(extract_csv(&archive).unwrap(), SAMPLE_CSV.as_bytes());
    }

    #[test]
    fn test_extract_rejects_non_zip() {
        let result = extract_csv(b"<html>Service unavailable</html>");
        assert!(matches!(result, Err(RateError::InvalidArchive(_))));
    }

    #[test]
    fn test_extract_rejects_empty_archive() {
        let archive = zip_files(&[]);
        let err = extract_csv(&archive).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid exchange rate archive: archive contains no files"
        );
    }

    #[tokio::test]
    async fn test_downloads_once_per_provider() {
        let server = MockServer::start().await;
        mount_archive(&server, zip_files(&[("eurofxref-hist.csv", SAMPLE_CSV)]), 1).await;

        let provider = EcbArchiveProvider::with_cache(&test_config(&server), None);
        let first = provider.rate_table().await.unwrap();
        let second = provider.rate_table().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.reference(), "EUR");
        assert_eq!(first.len(), 2);
        let (as_of, row) = first.resolve(date("2023-10-01")).unwrap();
        assert_eq!(as_of, date("2023-09-29"));
        assert_eq!(row.get("CAD"), Some(&1.4316));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_download() {
        let server = MockServer::start().await;
        mount_archive(&server, zip_files(&[("eurofxref-hist.csv", SAMPLE_CSV)]), 1).await;

        let provider = EcbArchiveProvider::with_cache(&test_config(&server), None);
        let (a, b, c) = tokio::join!(
            provider.rate_table(),
            provider.rate_table(),
            provider.rate_table()
        );
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(c.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cached_table_is_reused_by_new_provider() {
        let server = MockServer::start().await;
        mount_archive(&server, zip_files(&[("eurofxref-hist.csv", SAMPLE_CSV)]), 1).await;

        let config = test_config(&server);
        let cache: Arc<dyn KeyValueCollection> = Arc::new(MemoryCollection::new());

        let first = EcbArchiveProvider::with_cache(&config, Some(Arc::clone(&cache)));
        let downloaded = first.rate_table().await.unwrap();

        let second = EcbArchiveProvider::with_cache(&config, Some(Arc::clone(&cache)));
        let cached = second.rate_table().await.unwrap();
        assert_eq!(*cached, *downloaded);
    }

    #[tokio::test]
    async fn test_invalidate_cache_forces_download() {
        let server = MockServer::start().await;
        mount_archive(&server, zip_files(&[("eurofxref-hist.csv", SAMPLE_CSV)]), 2).await;

        let config = test_config(&server);
        let cache: Arc<dyn KeyValueCollection> = Arc::new(MemoryCollection::new());

        let first = EcbArchiveProvider::with_cache(&config, Some(Arc::clone(&cache)));
        first.rate_table().await.unwrap();
        first.invalidate_cache().await;

        let second = EcbArchiveProvider::with_cache(&config, Some(Arc::clone(&cache)));
        second.rate_table().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_is_ignored() {
        let server = MockServer::start().await;
        mount_archive(&server, zip_files(&[("eurofxref-hist.csv", SAMPLE_CSV)]), 1).await;

        let config = test_config(&server);
        let cache: Arc<dyn KeyValueCollection> = Arc::new(MemoryCollection::new());
        let provider = EcbArchiveProvider::with_cache(&config, Some(Arc::clone(&cache)));
        cache
            .put(provider.cache_key().as_bytes(), b"not json", None)
            .await;

        assert_eq!(provider.rate_table().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_http_error_is_fetch_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ARCHIVE_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = EcbArchiveProvider::with_cache(&test_config(&server), None);
        let err = provider.rate_table().await.unwrap_err();
        match err {
            RateError::FetchFailed {
                url,
                reason,
                status,
            } => {
                assert!(url.ends_with(ARCHIVE_PATH));
                assert_eq!(reason, "HTTP error: 503 Service Unavailable");
                assert_eq!(status, Some(503));
            }
            other => panic!("Expected FetchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_load_is_not_memoized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ARCHIVE_PATH))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_archive(&server, zip_files(&[("eurofxref-hist.csv", SAMPLE_CSV)]), 1).await;

        let provider = EcbArchiveProvider::with_cache(&test_config(&server), None);
        assert!(provider.rate_table().await.is_err());
        assert_eq!(provider.rate_table().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ARCHIVE_PATH))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_archive(&server, zip_files(&[("eurofxref-hist.csv", SAMPLE_CSV)]), 1).await;

        let mut config = test_config(&server);
        config.fetch.retries = 1;
        config.fetch.retry_delay_ms = 1;
        let provider = EcbArchiveProvider::with_cache(&config, None);
        assert_eq!(provider.rate_table().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_default_config_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ARCHIVE_PATH))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = AppConfig::default();
        config.source.url = format!("{}{}", server.uri(), ARCHIVE_PATH);
        let provider = EcbArchiveProvider::with_cache(&config, None);
        assert!(matches!(
            provider.rate_table().await,
            Err(RateError::FetchFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ARCHIVE_PATH))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.fetch.retries = 3;
        config.fetch.retry_delay_ms = 1;
        let provider = EcbArchiveProvider::with_cache(&config, None);
        let err = provider.rate_table().await.unwrap_err();
        assert!(matches!(
            err,
            RateError::FetchFailed {
                status: Some(404),
                ..
            }
        ));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_invalid_cached_table_is_ignored() {
        let server = MockServer::start().await;
        mount_archive(&server, zip_files(&[("eurofxref-hist.csv", SAMPLE_CSV)]), 1).await;

        let config = test_config(&server);
        let cache: Arc<dyn KeyValueCollection> = Arc::new(MemoryCollection::new());
        let provider = EcbArchiveProvider::with_cache(&config, Some(Arc::clone(&cache)));
        let corrupt = br#"{"reference":"EUR","rows":{"2023-10-02":{"EUR":1.0,"USD":-1.0469}}}"#;
        cache
            .put(provider.cache_key().as_bytes(), corrupt, None)
            .await;

        let table = provider.rate_table().await.unwrap();
        let (_, row) = table.resolve(date("2023-10-02")).unwrap();
        assert_eq!(row.get("USD"), Some(&1.0469));
    }

    #[tokio::test]
    async fn test_malformed_csv_is_reported() {
        let server = MockServer::start().await;
        let csv = "Date,USD\nyesterday,1.05\n";
        mount_archive(&server, zip_files(&[("eurofxref-hist.csv", csv)]), 1).await;

        let provider = EcbArchiveProvider::with_cache(&test_config(&server), None);
        assert!(matches!(
            provider.rate_table().await,
            Err(RateError::MalformedRow { line: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_archive_without_rows_is_invalid() {
        let server = MockServer::start().await;
        mount_archive(&server, zip_files(&[("eurofxref-hist.csv", "Date,USD,\n")]), 1).await;

        let provider = EcbArchiveProvider::with_cache(&test_config(&server), None);
        assert!(matches!(
            provider.rate_table().await,
            Err(RateError::InvalidArchive(_))
        ));
    }
}
