use super::ui;
use crate::core::RateSource;
use crate::providers::EcbArchiveProvider;
use anyhow::Result;

/// Drops the cached archive and downloads it again.
pub async fn run(provider: &EcbArchiveProvider) -> Result<()> {
    provider.invalidate_cache().await;
    let table = ui::with_spinner("Downloading exchange rates", provider.rate_table()).await?;

    match (table.earliest(), table.latest()) {
        (Some(earliest), Some(latest)) => println!(
            "Loaded {} days of {} rates ({} to {})",
            table.len(),
            table.reference(),
            earliest,
            latest
        ),
        _ => println!("Loaded an empty rate table"),
    }
    Ok(())
}
