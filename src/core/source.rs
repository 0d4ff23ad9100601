//! Rate table source abstractions

use crate::core::currency::RateTable;
use crate::core::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Anything that can produce the historical rate table.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn rate_table(&self) -> Result<Arc<RateTable>>;
}

#[async_trait]
impl RateSource for RateTable {
    async fn rate_table(&self) -> Result<Arc<RateTable>> {
        Ok(Arc::new(self.clone()))
    }
}
