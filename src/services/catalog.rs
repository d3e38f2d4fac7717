//! Process-lifetime cache of the attraction catalog
//!
//! The first caller fetches from the provider; concurrent first callers wait
//! on that single fetch. There is no TTL: once loaded the list never changes,
//! so provider-side edits are not picked up until restart.

use crate::domain::types::Attraction;
use crate::error::ProviderError;
use crate::io::providers::AttractionProvider;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub struct AttractionCatalog {
    provider: Arc<dyn AttractionProvider>,
    attractions: OnceCell<Arc<[Attraction]>>,
}

impl AttractionCatalog {
    pub fn new(provider: Arc<dyn AttractionProvider>) -> Self {
        Self { provider, attractions: OnceCell::new() }
    }

    /// Return the catalog, fetching it on first use
    ///
    /// A failed fetch stores nothing, so the next call tries again.
    pub async fn list(&self) -> Result<Arc<[Attraction]>, ProviderError> {
        self.attractions
            .get_or_try_init(|| async {
                match self.provider.attractions().await {
                    Ok(attractions) => {
                        info!(count = %attractions.len(), "attraction_catalog_loaded");
                        Ok(Arc::from(attractions))
                    }
                    Err(e) => {
                        warn!(error = %e, "attraction_catalog_fetch_failed");
                        Err(e)
                    }
                }
            })
            .await
            .map(Arc::clone)
    }

    pub fn is_loaded(&self) -> bool {
        self.attractions.initialized()
    }
}
