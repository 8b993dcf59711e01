//! Application state.

use std::sync::Arc;

use unmark_media::capability::{CapabilityCache, SystemProbe};

use crate::config::ApiConfig;
use crate::lifecycle::ArtifactJanitor;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub capabilities: Arc<CapabilityCache>,
    pub janitor: Arc<ArtifactJanitor>,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.work_dir).await?;

        let capabilities = CapabilityCache::with_ttl(Arc::new(SystemProbe), config.capability_ttl);

        Ok(Self {
            capabilities: Arc::new(capabilities),
            janitor: Arc::new(ArtifactJanitor::new()),
            config,
        })
    }
}
