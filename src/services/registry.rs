//! Read-only adapter registry, populated once at process start.
//!
//! Each closed-set backend is capability-probed; engines whose runtime
//! dependency is missing are simply absent from the registry rather than
//! present-but-broken. No runtime mutation after construction.

use log::{info, warn};
use std::sync::Arc;

use crate::config::Config;
use crate::services::engines::{PaddleAdapter, RecognitionAdapter, TesseractAdapter, TrocrAdapter};

pub struct EngineRegistry {
    adapters: Vec<Arc<dyn RecognitionAdapter>>,
}

impl EngineRegistry {
    /// Build the registry from the closed adapter set, keeping only the
    /// backends that pass their capability probe.
    pub async fn probe(config: &Config) -> Self {
        let mut candidates: Vec<Arc<dyn RecognitionAdapter>> = Vec::new();

        if let Some(url) = &config.paddle_url {
            candidates.push(Arc::new(PaddleAdapter::new(url.clone())));
        }
        candidates.push(Arc::new(TesseractAdapter::new(config.tesseract_cmd.clone())));
        if let Some(url) = &config.trocr_url {
            candidates.push(Arc::new(TrocrAdapter::new(url.clone())));
        }

        let mut adapters: Vec<Arc<dyn RecognitionAdapter>> = Vec::new();
        for adapter in candidates {
            if adapter.probe().await {
                info!("Engine available: {} ({})", adapter.engine_id(), adapter.description());
                adapters.push(adapter);
            } else {
                warn!("Engine unavailable, skipping: {}", adapter.engine_id());
            }
        }

        Self { adapters }
    }

    /// Registry over a caller-supplied adapter set, bypassing the probe.
    pub fn with_adapters(adapters: Vec<Arc<dyn RecognitionAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn get(&self, engine_id: &str) -> Option<Arc<dyn RecognitionAdapter>> {
        self.adapters
            .iter()
            .find(|adapter| adapter.engine_id() == engine_id)
            .cloned()
    }

    /// Engine identifiers in registration order.
    pub fn engine_ids(&self) -> Vec<String> {
        self.adapters
            .iter()
            .map(|adapter| adapter.engine_id().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}
