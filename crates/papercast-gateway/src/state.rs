//! Gateway shared state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use papercast_core::config::Config;
use papercast_pipeline::Pipeline;

/// Shared gateway state accessible from all handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub started_at: DateTime<Utc>,
    #[cfg(feature = "metrics")]
    pub prometheus: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config,
            pipeline,
            started_at: Utc::now(),
            #[cfg(feature = "metrics")]
            prometheus: None,
        }
    }

    /// Build state with the providers named in config.
    pub fn from_config(config: Arc<Config>) -> papercast_core::error::Result<Self> {
        let pipeline = Pipeline::from_config(Arc::clone(&config))?;
        Ok(Self::new(config, Arc::new(pipeline)))
    }

    #[cfg(feature = "metrics")]
    pub fn with_prometheus(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
