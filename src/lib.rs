pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod mailer;
pub mod stats;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::rate_limit::RateLimiter;
use crate::engine::DispatchJob;
use crate::mailer::Mailer;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub dispatch_tx: mpsc::Sender<DispatchJob>,
    pub mailer: Arc<dyn Mailer>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: DbPool,
        dispatch_tx: mpsc::Sender<DispatchJob>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            dispatch_tx,
            mailer,
            rate_limiter,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
