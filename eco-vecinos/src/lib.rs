pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use metrics_exporter_prometheus::PrometheusHandle;
use services::{backend::DocumentStore, AuthGateway, SessionRegistry};
use std::sync::Arc;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<AuthGateway>,
    pub sessions: Arc<SessionRegistry>,
    pub documents: Arc<dyn DocumentStore>,
    /// Prefix for meeting video-room links.
    pub video_base_url: Arc<str>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        gateway: Arc<AuthGateway>,
        sessions: Arc<SessionRegistry>,
        documents: Arc<dyn DocumentStore>,
        video_base_url: &str,
    ) -> Self {
        Self {
            gateway,
            sessions,
            documents,
            video_base_url: Arc::from(video_base_url),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
