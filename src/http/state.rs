use crate::config::Config;
use crate::credential::StsIssuer;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone, Default)]
pub struct AppState {
    /// Token issuer; `None` when no service key or region is configured
    pub issuer: Option<Arc<StsIssuer>>,
}

impl AppState {
    pub fn new(issuer: Option<StsIssuer>) -> Self {
        Self {
            issuer: issuer.map(Arc::new),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.issuer_credentials()
                .map(|(key, region)| StsIssuer::new(key, region)),
        )
    }
}
