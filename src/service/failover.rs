use crate::config::SourcesConfig;
use crate::health::{ConnectionController, ConnectionState, Mode};
use serde::Serialize;
use tokio::sync::watch;

/// Which backing source dependents should read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Fallback,
}

/// Data source router - routes to the live dependency unless the operator
/// switched the controller into fallback mode
pub struct DataSourceRouter {
    /// Live source name
    live: String,
    /// Fallback source name
    fallback: String,
    /// Published controller state
    state: watch::Receiver<ConnectionState>,
}

impl DataSourceRouter {
    pub fn new(config: &SourcesConfig, controller: &ConnectionController) -> Self {
        Self::with_state(config, controller.watch())
    }

    /// Create from an existing state receiver
    pub fn with_state(config: &SourcesConfig, state: watch::Receiver<ConnectionState>) -> Self {
        Self {
            live: config.live.clone(),
            fallback: config.fallback.clone(),
            state,
        }
    }

    pub fn active_source(&self) -> DataSource {
        match self.state.borrow().mode {
            Mode::Live => DataSource::Live,
            Mode::Fallback => DataSource::Fallback,
        }
    }

    /// Get the current active source name
    pub fn active_name(&self) -> &str {
        match self.active_source() {
            DataSource::Live => &self.live,
            DataSource::Fallback => &self.fallback,
        }
    }

    /// Whether requests routed now can be expected to succeed: the live
    /// dependency is available, or the fallback source substitutes for it
    pub fn can_serve(&self) -> bool {
        self.state.borrow().is_available()
    }

    /// Get both source names
    pub fn source_names(&self) -> (&str, &str) {
        (&self.live, &self.fallback)
    }
}
