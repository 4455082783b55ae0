//! Application state for the KrishiLok server
//!
//! Wraps the advisory services built once at startup.

use std::sync::Arc;
use std::time::Instant;

use krishilok::bootstrap::AdvisoryServices;
use krishilok::pipeline::Orchestrator;

/// Shared application state
pub struct AppState {
    pub services: AdvisoryServices,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(services: AdvisoryServices) -> Self {
        Self {
            services,
            started_at: Instant::now(),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.services.orchestrator
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
