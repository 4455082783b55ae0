//! Service slots built by the composition root
//!
//! A service that could not be constructed at startup is kept as
//! [`ServiceSlot::Unavailable`] with the reason, so callers get a
//! "try again later" error instead of a missing global.

use serde::Serialize;

use crate::utils::error::{AdvisoryError, Result};

/// A service that is either ready or was not initialized
#[derive(Debug, Clone)]
pub enum ServiceSlot<T> {
    Ready(T),
    Unavailable { reason: String },
}

impl<T> ServiceSlot<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        ServiceSlot::Unavailable {
            reason: reason.into(),
        }
    }

    /// Borrow the service, or fail with `ServiceUnavailable` naming it
    pub fn ready(&self, name: &str) -> Result<&T> {
        match self {
            ServiceSlot::Ready(service) => Ok(service),
            ServiceSlot::Unavailable { reason } => Err(AdvisoryError::ServiceUnavailable(
                format!("{} is not available: {}", name, reason),
            )),
        }
    }

    pub fn as_ready(&self) -> Option<&T> {
        match self {
            ServiceSlot::Ready(service) => Some(service),
            ServiceSlot::Unavailable { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ServiceSlot::Ready(_))
    }

    pub fn status(&self) -> SlotStatus {
        match self {
            ServiceSlot::Ready(_) => SlotStatus {
                ready: true,
                reason: None,
            },
            ServiceSlot::Unavailable { reason } => SlotStatus {
                ready: false,
                reason: Some(reason.clone()),
            },
        }
    }
}

impl<T, E: std::fmt::Display> From<std::result::Result<T, E>> for ServiceSlot<T> {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(service) => ServiceSlot::Ready(service),
            Err(e) => ServiceSlot::unavailable(e.to_string()),
        }
    }
}

/// Serializable readiness report for health endpoints
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SlotStatus {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
