//! The process-wide "current model" record
//!
//! One [`ActiveModel`] is current at any instant. It is replaced wholesale
//! under the write lock; callers only ever see cloned snapshots, so no guard
//! outlives a method call here.

use serde::Serialize;
use tokio::sync::RwLock;

/// Which container, if any, currently serves chat traffic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActiveModel {
    #[serde(rename = "name")]
    pub unit_name: String,
    pub port: u16,
    pub is_running: bool,
}

impl ActiveModel {
    pub fn running(unit_name: impl Into<String>, port: u16) -> Self {
        Self {
            unit_name: unit_name.into(),
            port,
            is_running: true,
        }
    }

    /// A record serving traffic, or `None`
    pub fn into_running(self) -> Option<Self> {
        self.is_running.then_some(self)
    }
}

/// Shared holder of the current [`ActiveModel`]
#[derive(Debug, Default)]
pub struct ModelState {
    current: RwLock<ActiveModel>,
}

impl ModelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current record
    pub async fn snapshot(&self) -> ActiveModel {
        self.current.read().await.clone()
    }

    /// Name of the running container, if any
    pub async fn running_unit(&self) -> Option<String> {
        let current = self.current.read().await;
        current.is_running.then(|| current.unit_name.clone())
    }

    /// Replace the current record
    pub async fn publish(&self, record: ActiveModel) {
        let mut current = self.current.write().await;
        tracing::info!(
            container = %record.unit_name,
            port = record.port,
            running = record.is_running,
            "Current model published"
        );
        *current = record;
        crate::metrics::set_model_active(current.is_running);
    }

    /// Drop the current designation without touching the container
    pub async fn release(&self) {
        let mut current = self.current.write().await;
        if current.is_running && !current.unit_name.is_empty() {
            tracing::info!(container = %current.unit_name, "Releasing current model");
            *current = ActiveModel {
                is_running: false,
                ..current.clone()
            };
            crate::metrics::set_model_active(false);
        }
    }

    /// Reset to the empty record
    pub async fn reset(&self) {
        *self.current.write().await = ActiveModel::default();
        crate::metrics::set_model_active(false);
    }

    /// Reset only when `unit_name` is the current container.
    /// Returns whether a reset happened.
    pub async fn reset_if_current(&self, unit_name: &str) -> bool {
        let mut current = self.current.write().await;
        if current.unit_name == unit_name {
            *current = ActiveModel::default();
            crate::metrics::set_model_active(false);
            true
        } else {
            false
        }
    }
}
