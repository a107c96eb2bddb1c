//! Model lifecycle manager
//!
//! Decides whether a requested model is already serviceable, otherwise
//! restarts or rebuilds its container, and publishes the result as the
//! current model. The shared record is only locked to read or publish; the
//! driver and probe calls in between run unlocked, so concurrent
//! activations race and the last publisher wins.

use crate::catalog::{self, CatalogEntry};
use crate::config::ManagerConfig;
use crate::container::{ContainerDriver, UnitDescriptor};
use crate::dockerfile;
use crate::error::{ActivationStage, ManagerError, ManagerResult};
use crate::health::ReadinessProbe;
use crate::naming::UnitNames;
use crate::state::{ActiveModel, ModelState};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle knobs taken from [`ManagerConfig`]
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub models_dir: PathBuf,
    pub host_port: u16,
    pub memory_limit: String,
    pub existing_unit_ready_timeout: Duration,
    pub new_unit_ready_timeout: Duration,
    pub publish_before_ready: bool,
}

impl LifecycleSettings {
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            models_dir: config.models_dir.clone(),
            host_port: config.host_port,
            memory_limit: config.memory_limit.clone(),
            existing_unit_ready_timeout: config.existing_unit_ready_timeout(),
            new_unit_ready_timeout: config.new_unit_ready_timeout(),
            publish_before_ready: config.publish_before_ready,
        }
    }
}

/// Outcome of a successful activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activation {
    pub message: String,
    pub model: String,
    pub container_name: String,
    pub port: u16,
    /// True when no image was built
    pub already_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub gpu_available: bool,
    pub memory_limit: String,
    pub message: String,
}

pub struct ModelManager {
    state: Arc<ModelState>,
    driver: Arc<dyn ContainerDriver>,
    probe: Arc<dyn ReadinessProbe>,
    settings: LifecycleSettings,
}

impl ModelManager {
    pub fn new(
        state: Arc<ModelState>,
        driver: Arc<dyn ContainerDriver>,
        probe: Arc<dyn ReadinessProbe>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            state,
            driver,
            probe,
            settings,
        }
    }

    /// Snapshot of the current model record
    pub async fn current(&self) -> ActiveModel {
        self.state.snapshot().await
    }

    /// Make `raw_model` the current model, reusing whatever already exists
    pub async fn activate(&self, raw_model: &str) -> ManagerResult<Activation> {
        let model = raw_model.trim();
        if model.is_empty() {
            return Err(ManagerError::Validation(
                "Model name is required".to_string(),
            ));
        }

        self.transition(model)
            .await
            .inspect_err(|e| {
                tracing::error!(model = %model, error = %e, "Activation failed");
                crate::metrics::record_activation(model, "failed");
            })
    }

    async fn transition(&self, model: &str) -> ManagerResult<Activation> {
        let names = UnitNames::for_model(model);
        let port = self.settings.host_port;

        tracing::info!(model = %model, container = %names.unit, "Activating model");

        let current = self.state.snapshot().await;
        if current.is_running && current.unit_name.contains(&names.safe) {
            tracing::info!(container = %current.unit_name, "Model is already running");
            crate::metrics::record_activation(model, "already_active");
            return Ok(Activation {
                message: "Model is already running and ready".to_string(),
                model: model.to_string(),
                container_name: current.unit_name,
                port: current.port,
                already_exists: true,
            });
        }

        if self.driver.unit_exists(&names.unit).await
            && let Some(activation) = self.reuse_existing(model, &names).await
        {
            crate::metrics::record_activation(model, "reused");
            return Ok(activation);
        }

        self.state.release().await;

        dockerfile::prepare(&self.settings.models_dir, model)
            .await
            .map_err(|e| ManagerError::activation(ActivationStage::Prepare, e))?;

        self.driver
            .build(&self.settings.models_dir, &names.image)
            .await
            .map_err(|e| ManagerError::activation(ActivationStage::Build, e))?;

        self.driver
            .run(&names.image, &names.unit, port)
            .await
            .map_err(|e| ManagerError::activation(ActivationStage::Run, e))?;

        let record = ActiveModel::running(&names.unit, port);
        if self.settings.publish_before_ready {
            // Published ahead of readiness; a timeout below leaves it in place
            // because the container may still come up
            self.state.publish(record.clone()).await;
        }

        self.probe
            .wait_until_ready(&names.unit, self.settings.new_unit_ready_timeout)
            .await
            .map_err(|e| ManagerError::activation(ActivationStage::Start, e))?;

        if !self.settings.publish_before_ready {
            self.state.publish(record).await;
        }

        tracing::info!(model = %model, container = %names.unit, "Model created and started");
        crate::metrics::record_activation(model, "created");

        Ok(Activation {
            message: "Model created and container started successfully".to_string(),
            model: model.to_string(),
            container_name: names.unit,
            port,
            already_exists: false,
        })
    }

    /// Restart a stopped container. `None` means fall back to a rebuild.
    async fn reuse_existing(&self, model: &str, names: &UnitNames) -> Option<Activation> {
        let port = self.settings.host_port;

        tracing::info!(container = %names.unit, "Container already exists, starting it");

        if let Err(e) = self.driver.start_existing(&names.unit).await {
            tracing::warn!(
                container = %names.unit,
                error = %e,
                "Failed to start existing container, rebuilding"
            );
            return None;
        }

        let record = ActiveModel::running(&names.unit, port);
        if self.settings.publish_before_ready {
            self.state.publish(record.clone()).await;
        }

        // The rebuild path's `run` replaces this container
        if let Err(e) = self
            .probe
            .wait_until_ready(&names.unit, self.settings.existing_unit_ready_timeout)
            .await
        {
            tracing::warn!(
                container = %names.unit,
                error = %e,
                "Existing container did not become ready, rebuilding"
            );
            return None;
        }

        if !self.settings.publish_before_ready {
            self.state.publish(record).await;
        }

        Some(Activation {
            message: "Existing model container started successfully".to_string(),
            model: model.to_string(),
            container_name: names.unit.clone(),
            port,
            already_exists: true,
        })
    }

    /// Remove a model's container and image. Returns whether it was the
    /// current model.
    pub async fn delete_model(&self, raw_model: &str) -> ManagerResult<bool> {
        let model = raw_model.trim();
        if model.is_empty() {
            return Err(ManagerError::Validation(
                "Model name is required".to_string(),
            ));
        }

        let names = UnitNames::for_model(model);
        self.driver.delete_unit(&names.safe).await?;

        let was_current = self.state.reset_if_current(&names.unit).await;

        tracing::info!(
            model = %model,
            container = %names.unit,
            was_current = was_current,
            "Model deleted"
        );
        crate::metrics::record_model_deleted(model);

        Ok(was_current)
    }

    /// Adopt the first running container as current, or clear the record
    /// when none is running
    pub async fn resync(&self) -> ManagerResult<Option<ActiveModel>> {
        let units = self.driver.list_units().await?;
        crate::metrics::record_resync();

        match units.into_iter().find(|unit| unit.is_running) {
            Some(unit) => {
                let record = ActiveModel::running(unit.container_name, self.settings.host_port);
                self.state.publish(record.clone()).await;
                Ok(Some(record))
            }
            None => {
                tracing::info!("No running model containers found");
                self.state.reset().await;
                Ok(None)
            }
        }
    }

    pub async fn installed_models(&self) -> ManagerResult<Vec<UnitDescriptor>> {
        self.driver.list_units().await
    }

    /// Curated models plus locally built ones. A failed image listing only
    /// drops the local part.
    pub async fn available_models(&self) -> Vec<CatalogEntry> {
        match self.driver.list_images().await {
            Ok(images) => catalog::merge(&images),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list local images");
                catalog::popular_models()
            }
        }
    }

    pub async fn system_info(&self) -> SystemInfo {
        let gpu_available = self.driver.accelerator_available().await;
        let limit = self.settings.memory_limit.to_uppercase();
        let message = if gpu_available {
            format!(
                "GPU acceleration available - models will use GPU with {}B memory limit",
                limit
            )
        } else {
            format!("CPU only - models will use CPU with {}B memory limit", limit)
        };

        SystemInfo {
            gpu_available,
            memory_limit: format!("{}B", limit),
            message,
        }
    }
}
