//! Docker container driver
//!
//! Every operation is a single invocation of the container runtime CLI.
//! Nothing here retries; a failed invocation surfaces as
//! [`ManagerError::Runtime`] carrying the command's stderr.

use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::naming;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use tokio::process::Command;
use tokio::sync::OnceCell;

/// Status substring docker reports for a running container
const RUNNING_MARKER: &str = "Up";

/// Port the ollama server listens on inside every container
pub const CONTAINER_INFERENCE_PORT: u16 = 11434;

// ============================================================================
// Trait Definitions
// ============================================================================

/// A container known to the runtime, derived on every listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitDescriptor {
    /// Model name recovered from the container name
    #[serde(rename = "name")]
    pub model: String,
    pub container_name: String,
    /// Free-text status as reported by the runtime
    pub status: String,
    pub ports: String,
    pub is_running: bool,
}

/// A locally built image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalImage {
    /// `repository:tag`
    pub reference: String,
    pub size: String,
}

/// Operations on the container runtime
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    /// Whether a container with exactly this name exists, running or stopped
    async fn unit_exists(&self, name: &str) -> bool;

    /// Start a stopped container
    async fn start_existing(&self, name: &str) -> ManagerResult<()>;

    /// Build an image from a prepared build context
    async fn build(&self, context_dir: &Path, image: &str) -> ManagerResult<()>;

    /// Replace any container of the same name and launch a new one
    async fn run(&self, image: &str, unit: &str, port: u16) -> ManagerResult<()>;

    /// List containers following the `ollama-*-container` convention
    async fn list_units(&self) -> ManagerResult<Vec<UnitDescriptor>>;

    /// List locally built ollama images
    async fn list_images(&self) -> ManagerResult<Vec<LocalImage>>;

    /// Whether containers can be given GPU access. Never fails.
    async fn accelerator_available(&self) -> bool;

    /// Force-remove a model's container, then try to remove its image
    async fn delete_unit(&self, safe_name: &str) -> ManagerResult<()>;
}

// ============================================================================
// Production Implementation
// ============================================================================

/// Driver backed by the docker CLI
pub struct DockerDriver {
    binary: String,
    network: Option<String>,
    memory_limit: String,
    gpu_probe_image: String,
    /// Set once GPU passthrough has worked
    accelerator: OnceCell<()>,
}

impl DockerDriver {
    pub fn new(
        binary: impl Into<String>,
        network: Option<String>,
        memory_limit: impl Into<String>,
        gpu_probe_image: impl Into<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            network,
            memory_limit: memory_limit.into(),
            gpu_probe_image: gpu_probe_image.into(),
            accelerator: OnceCell::new(),
        }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(
            config.docker_binary.clone(),
            config.docker_network.clone(),
            config.memory_limit.clone(),
            config.gpu_probe_image.clone(),
        )
    }

    /// Arguments for `docker run`
    pub fn run_args(&self, image: &str, unit: &str, port: u16, gpu: bool) -> Vec<String> {
        let mut args: Vec<String> = vec!["run".into(), "-d".into(), "--name".into(), unit.into()];

        if let Some(network) = &self.network {
            args.push("--network".into());
            args.push(network.clone());
        }

        args.push("-p".into());
        args.push(format!("{}:{}", port, CONTAINER_INFERENCE_PORT));
        args.push("--restart".into());
        args.push("unless-stopped".into());
        args.push("--memory".into());
        args.push(self.memory_limit.clone());

        if gpu {
            args.push("--gpus".into());
            args.push("all".into());
        }

        args.push(image.into());
        args
    }

    /// Run the runtime CLI and return stdout, or the stderr as an error
    async fn docker<S: AsRef<str>>(&self, args: &[S]) -> ManagerResult<String> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        let command = format!(
            "{} {}",
            self.binary,
            args.first().copied().unwrap_or_default()
        );

        tracing::debug!(binary = %self.binary, args = ?args, "Invoking container runtime");

        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| ManagerError::Runtime {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(ManagerError::Runtime { command, message });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn probe_accelerator(&self) -> bool {
        if crate::gpu::detect_gpus().await.is_none() {
            return false;
        }

        let trial = [
            "run",
            "--rm",
            "--gpus",
            "all",
            self.gpu_probe_image.as_str(),
        ];
        match self.docker(&trial).await {
            Ok(_) => {
                tracing::info!("GPU support detected and available");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Docker GPU support not available");
                false
            }
        }
    }
}

#[async_trait]
impl ContainerDriver for DockerDriver {
    async fn unit_exists(&self, name: &str) -> bool {
        match self.docker(&["ps", "-a", "--format", "{{.Names}}"]).await {
            Ok(stdout) => stdout.lines().any(|line| line.trim() == name),
            Err(e) => {
                tracing::warn!(error = %e, container = %name, "Failed to list containers");
                false
            }
        }
    }

    async fn start_existing(&self, name: &str) -> ManagerResult<()> {
        self.docker(&["start", name]).await?;
        tracing::info!(container = %name, "Existing container started");
        Ok(())
    }

    async fn build(&self, context_dir: &Path, image: &str) -> ManagerResult<()> {
        let context = context_dir.to_string_lossy();
        tracing::info!(image = %image, context = %context, "Building image");

        let stdout = self.docker(&["build", "-t", image, context.as_ref()]).await?;
        for line in stdout.lines().rev().take(5).collect::<Vec<_>>().into_iter().rev() {
            tracing::debug!(image = %image, output = %line, "docker build");
        }

        tracing::info!(image = %image, "Image built");
        Ok(())
    }

    async fn run(&self, image: &str, unit: &str, port: u16) -> ManagerResult<()> {
        // Clean slate: a missing container makes this fail, which is fine
        if let Err(e) = self.docker(&["rm", "-f", unit]).await {
            tracing::debug!(container = %unit, error = %e, "No previous container removed");
        }

        let gpu = self.accelerator_available().await;
        let args = self.run_args(image, unit, port, gpu);

        tracing::info!(
            container = %unit,
            image = %image,
            port = port,
            gpu = gpu,
            memory_limit = %self.memory_limit,
            "Starting container"
        );

        self.docker(&args).await?;
        Ok(())
    }

    async fn list_units(&self) -> ManagerResult<Vec<UnitDescriptor>> {
        let stdout = self
            .docker(&[
                "ps",
                "-a",
                "--format",
                "{{.Names}}\t{{.Status}}\t{{.Ports}}",
            ])
            .await?;
        Ok(parse_unit_listing(&stdout))
    }

    async fn list_images(&self) -> ManagerResult<Vec<LocalImage>> {
        let stdout = self
            .docker(&[
                "images",
                "--format",
                "{{.Repository}}:{{.Tag}}\t{{.Size}}",
            ])
            .await?;
        Ok(parse_image_listing(&stdout))
    }

    async fn accelerator_available(&self) -> bool {
        remember_success(&self.accelerator, || self.probe_accelerator()).await
    }

    async fn delete_unit(&self, safe_name: &str) -> ManagerResult<()> {
        let unit = naming::unit_name(safe_name);
        self.docker(&["rm", "-f", unit.as_str()]).await?;

        // Image removal is best effort; a dangling image does not fail the delete
        let image = naming::image_name(safe_name);
        if let Err(e) = self.docker(&["rmi", "-f", image.as_str()]).await {
            tracing::warn!(image = %image, error = %e, "Failed to remove image");
        }

        tracing::info!(container = %unit, "Container deleted");
        Ok(())
    }
}

/// Parse `docker ps -a --format {{.Names}}\t{{.Status}}\t{{.Ports}}`
pub fn parse_unit_listing(stdout: &str) -> Vec<UnitDescriptor> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let name = parts.next()?.trim();
            if !naming::is_managed_unit(name) {
                return None;
            }
            let status = parts.next()?.trim().to_string();
            let ports = parts.next().unwrap_or_default().trim().to_string();

            Some(UnitDescriptor {
                model: naming::model_from_unit(name).to_string(),
                container_name: name.to_string(),
                is_running: status.contains(RUNNING_MARKER),
                status,
                ports,
            })
        })
        .collect()
}

/// Parse `docker images --format {{.Repository}}:{{.Tag}}\t{{.Size}}`,
/// keeping built model images and skipping the ollama base image
pub fn parse_image_listing(stdout: &str) -> Vec<LocalImage> {
    stdout
        .lines()
        .filter(|line| line.contains("ollama") && !line.contains("ollama/ollama"))
        .filter_map(|line| {
            let (reference, size) = line.split_once('\t')?;
            Some(LocalImage {
                reference: reference.trim().to_string(),
                size: size.trim().to_string(),
            })
        })
        .collect()
}

/// Answer `true` for good once `check` has succeeded. A failed check is not
/// remembered, so the next call runs it again.
async fn remember_success<F, Fut>(cell: &OnceCell<()>, check: F) -> bool
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    cell.get_or_try_init(|| async { if check().await { Ok(()) } else { Err(()) } })
        .await
        .is_ok()
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Ordered log of calls, shareable across mocks
    pub type Journal = Arc<Mutex<Vec<String>>>;

    /// Mock driver recording every call
    pub struct MockDriver {
        journal: Journal,
        existing: Mutex<HashSet<String>>,
        units: Vec<UnitDescriptor>,
        images: Vec<LocalImage>,
        failing: HashSet<&'static str>,
    }

    impl Default for MockDriver {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockDriver {
        pub fn new() -> Self {
            Self::with_journal(Journal::default())
        }

        pub fn with_journal(journal: Journal) -> Self {
            Self {
                journal,
                existing: Mutex::new(HashSet::new()),
                units: Vec::new(),
                images: Vec::new(),
                failing: HashSet::new(),
            }
        }

        /// Pretend a container with this name already exists
        pub fn with_existing_unit(self, name: &str) -> Self {
            self.existing.lock().unwrap().insert(name.to_string());
            self
        }

        pub fn with_units(mut self, units: Vec<UnitDescriptor>) -> Self {
            self.units = units;
            self
        }

        pub fn with_images(mut self, images: Vec<LocalImage>) -> Self {
            self.images = images;
            self
        }

        /// Make an operation (`start`, `build`, `run`, `delete`, `list`) fail
        pub fn failing(mut self, op: &'static str) -> Self {
            self.failing.insert(op);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.journal.lock().unwrap().clone()
        }

        /// Number of calls whose entry starts with `op:`
        pub fn count(&self, op: &str) -> usize {
            let prefix = format!("{}:", op);
            self.calls().iter().filter(|c| c.starts_with(&prefix)).count()
        }

        fn record(&self, entry: String) {
            self.journal.lock().unwrap().push(entry);
        }

        fn outcome(&self, op: &'static str) -> ManagerResult<()> {
            if self.failing.contains(op) {
                Err(ManagerError::Runtime {
                    command: format!("docker {}", op),
                    message: "simulated failure".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    pub fn unit(model: &str, running: bool) -> UnitDescriptor {
        UnitDescriptor {
            model: model.to_string(),
            container_name: naming::unit_name(model),
            status: if running {
                "Up 3 minutes".to_string()
            } else {
                "Exited (0) 2 hours ago".to_string()
            },
            ports: "0.0.0.0:11434->11434/tcp".to_string(),
            is_running: running,
        }
    }

    #[async_trait]
    impl ContainerDriver for MockDriver {
        async fn unit_exists(&self, name: &str) -> bool {
            self.record(format!("exists:{}", name));
            self.existing.lock().unwrap().contains(name)
        }

        async fn start_existing(&self, name: &str) -> ManagerResult<()> {
            self.record(format!("start:{}", name));
            self.outcome("start")
        }

        async fn build(&self, _context_dir: &Path, image: &str) -> ManagerResult<()> {
            self.record(format!("build:{}", image));
            self.outcome("build")
        }

        async fn run(&self, _image: &str, unit: &str, port: u16) -> ManagerResult<()> {
            self.record(format!("run:{}:{}", unit, port));
            self.outcome("run")?;
            self.existing.lock().unwrap().insert(unit.to_string());
            Ok(())
        }

        async fn list_units(&self) -> ManagerResult<Vec<UnitDescriptor>> {
            self.record("list:units".to_string());
            self.outcome("list")?;
            Ok(self.units.clone())
        }

        async fn list_images(&self) -> ManagerResult<Vec<LocalImage>> {
            self.record("list:images".to_string());
            self.outcome("list")?;
            Ok(self.images.clone())
        }

        async fn accelerator_available(&self) -> bool {
            false
        }

        async fn delete_unit(&self, safe_name: &str) -> ManagerResult<()> {
            self.record(format!("delete:{}", safe_name));
            self.outcome("delete")?;
            self.existing
                .lock()
                .unwrap()
                .remove(&naming::unit_name(safe_name));
            Ok(())
        }
    }
}
