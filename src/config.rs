//! Configuration structures and loading logic

use crate::inference::GenerationOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main manager configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub api_port: u16,

    /// Directory the Dockerfile is written to before each build
    pub models_dir: PathBuf,

    pub docker_binary: String,
    /// Network containers join so their names resolve from this process
    pub docker_network: Option<String>,
    /// Memory ceiling passed to `docker run --memory`
    pub memory_limit: String,
    /// Image used for the GPU passthrough trial run
    pub gpu_probe_image: String,

    /// Host port published for the active container
    pub host_port: u16,
    /// Port the inference server answers on, addressed by container name
    pub inference_port: u16,

    pub readiness_poll_interval_ms: u64,
    /// Upper bound for a single readiness request
    pub readiness_attempt_timeout_ms: u64,
    /// Readiness deadline after restarting an existing container
    pub existing_unit_ready_timeout_secs: u64,
    /// Readiness deadline after building and running a new container
    pub new_unit_ready_timeout_secs: u64,

    pub inference_timeout_secs: u64,
    pub stream_timeout_secs: u64,
    /// Fragments buffered between the decode task and the consumer
    pub stream_buffer: usize,

    /// Publish a freshly run container as current before its readiness probe
    /// succeeds. When false, publication waits for the probe.
    pub publish_before_ready: bool,
    /// Adopt an already running container at startup
    pub resync_on_startup: bool,

    /// Allowed CORS origins; empty means permissive
    pub cors_allowed_origins: Vec<String>,

    pub generation: GenerationOptions,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            models_dir: default_models_dir(),
            docker_binary: "docker".to_string(),
            docker_network: Some("owngpt_owngpt-network".to_string()),
            memory_limit: "4g".to_string(),
            gpu_probe_image: "hello-world".to_string(),
            host_port: 11434,
            inference_port: 11434,
            readiness_poll_interval_ms: 2000,
            readiness_attempt_timeout_ms: 2000,
            existing_unit_ready_timeout_secs: 30,
            new_unit_ready_timeout_secs: 300,
            inference_timeout_secs: 15,
            stream_timeout_secs: 120,
            stream_buffer: 10,
            publish_before_ready: true,
            resync_on_startup: true,
            cors_allowed_origins: vec![
                "http://localhost:9090".to_string(),
                "http://frontend:9090".to_string(),
            ],
            generation: GenerationOptions::default(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(port) = std::env::var("OWNGPT_API_PORT") {
            config.api_port = port.parse().context("Invalid OWNGPT_API_PORT value")?;
        }
        if let Ok(dir) = std::env::var("OWNGPT_MODELS_DIR") {
            config.models_dir = PathBuf::from(dir);
        }
        if let Ok(network) = std::env::var("OWNGPT_DOCKER_NETWORK") {
            config.docker_network = (!network.is_empty()).then_some(network);
        }
        if let Ok(binary) = std::env::var("OWNGPT_DOCKER_BINARY") {
            config.docker_binary = binary;
        }
        if let Ok(limit) = std::env::var("OWNGPT_MEMORY_LIMIT") {
            config.memory_limit = limit;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_port < 1024 {
            anyhow::bail!("API port must be >= 1024 (got {})", self.api_port);
        }
        if self.host_port == self.api_port {
            anyhow::bail!(
                "Container host port {} conflicts with API port",
                self.host_port
            );
        }
        if self.readiness_poll_interval_ms == 0 {
            anyhow::bail!("readiness_poll_interval_ms must be greater than 0");
        }
        if self.readiness_attempt_timeout_ms == 0 {
            anyhow::bail!("readiness_attempt_timeout_ms must be greater than 0");
        }
        if self.readiness_attempt_timeout_ms >= self.existing_unit_ready_timeout_secs * 1000 {
            anyhow::bail!(
                "readiness_attempt_timeout_ms ({}) must be shorter than existing_unit_ready_timeout_secs",
                self.readiness_attempt_timeout_ms
            );
        }
        if self.new_unit_ready_timeout_secs < self.existing_unit_ready_timeout_secs {
            anyhow::bail!("new_unit_ready_timeout_secs must be >= existing_unit_ready_timeout_secs");
        }
        if self.inference_timeout_secs == 0 || self.stream_timeout_secs == 0 {
            anyhow::bail!("Inference timeouts must be greater than 0");
        }
        if self.stream_buffer == 0 {
            anyhow::bail!("stream_buffer must be greater than 0");
        }
        if self.memory_limit.trim().is_empty() {
            anyhow::bail!("memory_limit cannot be empty");
        }
        if self.docker_binary.trim().is_empty() {
            anyhow::bail!("docker_binary cannot be empty");
        }

        Ok(())
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    pub fn readiness_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_attempt_timeout_ms)
    }

    pub fn existing_unit_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.existing_unit_ready_timeout_secs)
    }

    pub fn new_unit_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.new_unit_ready_timeout_secs)
    }
}

// Default functions
fn default_api_port() -> u16 {
    8080
}
fn default_models_dir() -> PathBuf {
    PathBuf::from("/app/models")
}
