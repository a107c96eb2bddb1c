//! Shared fakes for the integration tests
//!
//! In-memory implementations of the runtime, probe and inference seams so the
//! full router can be driven without docker or a model server.

#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::TestServer;
use owngpt::{
    ActiveModel, ChatRelay, ContainerDriver, FragmentStream, InferenceClient, LifecycleSettings,
    LocalImage, ManagerError, ManagerResult, ModelManager, ModelState, ReadinessProbe,
    StreamEvent, UnitDescriptor,
    api::routes::{AppState, create_router},
    metrics, naming,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

// Global metrics handle - only initialize once per test process
static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

pub fn get_metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| metrics::setup_metrics().expect("Failed to setup metrics"))
        .clone()
}

/// Container runtime kept in memory
#[derive(Default)]
pub struct FakeDriver {
    calls: Mutex<Vec<String>>,
    /// Containers by name, with whether they are running
    units: Mutex<Vec<(String, bool)>>,
    images: Vec<LocalImage>,
    fail_build: bool,
    gpu: bool,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_build() -> Self {
        Self {
            fail_build: true,
            ..Self::default()
        }
    }

    pub fn with_gpu(mut self) -> Self {
        self.gpu = true;
        self
    }

    pub fn with_images(mut self, images: Vec<LocalImage>) -> Self {
        self.images = images;
        self
    }

    /// Add a container as if it had been created outside this process
    pub fn with_unit(self, model: &str, running: bool) -> Self {
        self.units
            .lock()
            .unwrap()
            .push((naming::unit_name(model), running));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerDriver for FakeDriver {
    async fn unit_exists(&self, name: &str) -> bool {
        self.units.lock().unwrap().iter().any(|(n, _)| n == name)
    }

    async fn start_existing(&self, name: &str) -> ManagerResult<()> {
        self.record(format!("start {}", name));
        for unit in self.units.lock().unwrap().iter_mut() {
            if unit.0 == name {
                unit.1 = true;
            }
        }
        Ok(())
    }

    async fn build(&self, context_dir: &Path, image: &str) -> ManagerResult<()> {
        self.record(format!("build {}", image));
        assert!(context_dir.join("Dockerfile").exists());
        if self.fail_build {
            return Err(ManagerError::Runtime {
                command: "docker build".to_string(),
                message: "pull access denied".to_string(),
            });
        }
        Ok(())
    }

    async fn run(&self, _image: &str, unit: &str, port: u16) -> ManagerResult<()> {
        self.record(format!("run {} {}", unit, port));
        let mut units = self.units.lock().unwrap();
        units.retain(|(n, _)| n != unit);
        units.push((unit.to_string(), true));
        Ok(())
    }

    async fn list_units(&self) -> ManagerResult<Vec<UnitDescriptor>> {
        Ok(self
            .units
            .lock()
            .unwrap()
            .iter()
            .map(|(name, running)| UnitDescriptor {
                model: naming::model_from_unit(name).to_string(),
                container_name: name.clone(),
                status: if *running { "Up 1 minute" } else { "Exited (0)" }.to_string(),
                ports: "0.0.0.0:11434->11434/tcp".to_string(),
                is_running: *running,
            })
            .collect())
    }

    async fn list_images(&self) -> ManagerResult<Vec<LocalImage>> {
        Ok(self.images.clone())
    }

    async fn accelerator_available(&self) -> bool {
        self.gpu
    }

    async fn delete_unit(&self, safe_name: &str) -> ManagerResult<()> {
        self.record(format!("delete {}", safe_name));
        let unit = naming::unit_name(safe_name);
        self.units.lock().unwrap().retain(|(n, _)| *n != unit);
        Ok(())
    }
}

/// Probe with a fixed answer
pub struct FakeProbe {
    pub ready: bool,
}

#[async_trait]
impl ReadinessProbe for FakeProbe {
    async fn wait_until_ready(&self, unit: &str, deadline: Duration) -> ManagerResult<()> {
        if self.ready {
            Ok(())
        } else {
            Err(ManagerError::ReadinessTimeout {
                unit: unit.to_string(),
                elapsed: deadline,
            })
        }
    }
}

/// Inference server replaying canned text
#[derive(Default)]
pub struct FakeInference {
    reply: String,
    fragments: Vec<String>,
    /// Fail the stream after the fragments with this message
    stream_failure: Option<String>,
    calls: AtomicUsize,
}

impl FakeInference {
    pub fn new(reply: &str, fragments: &[&str]) -> Self {
        Self {
            reply: reply.to_string(),
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_mid_stream(mut self, message: &str) -> Self {
        self.stream_failure = Some(message.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceClient for FakeInference {
    async fn send(&self, _prompt: &str, _unit: &str) -> ManagerResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }

    fn stream(&self, _prompt: &str, _unit: &str) -> FragmentStream {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(self.fragments.len() + 1);
        for fragment in &self.fragments {
            let _ = tx.try_send(StreamEvent::Fragment(fragment.clone()));
        }
        let terminal = match &self.stream_failure {
            Some(message) => StreamEvent::Error(ManagerError::Inference(message.clone())),
            None => StreamEvent::Complete(self.fragments.concat()),
        };
        let _ = tx.try_send(terminal);
        ReceiverStream::new(rx)
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub driver: Arc<FakeDriver>,
    pub inference: Arc<FakeInference>,
    pub state: Arc<ModelState>,
    _models_dir: TempDir,
}

impl TestApp {
    pub async fn current(&self) -> ActiveModel {
        self.state.snapshot().await
    }
}

/// Helper to create a test server with the API
pub fn create_test_app(driver: FakeDriver, probe_ready: bool, inference: FakeInference) -> TestApp {
    let models_dir = TempDir::new().expect("Failed to create temp dir");
    let state = Arc::new(ModelState::new());
    let driver = Arc::new(driver);
    let inference = Arc::new(inference);

    let settings = LifecycleSettings {
        models_dir: models_dir.path().to_path_buf(),
        host_port: 11434,
        memory_limit: "4g".to_string(),
        existing_unit_ready_timeout: Duration::from_secs(30),
        new_unit_ready_timeout: Duration::from_secs(300),
        publish_before_ready: true,
    };

    let manager = Arc::new(ModelManager::new(
        state.clone(),
        driver.clone(),
        Arc::new(FakeProbe { ready: probe_ready }),
        settings,
    ));
    let relay = Arc::new(ChatRelay::new(state.clone(), inference.clone()));

    let app_state = AppState {
        manager,
        relay,
        prometheus_handle: get_metrics_handle(),
    };

    let app = create_router(app_state, &[]);
    let server = TestServer::try_new(app).expect("Failed to create test server");

    TestApp {
        server,
        driver,
        inference,
        state,
        _models_dir: models_dir,
    }
}

pub fn default_app() -> TestApp {
    create_test_app(FakeDriver::new(), true, FakeInference::new("Hello!", &[]))
}
