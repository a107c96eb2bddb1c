//! OwnGPT model manager
//!
//! Builds and runs one Ollama container per requested model, keeps track of
//! which one is current, and relays chat prompts to it.

pub mod api;
pub mod catalog;
pub mod config;
pub mod container;
pub mod dockerfile;
pub mod error;
pub mod gpu;
pub mod health;
pub mod inference;
pub mod manager;
pub mod metrics;
pub mod naming;
pub mod relay;
pub mod state;

pub use config::ManagerConfig;
pub use container::{ContainerDriver, DockerDriver, LocalImage, UnitDescriptor};
pub use error::{ActivationStage, ManagerError, ManagerResult};
pub use health::{HttpReadinessProbe, ReadinessProbe};
pub use inference::{FragmentStream, InferenceClient, OllamaClient, StreamEvent};
pub use manager::{Activation, LifecycleSettings, ModelManager, SystemInfo};
pub use relay::ChatRelay;
pub use state::{ActiveModel, ModelState};
