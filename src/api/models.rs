//! API request and response models

use crate::catalog::CatalogEntry;
use crate::container::UnitDescriptor;
use crate::state::ActiveModel;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub model_running: bool,
    pub model_name: Option<String>,
}

/// Request to activate a model.
/// A missing name is reported as a validation error rather than a decode failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActivateRequest {
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<UnitDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct AvailableModelsResponse {
    pub available_models: Vec<CatalogEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub message: String,
    /// `null` when no container is running
    pub current_model: Option<ActiveModel>,
}
