//! Error types shared by the lifecycle manager, the chat relay and the API

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Step of an activation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStage {
    /// Writing the build context
    Prepare,
    /// Building the image
    Build,
    /// Launching the container
    Run,
    /// Waiting for the freshly launched container to answer
    Start,
}

impl fmt::Display for ActivationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivationStage::Prepare => "prepare build context",
            ActivationStage::Build => "build Docker image",
            ActivationStage::Run => "run Docker container",
            ActivationStage::Start => "start model",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// Missing or empty input, rejected before any side effect
    #[error("{0}")]
    Validation(String),

    /// A container runtime command failed or could not be launched
    #[error("`{command}` failed: {message}")]
    Runtime { command: String, message: String },

    #[error("model failed to become ready within {elapsed:?}")]
    ReadinessTimeout { unit: String, elapsed: Duration },

    /// Non-success status or malformed payload from the inference endpoint
    #[error("inference request failed: {0}")]
    Inference(String),

    #[error("No model is currently running. Please create a model first.")]
    NoActiveModel,

    #[error("Failed to {stage}: {source}")]
    Activation {
        stage: ActivationStage,
        #[source]
        source: Box<ManagerError>,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ManagerError {
    pub fn activation(stage: ActivationStage, source: ManagerError) -> Self {
        ManagerError::Activation {
            stage,
            source: Box::new(source),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ManagerError::Validation(_) | ManagerError::NoActiveModel => StatusCode::BAD_REQUEST,
            ManagerError::Runtime { .. } | ManagerError::Inference(_) => StatusCode::BAD_GATEWAY,
            ManagerError::ReadinessTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ManagerError::Activation { source, .. } => source.status_code(),
            ManagerError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ManagerError {
    fn from(rejection: JsonRejection) -> Self {
        ManagerError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ManagerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            timestamp: chrono::Utc::now(),
        });

        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}
