//! Chat relay
//!
//! Routes prompts to the current model. Only the unit name is read under the
//! shared lock; the inference call runs after the guard is dropped.

use crate::error::{ManagerError, ManagerResult};
use crate::inference::{FragmentStream, InferenceClient};
use crate::state::ModelState;
use std::sync::Arc;

pub struct ChatRelay {
    state: Arc<ModelState>,
    client: Arc<dyn InferenceClient>,
}

impl ChatRelay {
    pub fn new(state: Arc<ModelState>, client: Arc<dyn InferenceClient>) -> Self {
        Self { state, client }
    }

    async fn target(&self, message: &str) -> ManagerResult<String> {
        if message.trim().is_empty() {
            return Err(ManagerError::Validation(
                "Message cannot be empty".to_string(),
            ));
        }

        self.state
            .running_unit()
            .await
            .ok_or(ManagerError::NoActiveModel)
    }

    /// Send a prompt and wait for the whole response
    pub async fn send(&self, message: &str) -> ManagerResult<String> {
        let unit = self.target(message).await?;

        tracing::debug!(container = %unit, "Sending message to model");

        let result = self.client.send(message, &unit).await;
        crate::metrics::record_chat_request("blocking", result.is_ok());

        if let Err(e) = &result {
            tracing::warn!(container = %unit, error = %e, "Chat request failed");
        }
        result
    }

    /// Start a streamed generation. Failures after this returns arrive as
    /// the stream's terminal event.
    pub async fn stream(&self, message: &str) -> ManagerResult<FragmentStream> {
        let unit = self.target(message).await?;

        tracing::debug!(container = %unit, "Streaming message to model");

        Ok(self.client.stream(message, &unit))
    }
}
