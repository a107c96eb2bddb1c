//! API request handlers

use super::models::{
    ActivateRequest, AvailableModelsResponse, ChatRequest, ChatResponse, HealthResponse,
    MessageResponse, ModelsResponse, RefreshResponse,
};
use super::routes::AppState;
use crate::error::ManagerError;
use crate::inference::StreamEvent;
use crate::manager::{Activation, SystemInfo};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;

/// GET /health - Manager health check
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let current = state.manager.current().await;

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now(),
            model_running: current.is_running,
            model_name: current.into_running().map(|m| m.unit_name),
        }),
    )
}

/// GET /metrics - Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// POST /activate - Make a model current, building its container if needed
pub async fn activate(
    State(state): State<AppState>,
    payload: Result<Json<ActivateRequest>, JsonRejection>,
) -> Result<Json<Activation>, ManagerError> {
    let Json(req) = payload?;
    let activation = state.manager.activate(&req.model).await?;
    Ok(Json(activation))
}

/// POST /chat - Blocking chat with the current model
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ManagerError> {
    let Json(req) = payload?;
    let response = state.relay.send(&req.message).await?;
    Ok(Json(ChatResponse { response }))
}

/// POST /chat/stream - Server-sent events, one per fragment
///
/// Fragments are unnamed events. The stream ends with a `done` event holding
/// the full text, or an `error` event.
pub async fn chat_stream(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ManagerError> {
    let Json(req) = payload?;
    let fragments = state.relay.stream(&req.message).await?;

    let events = fragments.map(|event| Ok::<_, Infallible>(to_sse(event)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// SSE data lines cannot carry `\r`. CRLF becomes LF and a lone CR is
/// dropped; the remaining newlines are split into data lines by axum.
fn sse_data(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "")
}

fn to_sse(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Fragment(text) => Event::default().data(sse_data(&text)),
        StreamEvent::Complete(text) => {
            crate::metrics::record_chat_request("stream", true);
            Event::default().event("done").data(sse_data(&text))
        }
        StreamEvent::Error(e) => {
            tracing::warn!(error = %e, "Streaming chat failed");
            crate::metrics::record_chat_request("stream", false);
            Event::default()
                .event("error")
                .data(sse_data(&format!("Error: {}", e)))
        }
    }
}

/// GET /models - Containers managed by this service
pub async fn list_models(
    State(state): State<AppState>,
) -> Result<Json<ModelsResponse>, ManagerError> {
    let models = state.manager.installed_models().await?;
    Ok(Json(ModelsResponse { models }))
}

/// GET /available-models - Curated models plus locally built ones
pub async fn available_models(State(state): State<AppState>) -> Json<AvailableModelsResponse> {
    Json(AvailableModelsResponse {
        available_models: state.manager.available_models().await,
    })
}

/// DELETE /models/{name} - Remove a model's container and image
pub async fn delete_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, ManagerError> {
    state.manager.delete_model(&name).await?;

    Ok(Json(MessageResponse {
        message: format!("Model {} deleted successfully", name),
    }))
}

/// POST /refresh-model - Re-read the current model from the runtime
pub async fn refresh_model(
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, ManagerError> {
    let response = match state.manager.resync().await? {
        Some(model) => RefreshResponse {
            message: "Current model refreshed successfully".to_string(),
            current_model: Some(model),
        },
        None => RefreshResponse {
            message: "No running models found".to_string(),
            current_model: None,
        },
    };

    Ok(Json(response))
}

/// GET /system-info - Accelerator availability and memory limit
pub async fn system_info(State(state): State<AppState>) -> Json<SystemInfo> {
    Json(state.manager.system_info().await)
}
