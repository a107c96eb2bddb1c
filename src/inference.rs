//! Ollama generate API client
//!
//! Containers are addressed by name on the inference port. The model name in
//! each request is recovered from the container name.

use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::naming;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Generation parameters sent with every request, tuned for short answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    pub num_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// Context window
    pub num_ctx: u32,
    pub num_batch: u32,
    pub num_gpu: u32,
    pub low_vram: bool,
    pub f16_kv: bool,
    /// Keep weights resident in memory
    pub use_mlock: bool,
    pub use_mmap: bool,
    pub repeat_penalty: f32,
    pub tfs_z: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            num_predict: 250,
            temperature: 0.2,
            top_p: 0.7,
            top_k: 15,
            num_ctx: 512,
            num_batch: 128,
            num_gpu: 1,
            low_vram: false,
            f16_kv: true,
            use_mlock: true,
            use_mmap: true,
            repeat_penalty: 1.05,
            tfs_z: 0.95,
        }
    }
}

/// Body of `POST /api/generate`
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    pub options: &'a GenerationOptions,
}

/// A whole response, or one line of a streamed response
#[derive(Debug, Deserialize)]
pub struct GenerateChunk {
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

/// Item of a streamed generation.
///
/// A stream yields any number of `Fragment`s followed by exactly one
/// terminal item, either `Complete` with the concatenated text or `Error`.
#[derive(Debug)]
pub enum StreamEvent {
    Fragment(String),
    Complete(String),
    Error(ManagerError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment(_))
    }
}

pub type FragmentStream = ReceiverStream<StreamEvent>;

/// Sends prompts to a ready container
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Generate a whole response
    async fn send(&self, prompt: &str, unit: &str) -> ManagerResult<String>;

    /// Generate incrementally. Decoding runs on its own task; the returned
    /// stream cannot be restarted.
    fn stream(&self, prompt: &str, unit: &str) -> FragmentStream;
}

// ============================================================================
// Production Implementation
// ============================================================================

pub struct OllamaClient {
    client: reqwest::Client,
    port: u16,
    options: GenerationOptions,
    request_timeout: Duration,
    stream_timeout: Duration,
    buffer: usize,
}

impl OllamaClient {
    pub fn new(
        port: u16,
        options: GenerationOptions,
        request_timeout: Duration,
        stream_timeout: Duration,
        buffer: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            port,
            options,
            request_timeout,
            stream_timeout,
            buffer: buffer.max(1),
        }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(
            config.inference_port,
            config.generation.clone(),
            Duration::from_secs(config.inference_timeout_secs),
            Duration::from_secs(config.stream_timeout_secs),
            config.stream_buffer,
        )
    }

    fn generate_url(&self, unit: &str) -> String {
        format!("http://{}:{}/api/generate", unit, self.port)
    }

    fn request(&self, prompt: &str, unit: &str, stream: bool) -> reqwest::RequestBuilder {
        let body = GenerateRequest {
            model: naming::model_from_unit(unit),
            prompt,
            stream,
            options: &self.options,
        };
        let timeout = if stream {
            self.stream_timeout
        } else {
            self.request_timeout
        };

        self.client
            .post(self.generate_url(unit))
            .timeout(timeout)
            .json(&body)
    }
}

async fn ensure_success(response: reqwest::Response) -> ManagerResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ManagerError::Inference(format!(
        "ollama API returned status {}: {}",
        status.as_u16(),
        body.trim()
    )))
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn send(&self, prompt: &str, unit: &str) -> ManagerResult<String> {
        tracing::debug!(container = %unit, prompt_len = prompt.len(), "Sending prompt");

        let response = self
            .request(prompt, unit, false)
            .send()
            .await
            .map_err(|e| ManagerError::Inference(e.to_string()))?;
        let response = ensure_success(response).await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ManagerError::Inference(e.to_string()))?;
        let chunk: GenerateChunk = serde_json::from_slice(&body)
            .map_err(|e| ManagerError::Inference(format!("malformed response: {}", e)))?;

        Ok(chunk.response)
    }

    fn stream(&self, prompt: &str, unit: &str) -> FragmentStream {
        let (tx, rx) = mpsc::channel(self.buffer);
        let request = self.request(prompt, unit, true);
        let unit = unit.to_string();

        tokio::spawn(async move {
            let response = match request.send().await {
                Ok(response) => ensure_success(response).await,
                Err(e) => Err(ManagerError::Inference(e.to_string())),
            };

            match response {
                Ok(response) => relay_ndjson(response.bytes_stream(), &tx).await,
                Err(e) => {
                    tracing::warn!(container = %unit, error = %e, "Streaming request failed");
                    let _ = tx.send(StreamEvent::Error(e)).await;
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

enum Flow {
    More,
    Done,
    ConsumerGone,
}

async fn forward_line(
    line: &[u8],
    full: &mut String,
    tx: &mpsc::Sender<StreamEvent>,
) -> ManagerResult<Flow> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(Flow::More);
    }

    let chunk: GenerateChunk = serde_json::from_slice(line)
        .map_err(|e| ManagerError::Inference(format!("malformed stream chunk: {}", e)))?;

    if !chunk.response.is_empty() {
        full.push_str(&chunk.response);
        if tx.send(StreamEvent::Fragment(chunk.response)).await.is_err() {
            return Ok(Flow::ConsumerGone);
        }
    }

    Ok(if chunk.done { Flow::Done } else { Flow::More })
}

/// Decode newline-delimited JSON from `body` and forward fragments to `tx`,
/// ending with a single terminal event.
///
/// The stream completes at the `done` marker or when the body ends. Anything
/// after the marker is ignored. If the receiver is dropped, decoding stops
/// without a terminal event.
pub async fn relay_ndjson<S, B, E>(body: S, tx: &mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut pending: Vec<u8> = Vec::new();
    let mut full = String::new();

    let terminal = 'read: loop {
        match body.next().await {
            Some(Ok(bytes)) => {
                pending.extend_from_slice(bytes.as_ref());
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    match forward_line(&line, &mut full, tx).await {
                        Ok(Flow::More) => {}
                        Ok(Flow::Done) => break 'read StreamEvent::Complete(full),
                        Ok(Flow::ConsumerGone) => return,
                        Err(e) => break 'read StreamEvent::Error(e),
                    }
                }
            }
            Some(Err(e)) => {
                break 'read StreamEvent::Error(ManagerError::Inference(format!(
                    "stream interrupted: {}",
                    e
                )));
            }
            None => {
                // Connection closed; the last line may lack a newline
                match forward_line(&pending, &mut full, tx).await {
                    Ok(Flow::More | Flow::Done) => break 'read StreamEvent::Complete(full),
                    Ok(Flow::ConsumerGone) => return,
                    Err(e) => break 'read StreamEvent::Error(e),
                }
            }
        }
    };

    if let StreamEvent::Error(e) = &terminal {
        tracing::warn!(error = %e, "Stream terminated with error");
    }
    let _ = tx.send(terminal).await;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Inference client replaying canned output and counting calls
    #[derive(Default)]
    pub struct MockInference {
        reply: String,
        fragments: Vec<String>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl MockInference {
        pub fn new(reply: &str, fragments: &[&str]) -> Self {
            Self {
                reply: reply.to_string(),
                fragments: fragments.iter().map(|f| f.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// `(prompt, unit)` of every call
        pub fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceClient for MockInference {
        async fn send(&self, prompt: &str, unit: &str) -> ManagerResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), unit.to_string()));
            Ok(self.reply.clone())
        }

        fn stream(&self, prompt: &str, unit: &str) -> FragmentStream {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), unit.to_string()));

            let (tx, rx) = mpsc::channel(self.fragments.len() + 1);
            for fragment in &self.fragments {
                let _ = tx.try_send(StreamEvent::Fragment(fragment.clone()));
            }
            let _ = tx.try_send(StreamEvent::Complete(self.fragments.concat()));
            ReceiverStream::new(rx)
        }
    }
}
