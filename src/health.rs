//! Readiness probing for model containers

use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use async_trait::async_trait;
use std::future::Future;
use tokio::time::{Duration, Instant, sleep, timeout};

/// Waits for a container's inference endpoint to answer
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn wait_until_ready(&self, unit: &str, timeout: Duration) -> ManagerResult<()>;
}

/// Result of a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub ready: bool,
    pub polls: u32,
    pub elapsed: Duration,
}

/// Call `attempt` every `interval` until it returns true or `deadline` has
/// passed since the first call.
///
/// Each attempt is cut off after `attempt_timeout` (or whatever remains of
/// the deadline, if less).
pub async fn poll_until<F, Fut>(
    interval: Duration,
    attempt_timeout: Duration,
    deadline: Duration,
    mut attempt: F,
) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let stop_at = start + deadline;
    let mut polls = 0;

    while Instant::now() < stop_at {
        polls += 1;
        let budget = attempt_timeout.min(stop_at.saturating_duration_since(Instant::now()));

        if let Ok(true) = timeout(budget, attempt()).await {
            return PollOutcome {
                ready: true,
                polls,
                elapsed: start.elapsed(),
            };
        }

        sleep(interval).await;
    }

    PollOutcome {
        ready: false,
        polls,
        elapsed: start.elapsed(),
    }
}

/// Polls `GET /api/tags` on the container's network name
pub struct HttpReadinessProbe {
    client: reqwest::Client,
    port: u16,
    poll_interval: Duration,
    attempt_timeout: Duration,
}

impl HttpReadinessProbe {
    pub fn new(port: u16, poll_interval: Duration, attempt_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            port,
            poll_interval,
            attempt_timeout,
        }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(
            config.inference_port,
            config.readiness_poll_interval(),
            config.readiness_attempt_timeout(),
        )
    }

    fn tags_url(&self, unit: &str) -> String {
        format!("http://{}:{}/api/tags", unit, self.port)
    }

    async fn attempt(&self, url: &str) -> bool {
        match self
            .client
            .get(url)
            .timeout(self.attempt_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::trace!(url = %url, error = %e, "Readiness attempt failed");
                false
            }
        }
    }
}

#[async_trait]
impl ReadinessProbe for HttpReadinessProbe {
    async fn wait_until_ready(&self, unit: &str, deadline: Duration) -> ManagerResult<()> {
        let url = self.tags_url(unit);

        tracing::info!(
            container = %unit,
            timeout_secs = deadline.as_secs(),
            "Waiting for model to become ready"
        );

        let outcome = poll_until(self.poll_interval, self.attempt_timeout, deadline, || {
            self.attempt(&url)
        })
        .await;

        crate::metrics::record_readiness_wait(outcome.elapsed, outcome.ready);

        if outcome.ready {
            tracing::info!(
                container = %unit,
                polls = outcome.polls,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Model is ready"
            );
            Ok(())
        } else {
            tracing::warn!(
                container = %unit,
                polls = outcome.polls,
                "Model failed to become ready"
            );
            Err(ManagerError::ReadinessTimeout {
                unit: unit.to_string(),
                elapsed: outcome.elapsed,
            })
        }
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================
