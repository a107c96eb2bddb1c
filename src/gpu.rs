//! GPU detection
//!
//! Queries nvidia-smi for the GPUs visible to this host. Whether Docker can
//! actually pass them through is checked separately by the container driver.

use tokio::process::Command;

/// Information about available GPUs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuInfo {
    /// GPU indices reported by nvidia-smi
    pub indices: Vec<u32>,
}

impl GpuInfo {
    /// Get the number of available GPUs
    pub fn count(&self) -> usize {
        self.indices.len()
    }
}

/// Parse `nvidia-smi --query-gpu=index --format=csv,noheader` output
pub fn parse_indices(stdout: &str) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

/// Run nvidia-smi.
///
/// Returns `None` when the command is missing or exits unsuccessfully.
pub async fn detect_gpus() -> Option<GpuInfo> {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=index", "--format=csv,noheader"])
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let indices = parse_indices(&stdout);

            tracing::info!(
                gpu_count = indices.len(),
                indices = ?indices,
                "Detected available GPUs"
            );

            Some(GpuInfo { indices })
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                stderr = %stderr.trim(),
                "nvidia-smi failed, assuming no GPUs available"
            );
            None
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to run nvidia-smi, assuming no GPUs available"
            );
            None
        }
    }
}
