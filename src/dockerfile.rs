//! Build context for model images
//!
//! The image starts the ollama server, pulls the model, warms it with one
//! short generation and then waits on the server process.

use crate::error::{ManagerError, ManagerResult};
use std::path::{Path, PathBuf};

const TEMPLATE: &str = r#"FROM ollama/ollama:latest

# Install curl for health checks
RUN apt-get update && apt-get install -y curl && rm -rf /var/lib/apt/lists/*

ENV OLLAMA_NUM_PARALLEL=2
ENV OLLAMA_MAX_LOADED_MODELS=1
ENV OLLAMA_FLASH_ATTENTION=1
ENV OLLAMA_KEEP_ALIVE=10m
ENV OLLAMA_HOST=0.0.0.0:11434
ENV OLLAMA_MAX_QUEUE=1
ENV OLLAMA_RUNNERS_DIR=/tmp

EXPOSE 11434

RUN echo '#!/bin/bash\n\
set -e\n\
echo "Starting Ollama server..."\n\
ollama serve &\n\
OLLAMA_PID=$!\n\
\n\
echo "Waiting for Ollama to be ready..."\n\
sleep 10\n\
while ! curl -s http://localhost:11434/api/tags >/dev/null 2>&1; do\n\
    sleep 2\n\
    echo "Still waiting for Ollama..."\n\
done\n\
\n\
echo "Ollama is ready, pulling model: {model}"\n\
ollama pull {model}\n\
\n\
echo "Preloading model..."\n\
curl -X POST http://localhost:11434/api/generate -d '"'"'{"model": "{model}", "prompt": "Hello", "stream": false, "keep_alive": "5m"}'"'"' || true\n\
\n\
echo "Model {model} is ready!"\n\
wait $OLLAMA_PID' > /usr/local/bin/start-with-model.sh && chmod +x /usr/local/bin/start-with-model.sh

ENTRYPOINT ["/usr/local/bin/start-with-model.sh"]
"#;

/// Render the Dockerfile for a model. The name is lower-cased but otherwise
/// kept as given so tags like `llama2:13b` reach `ollama pull` intact.
pub fn render(model: &str) -> String {
    TEMPLATE.replace("{model}", &model.to_lowercase())
}

/// Write the Dockerfile into `dir`, creating it if needed
pub async fn prepare(dir: &Path, model: &str) -> ManagerResult<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| ManagerError::Io {
            context: format!("Failed to create models directory {:?}", dir),
            source,
        })?;

    let path = dir.join("Dockerfile");
    tokio::fs::write(&path, render(model))
        .await
        .map_err(|source| ManagerError::Io {
            context: format!("Failed to write Dockerfile {:?}", path),
            source,
        })?;

    tracing::debug!(path = ?path, model = %model, "Build context prepared");
    Ok(path)
}
