//! Models offered for activation

use crate::container::LocalImage;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    pub size: String,
    pub official: bool,
}

impl CatalogEntry {
    fn new(name: &str, description: &str, size: &str, official: bool) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            size: size.to_string(),
            official,
        }
    }
}

/// Curated list, always offered regardless of what is built locally
pub fn popular_models() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("mistral", "Fast and efficient 7B model", "4.1GB", true),
        CatalogEntry::new("llama2", "Meta's powerful language model", "3.8GB", true),
        CatalogEntry::new(
            "llama2:13b",
            "Larger Llama2 model with better performance",
            "7.3GB",
            true,
        ),
        CatalogEntry::new("codellama", "Specialized for code generation", "3.8GB", true),
        CatalogEntry::new(
            "codellama:13b",
            "Larger CodeLlama for complex coding tasks",
            "7.3GB",
            true,
        ),
        CatalogEntry::new("vicuna", "Fine-tuned for conversations", "3.8GB", false),
        CatalogEntry::new("orca-mini", "Compact and fast model", "1.9GB", false),
        CatalogEntry::new("neural-chat", "Optimized for chat interactions", "4.1GB", false),
        CatalogEntry::new("starcode", "Code generation and completion", "4.3GB", false),
        CatalogEntry::new(
            "phind-codellama",
            "Enhanced CodeLlama for development",
            "3.8GB",
            false,
        ),
    ]
}

/// Model name of a locally built image, `ollama-<name>:latest` → `<name>`
pub fn model_from_image(reference: &str) -> Option<&str> {
    let name = reference.strip_prefix("ollama-")?;
    Some(name.strip_suffix(":latest").unwrap_or(name))
}

/// Curated models followed by local images not already listed
pub fn merge(local: &[LocalImage]) -> Vec<CatalogEntry> {
    let mut models = popular_models();
    let mut seen: HashSet<String> = models.iter().map(|m| m.name.clone()).collect();

    for image in local {
        let Some(name) = model_from_image(&image.reference) else {
            continue;
        };
        if seen.insert(name.to_string()) {
            models.push(CatalogEntry::new(
                name,
                "Locally available model",
                &image.size,
                false,
            ));
        }
    }

    models
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(reference: &str, size: &str) -> LocalImage {
        LocalImage {
            reference: reference.to_string(),
            size: size.to_string(),
        }
    }

    #[test]
    fn test_model_from_image() {
        assert_eq!(model_from_image("ollama-mistral:latest"), Some("mistral"));
        assert_eq!(model_from_image("ollama-phi3:v2"), Some("phi3:v2"));
        assert_eq!(model_from_image("postgres:16"), None);
    }

    #[test]
    fn test_merge_appends_new_local_models() {
        let models = merge(&[
            image("ollama-mistral:latest", "4.1GB"),
            image("ollama-tinyllama:latest", "637MB"),
            image("ollama-tinyllama:latest", "637MB"),
        ]);

        assert_eq!(models.len(), popular_models().len() + 1);
        let local = models.last().unwrap();
        assert_eq!(local.name, "tinyllama");
        assert_eq!(local.size, "637MB");
        assert!(!local.official);
    }

    #[test]
    fn test_merge_without_local_images() {
        assert_eq!(merge(&[]), popular_models());
    }
}
