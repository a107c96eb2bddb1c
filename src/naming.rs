//! Container and image naming convention
//!
//! The only place where a user-supplied model identifier and a container
//! identity are reconciled. The mapping is lossy: raw names that normalize
//! to the same safe name share a container.

const UNIT_PREFIX: &str = "ollama-";
const UNIT_SUFFIX: &str = "-container";

/// Lower-case the model identifier and replace `:` and `/` with `-`
pub fn safe_name(raw: &str) -> String {
    raw.to_lowercase().replace(':', "-").replace('/', "-")
}

/// Image tag built for a model: `ollama-<safe-name>`
pub fn image_name(raw: &str) -> String {
    format!("{}{}", UNIT_PREFIX, safe_name(raw))
}

/// Container name for a model: `ollama-<safe-name>-container`
pub fn unit_name(raw: &str) -> String {
    format!("{}{}", image_name(raw), UNIT_SUFFIX)
}

/// Recover the model name from a container name.
///
/// Each affix is stripped only when present, so names outside the
/// convention come back unchanged.
pub fn model_from_unit(unit: &str) -> &str {
    let name = unit.strip_prefix(UNIT_PREFIX).unwrap_or(unit);
    name.strip_suffix(UNIT_SUFFIX).unwrap_or(name)
}

/// Whether a container name follows the `ollama-*-container` convention
pub fn is_managed_unit(name: &str) -> bool {
    name.len() > UNIT_PREFIX.len() + UNIT_SUFFIX.len()
        && name.starts_with(UNIT_PREFIX)
        && name.ends_with(UNIT_SUFFIX)
}

/// Every identifier derived from one model request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitNames {
    pub safe: String,
    pub image: String,
    pub unit: String,
}

impl UnitNames {
    pub fn for_model(raw: &str) -> Self {
        Self {
            safe: safe_name(raw),
            image: image_name(raw),
            unit: unit_name(raw),
        }
    }
}
