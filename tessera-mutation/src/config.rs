//! Mutation pipeline configuration, read from `mutation.toml`.

use crate::error::{MutationError, MutationResult};
use crate::implicit::ImplicitBehaviors;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Settings of the mutation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Implicit mutation classes generated for client writes.
    #[serde(default = "ImplicitBehaviors::all")]
    pub implicit_behaviors: ImplicitBehaviors,
    /// Whether consistency is verified for client writes (never for WAL replay).
    #[serde(default = "default_verify_consistency")]
    pub verify_consistency: bool,
    /// How deep external implicit mutations may recurse.
    #[serde(default = "default_max_implicit_depth")]
    pub max_implicit_depth: usize,
    /// Implicit mutation classes carried by reflected (mirrored) writes.
    #[serde(default = "ImplicitBehaviors::reference_attributes_only")]
    pub reflected_behaviors: ImplicitBehaviors,
}

fn default_verify_consistency() -> bool {
    true
}

fn default_max_implicit_depth() -> usize {
    8
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            implicit_behaviors: ImplicitBehaviors::all(),
            verify_consistency: default_verify_consistency(),
            max_implicit_depth: default_max_implicit_depth(),
            reflected_behaviors: ImplicitBehaviors::reference_attributes_only(),
        }
    }
}

impl MutationConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> MutationResult<Self> {
        toml::from_str(contents).map_err(|e| MutationError::Config(e.to_string()))
    }

    /// Loads configuration from `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: impl AsRef<Path>) -> MutationResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("no mutation config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MutationError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&contents)?;
        info!("loaded mutation config from {}", path.display());
        Ok(config)
    }
}
