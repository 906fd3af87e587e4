mod env;
mod types;


pub use types::*;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use weft_memory::VectorStoreError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("embedding.chunk_overlap ({overlap}) must be smaller than embedding.chunk_size ({size})")]
    InvalidWindow { size: usize, overlap: usize },

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error("duplicate assistant name `{0}`")]
    DuplicateAssistant(String),

    #[error("assistant `{assistant}` declares RAG binding `{binding}` twice")]
    DuplicateBinding { assistant: String, binding: String },

    #[error("assistant `{assistant}`: {reason}")]
    InvalidAssistant { assistant: String, reason: String },
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?;
            Self::parse(&content)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse TOML without applying env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed input.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reject settings that cannot work, before anything is built.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let embedding = &self.embedding;
        if embedding.chunk_size == 0 || embedding.chunk_overlap >= embedding.chunk_size {
            return Err(ConfigError::InvalidWindow {
                size: embedding.chunk_size,
                overlap: embedding.chunk_overlap,
            });
        }
        self.vector_store.validate()?;

        let mut names = HashSet::new();
        for assistant in &self.assistants {
            if assistant.name.trim().is_empty() {
                return Err(ConfigError::InvalidAssistant {
                    assistant: assistant.name.clone(),
                    reason: "name must not be empty".into(),
                });
            }
            if !names.insert(assistant.name.as_str()) {
                return Err(ConfigError::DuplicateAssistant(assistant.name.clone()));
            }
            assistant
                .to_spec(&self.assistant)
                .generate_options()
                .map_err(|e| ConfigError::InvalidAssistant {
                    assistant: assistant.name.clone(),
                    reason: e.to_string(),
                })?;

            let mut bindings = HashSet::new();
            for binding in &assistant.rag {
                if !bindings.insert(binding.name.as_str()) {
                    return Err(ConfigError::DuplicateBinding {
                        assistant: assistant.name.clone(),
                        binding: binding.name.clone(),
                    });
                }
                if !binding.weight.is_finite() || binding.weight < 0.0 {
                    return Err(ConfigError::InvalidAssistant {
                        assistant: assistant.name.clone(),
                        reason: format!(
                            "RAG binding `{}` has invalid weight {}",
                            binding.name, binding.weight
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
