use std::sync::Arc;

use super::{RagBackend, RagError};

/// An assistant's link to one retrieval backend.
#[derive(Clone)]
pub struct RagBinding {
    pub backend: Arc<dyn RagBackend>,
    pub name: String,
    pub weight: f32,
    pub enabled: bool,
}

impl std::fmt::Debug for RagBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagBinding")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl RagBinding {
    /// # Errors
    ///
    /// Returns [`RagError::InvalidWeight`] for a negative or non-finite weight.
    pub fn new(
        backend: Arc<dyn RagBackend>,
        name: impl Into<String>,
        weight: f32,
        enabled: bool,
    ) -> Result<Self, RagError> {
        let name = name.into();
        if !weight.is_finite() || weight < 0.0 {
            return Err(RagError::InvalidWeight { name, weight });
        }
        Ok(Self {
            backend,
            name,
            weight,
            enabled,
        })
    }

    /// Header line that introduces this binding's context in the merged prompt.
    #[must_use]
    pub fn header(&self) -> String {
        format!("=== From {} (weight: {:?}) ===", self.name, self.weight)
    }
}
