use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use weft_memory::Metadata;

use super::{RagBinding, RagError};

pub const DEFAULT_RAG_TIMEOUT: Duration = Duration::from_secs(30);

/// One backend's contribution to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub source: String,
    pub weight: f32,
    pub context: String,
    pub metadata: Metadata,
}

/// A backend that was excluded from the merge.
#[derive(Debug)]
pub struct RetrievalFailure {
    pub source: String,
    pub error: RagError,
}

#[derive(Debug, Default)]
pub struct RagOutcome {
    /// Surviving contexts, each under its source header, in registration order.
    pub combined_context: String,
    pub results: Vec<RetrievalResult>,
    pub failures: Vec<RetrievalFailure>,
}

impl RagOutcome {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.combined_context.is_empty()
    }
}

/// Queries every enabled binding concurrently and merges what comes back.
#[derive(Debug)]
pub struct RagOrchestrator {
    bindings: RwLock<Vec<RagBinding>>,
    timeout: Duration,
}

impl Default for RagOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl RagOrchestrator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(Vec::new()),
            timeout: DEFAULT_RAG_TIMEOUT,
        }
    }

    /// Per-backend time limit. A backend that exceeds it counts as failed.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// # Errors
    ///
    /// Returns [`RagError::DuplicateBinding`] if a binding with the same name exists.
    pub fn add(&self, binding: RagBinding) -> Result<(), RagError> {
        let mut bindings = self
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if bindings.iter().any(|b| b.name == binding.name) {
            return Err(RagError::DuplicateBinding(binding.name));
        }
        tracing::debug!(name = %binding.name, weight = binding.weight, enabled = binding.enabled, "RAG system added");
        bindings.push(binding);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RagError::UnknownBinding`] if no binding has this name.
    pub fn enable(&self, name: &str) -> Result<(), RagError> {
        self.set_enabled(name, true)
    }

    /// # Errors
    ///
    /// Returns [`RagError::UnknownBinding`] if no binding has this name.
    pub fn disable(&self, name: &str) -> Result<(), RagError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), RagError> {
        let mut bindings = self
            .bindings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let binding = bindings
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| RagError::UnknownBinding(name.to_owned()))?;
        binding.enabled = enabled;
        Ok(())
    }

    /// Snapshot of all bindings in registration order.
    #[must_use]
    pub fn bindings(&self) -> Vec<RagBinding> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Query every enabled binding and merge the results.
    ///
    /// Failing or timed-out backends are logged and reported in
    /// [`RagOutcome::failures`]; they never abort the other queries.
    pub async fn query(&self, message: &str) -> RagOutcome {
        let active: Vec<RagBinding> = self
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|b| b.enabled)
            .cloned()
            .collect();
        if active.is_empty() {
            return RagOutcome::default();
        }

        let timeout = self.timeout;
        let replies = join_all(active.iter().map(|binding| async move {
            match tokio::time::timeout(timeout, binding.backend.query(message)).await {
                Ok(reply) => reply,
                Err(_) => Err(RagError::Timeout(timeout)),
            }
        }))
        .await;

        let mut outcome = RagOutcome::default();
        let mut sections = Vec::with_capacity(active.len());
        for (binding, reply) in active.into_iter().zip(replies) {
            match reply {
                Ok(ctx) => {
                    sections.push(format!("{}\n{}", binding.header(), ctx.context));
                    outcome.results.push(RetrievalResult {
                        source: binding.name,
                        weight: binding.weight,
                        context: ctx.context,
                        metadata: ctx.metadata,
                    });
                }
                Err(error) => {
                    tracing::warn!(source = %binding.name, "RAG system excluded: {error}");
                    outcome.failures.push(RetrievalFailure {
                        source: binding.name,
                        error,
                    });
                }
            }
        }
        outcome.combined_context = sections.join("\n\n");
        outcome
    }
}
