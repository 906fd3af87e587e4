//! Named assistants shared across requests.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use weft_llm::{AnyProvider, LlmProvider};

use crate::assistant::{Assistant, AssistantError, AssistantSpec};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("assistant `{0}` already exists")]
    Duplicate(String),

    #[error("assistant `{0}` not found")]
    NotFound(String),

    #[error(transparent)]
    Assistant(#[from] AssistantError),
}

pub struct AssistantRegistry<P: LlmProvider + Clone + 'static = AnyProvider> {
    assistants: RwLock<BTreeMap<String, Arc<Assistant<P>>>>,
}

impl<P: LlmProvider + Clone + 'static> Default for AssistantRegistry<P> {
    fn default() -> Self {
        Self {
            assistants: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<P: LlmProvider + Clone + 'static> std::fmt::Debug for AssistantRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantRegistry")
            .field("assistants", &self.list())
            .finish()
    }
}

impl<P: LlmProvider + Clone + 'static> AssistantRegistry<P> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an assistant from `spec` and register it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the name is taken, or the assistant's
    /// construction error.
    pub fn create(&self, spec: AssistantSpec, provider: P) -> Result<Arc<Assistant<P>>, RegistryError> {
        self.insert(Assistant::new(spec, provider)?)
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if an assistant with the same name is registered.
    pub fn insert(&self, assistant: Assistant<P>) -> Result<Arc<Assistant<P>>, RegistryError> {
        let mut assistants = self
            .assistants
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let name = assistant.name().to_owned();
        if assistants.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let assistant = Arc::new(assistant);
        assistants.insert(name.clone(), Arc::clone(&assistant));
        tracing::info!(assistant = %name, "assistant registered");
        Ok(assistant)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Assistant<P>>> {
        self.assistants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.assistants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Unregister an assistant. Requests already holding it finish normally.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if no assistant has this name.
    pub fn remove(&self, name: &str) -> Result<Arc<Assistant<P>>, RegistryError> {
        let removed = self
            .assistants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))?;
        tracing::info!(assistant = %name, "assistant removed");
        Ok(removed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.assistants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use weft_llm::mock::MockProvider;

    use super::*;

    #[test]
    fn create_get_list_remove() {
        let registry = AssistantRegistry::new();
        assert!(registry.is_empty());
        registry
            .create(AssistantSpec::new("support"), MockProvider::default())
            .unwrap();
        registry
            .create(AssistantSpec::new("billing"), MockProvider::default())
            .unwrap();

        assert_eq!(registry.list(), vec!["billing", "support"]);
        assert_eq!(registry.get("support").unwrap().name(), "support");
        assert!(registry.get("sales").is_none());

        registry.remove("billing").unwrap();
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.remove("billing"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = AssistantRegistry::new();
        registry
            .create(AssistantSpec::new("support"), MockProvider::default())
            .unwrap();
        let err = registry
            .create(AssistantSpec::new("support"), MockProvider::default())
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(name) if name == "support"));
    }

    #[test]
    fn invalid_spec_is_reported() {
        let registry = AssistantRegistry::<MockProvider>::new();
        let spec = AssistantSpec::new("a").with_option("max_tokens", serde_json::json!("many"));
        assert!(matches!(
            registry.create(spec, MockProvider::default()),
            Err(RegistryError::Assistant(AssistantError::InvalidOption { .. }))
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn removed_assistant_stays_usable_by_holders() {
        let registry = AssistantRegistry::new();
        let held = registry
            .create(
                AssistantSpec::new("support"),
                MockProvider::with_responses(vec!["still here".into()]),
            )
            .unwrap();
        registry.remove("support").unwrap();
        assert_eq!(held.chat("hi").await.unwrap(), "still here");
    }
}
