use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde_json::json;
use weft_memory::{BoxFuture, Metadata};

use super::{NO_MATCH_CONTEXT, RagBackend, RagContext, RagDocument, RagError};

/// Case-insensitive word matching over an in-memory document set.
///
/// A document matches when any whitespace-separated word of the question occurs in it.
/// Results carry the backend's name as their `source`.
#[derive(Debug)]
pub struct KeywordRag {
    name: String,
    documents: RwLock<BTreeMap<String, RagDocument>>,
}

impl Default for KeywordRag {
    fn default() -> Self {
        Self {
            name: "keyword".to_owned(),
            documents: RwLock::default(),
        }
    }
}

impl KeywordRag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn with_documents(documents: impl IntoIterator<Item = RagDocument>) -> Self {
        let rag = Self::new();
        rag.insert(documents);
        rag
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, documents: impl IntoIterator<Item = RagDocument>) {
        let mut map = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for doc in documents {
            map.insert(doc.id.clone(), doc);
        }
    }

    fn search(&self, question: &str) -> RagContext {
        let words: Vec<String> = question
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        let map = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let matched: Vec<&RagDocument> = map
            .values()
            .filter(|doc| {
                let content = doc.content.to_lowercase();
                words.iter().any(|w| content.contains(w.as_str()))
            })
            .collect();

        let context = if matched.is_empty() {
            NO_MATCH_CONTEXT.to_owned()
        } else {
            matched
                .iter()
                .map(|doc| format!("[Doc {}]: {}", doc.id, doc.content))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let metadata = Metadata::from([
            ("source".to_owned(), json!(self.name)),
            ("matched_docs".to_owned(), json!(matched.len())),
        ]);
        RagContext { context, metadata }
    }
}

impl RagBackend for KeywordRag {
    fn query(&self, question: &str) -> BoxFuture<'_, Result<RagContext, RagError>> {
        let result = self.search(question);
        Box::pin(async move { Ok(result) })
    }

    fn add_documents(&self, documents: Vec<RagDocument>) -> BoxFuture<'_, Result<(), RagError>> {
        self.insert(documents);
        Box::pin(async { Ok(()) })
    }

    fn update_index(&self) -> BoxFuture<'_, Result<(), RagError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company() -> KeywordRag {
        KeywordRag::with_documents([
            RagDocument::new("1", "Our office is in Berlin."),
            RagDocument::new("2", "Support hours are 9 to 5."),
            RagDocument::new("3", "The cafeteria serves lunch."),
        ])
    }

    #[tokio::test]
    async fn matches_any_word_case_insensitively() {
        let rag = company();
        let result = rag.query("Where is the OFFICE?").await.unwrap();
        // "the" also matches document 3.
        assert_eq!(
            result.context,
            "[Doc 1]: Our office is in Berlin.\n[Doc 3]: The cafeteria serves lunch."
        );
        assert_eq!(result.metadata["matched_docs"], 2);
        assert_eq!(result.metadata["source"], "keyword");
    }

    #[tokio::test]
    async fn no_match_returns_placeholder() {
        let rag = company();
        let result = rag.query("quantum").await.unwrap();
        assert_eq!(result.context, NO_MATCH_CONTEXT);
        assert_eq!(result.metadata["matched_docs"], 0);
    }

    #[tokio::test]
    async fn added_documents_are_searchable_and_replace_by_id() {
        let rag = KeywordRag::new();
        assert!(rag.is_empty());
        rag.add_documents(vec![RagDocument::new("a", "old text")])
            .await
            .unwrap();
        rag.add_documents(vec![RagDocument::new("a", "new text")])
            .await
            .unwrap();
        rag.update_index().await.unwrap();
        assert_eq!(rag.len(), 1);
        let result = rag.query("new").await.unwrap();
        assert_eq!(result.context, "[Doc a]: new text");
    }

    #[tokio::test]
    async fn results_report_the_backend_name() {
        let rag = company().with_name("Company");
        assert_eq!(rag.name(), "Company");
        let result = rag.query("office").await.unwrap();
        assert_eq!(result.metadata["source"], "Company");
    }
}
