use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WEFT_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid WEFT_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("WEFT_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("WEFT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("WEFT_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("WEFT_LLM_API_KEY")
            && !v.trim().is_empty()
        {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("WEFT_VECTOR_BACKEND") {
            self.vector_store.backend = v;
        }
        if let Ok(v) = std::env::var("WEFT_QDRANT_URL") {
            self.vector_store.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("WEFT_SQLITE_PATH") {
            self.ingestion.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("WEFT_MAX_HISTORY") {
            if let Ok(n) = v.parse::<usize>() {
                self.assistant.max_history = n;
            } else {
                tracing::warn!("ignoring invalid WEFT_MAX_HISTORY value: {v}");
            }
        }
    }
}
