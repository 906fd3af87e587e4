use serde::Serialize;

use crate::error::EmbeddingError;
use crate::tokenizer::Tokenizer;

/// One token window over a source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenChunk {
    pub index: usize,
    pub start_token: usize,
    pub token_count: usize,
    pub text: String,
}

/// Slide a window of `chunk_size` tokens over `text`, advancing by `chunk_size - overlap`.
///
/// Consecutive chunks share exactly `overlap` tokens. The final chunk ends at the last token
/// and may be shorter than `chunk_size`. Empty or whitespace-only input yields no chunks.
///
/// # Errors
///
/// Returns [`EmbeddingError::InvalidWindow`] when `chunk_size` is zero or `overlap >= chunk_size`.
pub fn chunk_text(
    tokenizer: &dyn Tokenizer,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<TokenChunk>, EmbeddingError> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(EmbeddingError::InvalidWindow {
            chunk_size,
            overlap,
        });
    }
    let step = chunk_size - overlap;
    let tokens = tokenizer.encode(text);

    let mut chunks = Vec::with_capacity(tokens.len().div_ceil(step));
    let mut start = 0;
    while start < tokens.len() {
        let end = (start + chunk_size).min(tokens.len());
        chunks.push(TokenChunk {
            index: chunks.len(),
            start_token: start,
            token_count: end - start,
            text: tokenizer.decode(text, &tokens[start..end]).to_owned(),
        });
        if end == tokens.len() {
            break;
        }
        start += step;
    }
    Ok(chunks)
}
