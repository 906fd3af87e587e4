//! Text tokenization with byte spans into the source text.
//!
//! Tokens never own text. A contiguous run of tokens decodes to the exact
//! substring it was produced from, which keeps chunk boundaries faithful to
//! the original document.

use std::sync::LazyLock;

use regex::Regex;

/// Byte span `[start, end)` of one token in the encoded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub start: usize,
    pub end: usize,
}

pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<Token>;

    /// Reconstruct the text covered by a contiguous token slice.
    fn decode<'t>(&self, text: &'t str, tokens: &[Token]) -> &'t str {
        match (tokens.first(), tokens.last()) {
            (Some(first), Some(last)) => &text[first.start..last.end],
            _ => "",
        }
    }

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

static WORD_PIECE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\w+|[^\w\s])\s*").unwrap());

/// Splits on word runs and single punctuation marks; each token keeps its trailing whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordPieceTokenizer;

impl Tokenizer for WordPieceTokenizer {
    fn encode(&self, text: &str) -> Vec<Token> {
        WORD_PIECE
            .find_iter(text)
            .map(|m| Token {
                start: m.start(),
                end: m.end(),
            })
            .collect()
    }
}

#[cfg(feature = "hf-tokenizer")]
pub use hf::HfTokenizer;

#[cfg(feature = "hf-tokenizer")]
mod hf {
    use super::{Token, Tokenizer};
    use crate::error::EmbeddingError;

    /// Wraps a `tokenizer.json` from the Hugging Face hub.
    pub struct HfTokenizer {
        inner: tokenizers::Tokenizer,
    }

    impl HfTokenizer {
        /// # Errors
        ///
        /// Returns an error if the tokenizer file cannot be loaded.
        pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, EmbeddingError> {
            let inner = tokenizers::Tokenizer::from_file(path)
                .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
            Ok(Self { inner })
        }
    }

    impl std::fmt::Debug for HfTokenizer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("HfTokenizer").finish_non_exhaustive()
        }
    }

    impl Tokenizer for HfTokenizer {
        fn encode(&self, text: &str) -> Vec<Token> {
            let Ok(encoding) = self.inner.encode(text, false) else {
                tracing::warn!("hf tokenizer failed, falling back to word pieces");
                return super::WordPieceTokenizer.encode(text);
            };
            let offsets = encoding.get_offsets();
            let mut tokens: Vec<Token> = Vec::with_capacity(offsets.len());
            for (i, &(start, _)) in offsets.iter().enumerate() {
                // Extend each token to the next token's start so spans tile the text.
                let end = offsets.get(i + 1).map_or(text.len(), |&(next, _)| next);
                if end > start {
                    tokens.push(Token { start, end });
                }
            }
            tokens
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_words_and_punctuation() {
        let text = "Hello, world! 42";
        let tokens = WordPieceTokenizer.encode(text);
        let pieces: Vec<&str> = tokens.iter().map(|t| &text[t.start..t.end]).collect();
        assert_eq!(pieces, vec!["Hello", ", ", "world", "! ", "42"]);
    }

    #[test]
    fn decode_contiguous_range_is_exact_substring() {
        let text = "The quick  brown\nfox jumps.";
        let tokens = WordPieceTokenizer.encode(text);
        assert_eq!(WordPieceTokenizer.decode(text, &tokens[1..3]), "quick  brown\n");
        assert_eq!(WordPieceTokenizer.decode(text, &tokens), text);
    }

    #[test]
    fn unicode_words_are_single_tokens() {
        let text = "çalışma günü";
        assert_eq!(WordPieceTokenizer.count(text), 2);
    }

    #[test]
    fn empty_and_whitespace_only() {
        assert!(WordPieceTokenizer.encode("").is_empty());
        assert!(WordPieceTokenizer.encode("   \n").is_empty());
        assert_eq!(WordPieceTokenizer.decode("abc", &[]), "");
    }
}
