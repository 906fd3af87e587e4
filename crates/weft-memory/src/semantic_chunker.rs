use crate::embedding::{EmbeddingService, calculate_similarity};
use crate::error::EmbeddingError;

/// Groups sentences into chunks, breaking where neighbouring sentence embeddings drift apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemanticChunker {
    /// Distances above this percentile of all neighbour distances start a new chunk.
    pub breakpoint_percentile: f32,
    /// Sentences shorter than this many characters are merged into the following one.
    pub min_chunk_chars: usize,
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self {
            breakpoint_percentile: 85.0,
            min_chunk_chars: 100,
        }
    }
}

impl SemanticChunker {
    /// Split `text` into semantically coherent chunks. All sentences are embedded in one call.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding call fails.
    pub async fn split(
        &self,
        embeddings: &EmbeddingService,
        text: &str,
    ) -> Result<Vec<String>, EmbeddingError> {
        let sentences = merge_short(split_sentences(text), self.min_chunk_chars);
        if sentences.len() <= 1 {
            return Ok(sentences);
        }

        let vectors = embeddings.get_embeddings(&sentences).await?;
        let mut distances = Vec::with_capacity(vectors.len().saturating_sub(1));
        for pair in vectors.windows(2) {
            let distance = match calculate_similarity(&pair[0], &pair[1]) {
                Ok(similarity) => 1.0 - similarity,
                Err(EmbeddingError::ZeroVector) => 1.0,
                Err(e) => return Err(e),
            };
            distances.push(distance);
        }
        let threshold = percentile(&distances, self.breakpoint_percentile);

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for (i, sentence) in sentences.iter().enumerate() {
            current.push(sentence);
            if distances.get(i).is_some_and(|&d| d > threshold) {
                chunks.push(current.join(" "));
                current.clear();
            }
        }
        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
        Ok(chunks)
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => true,
            '.' | '!' | '?' => chars.peek().is_none_or(|&(_, next)| next.is_whitespace()),
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            push_trimmed(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece.to_owned());
    }
}

fn merge_short(sentences: Vec<String>, min_chars: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(sentences.len());
    let mut pending = String::new();
    for sentence in sentences {
        if !pending.is_empty() {
            pending.push(' ');
        }
        pending.push_str(&sentence);
        if pending.chars().count() >= min_chars {
            merged.push(std::mem::take(&mut pending));
        }
    }
    if !pending.is_empty() {
        match merged.last_mut() {
            Some(last) => {
                last.push(' ');
                last.push_str(&pending);
            }
            None => merged.push(pending),
        }
    }
    merged
}

/// Linearly interpolated percentile, `p` in `0..=100`.
fn percentile(values: &[f32], p: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    #[allow(clippy::cast_precision_loss)]
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    #[allow(clippy::cast_precision_loss)]
    let frac = rank - lower as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}
