use sha2::{Digest, Sha256};

use super::types::EmbeddingModel;
use crate::pipeline::UpstreamError;

/// Dimension produced by [`MockEmbedder`].
pub const MOCK_EMBEDDING_DIM: usize = 384;

/// Mock embedding model for testing. Produces deterministic vectors.
///
/// Each lower-cased word is hashed into a bucket, so texts sharing words
/// score a positive cosine similarity and unrelated texts score near zero.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: MOCK_EMBEDDING_DIM,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingModel for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        Ok(bag_of_words_vector(text, self.dimension))
    }
}

fn bag_of_words_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let digest = Sha256::digest(word.to_lowercase().as_bytes());
        let bucket = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]) as usize
            % dim;
        vec[bucket] += 1.0;
    }

    // L2 normalize
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in &mut vec {
            *val /= norm;
        }
    }

    vec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::cosine_similarity;

    #[test]
    fn mock_embed_returns_correct_dimension() {
        let embedder = MockEmbedder::new();
        assert_eq!(embedder.embed("Hello world").unwrap().len(), MOCK_EMBEDDING_DIM);
    }

    #[test]
    fn mock_embed_is_deterministic() {
        let embedder = MockEmbedder::new();
        assert_eq!(embedder.embed("same text").unwrap(), embedder.embed("same text").unwrap());
    }

    #[test]
    fn shared_words_score_higher_than_unrelated() {
        let embedder = MockEmbedder::new();
        let query = embedder.embed("retention policy").unwrap();
        let related = embedder.embed("Data retention policy for backups").unwrap();
        let unrelated = embedder.embed("cafeteria menu tuesday").unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let v = MockEmbedder::with_dimension(8).embed("").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
