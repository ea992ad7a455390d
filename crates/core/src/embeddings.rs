use crate::error::SearchError;
use async_trait::async_trait;

const DEFAULT: usize = 256;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Text embedding backend. The same backend (same `model_id`) must be used to
/// build a crop index and to query it.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn model_id(&self) -> &str;

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let mut vectors = self.embed(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| SearchError::external(self.model_id(), "backend returned no vector"))
    }
}

/// Offline embedder over hashed character bigrams and trigrams of each token.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();

        for token in lowered.split_whitespace() {
            let padded: Vec<char> = std::iter::once(' ')
                .chain(token.chars())
                .chain(std::iter::once(' '))
                .collect();

            for width in [2, 3] {
                for window in padded.windows(width) {
                    let bucket = (fnv1a(window) % vector.len() as u64) as usize;
                    vector[bucket] += 1.0;
                }
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

fn fnv1a(window: &[char]) -> u64 {
    let mut hash = 1469598103934665603u64;
    let mut buffer = [0u8; 4];
    for ch in window {
        for byte in ch.encode_utf8(&mut buffer).bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
    }
    hash
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "char-ngram-2-3"
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Cosine distance (`1 - cos`). Zero vectors are maximally distant.
pub fn cosine_distance(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }

    1.0 - dot / (left_norm * right_norm)
}
