//! Embedding vectors and cosine similarity

use crate::error::{InsightsError, Result};
use std::cmp::Ordering;

/// Dimensionality produced by the embedding model and expected by the similarity search.
pub const EMBEDDING_DIM: usize = 768;

/// Chunks retrieved per question.
pub const TOP_K: usize = 3;

pub type Embedding = Vec<f32>;

/// Rejects vectors whose length differs from [`EMBEDDING_DIM`].
pub fn check_dimension(embedding: &[f32]) -> Result<()> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(InsightsError::InvalidInput(format!(
            "embedding has {} dimensions, expected {}",
            embedding.len(),
            EMBEDDING_DIM
        )));
    }
    Ok(())
}

/// Parses the warehouse's textual vector form, e.g. `[0.1,0.2,...]`.
pub fn parse_embedding(text: &str) -> Result<Embedding> {
    let values: Vec<f64> = serde_json::from_str(text)
        .map_err(|e| InsightsError::Decode(format!("Invalid vector literal: {}", e)))?;
    Ok(values.into_iter().map(|v| v as f32).collect())
}

/// Renders an embedding as a JSON array literal for binding into a statement.
pub fn embedding_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Ranks `(text, score)` pairs by score descending, breaking ties on text ascending, and
/// keeps the first `k`.
pub fn rank_top_k(mut scored: Vec<(String, f32)>, k: usize) -> Vec<(String, f32)> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}
