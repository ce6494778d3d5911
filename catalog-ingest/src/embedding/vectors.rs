use rand::Rng;

use crate::errors::EmbeddingError;

/// A random unit vector of `dims` components, each drawn from `[-1, 1)`
/// before normalization.
///
/// Two calls practically never return the same vector.
pub fn fallback_vector(dims: usize) -> Vec<f32> {
    if dims == 0 {
        return Vec::new();
    }

    let mut rng = rand::thread_rng();
    loop {
        let raw: Vec<f32> = (0..dims).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        if let Some(vector) = normalized(raw) {
            return vector;
        }
    }
}

/// Fit a vector returned by the embedding service to `dims` components.
///
/// Longer vectors are truncated, shorter ones zero-padded, and the result is
/// scaled to unit length. Empty, non-finite and all-zero vectors are
/// rejected as malformed.
pub fn shape_vector(mut raw: Vec<f32>, dims: usize) -> Result<Vec<f32>, EmbeddingError> {
    if raw.is_empty() {
        return Err(EmbeddingError::malformed("empty embedding"));
    }
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::malformed("embedding contains non-finite values"));
    }

    raw.resize(dims, 0.0);
    normalized(raw).ok_or_else(|| EmbeddingError::malformed("embedding has zero norm"))
}

fn normalized(mut vector: Vec<f32>) -> Option<Vec<f32>> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    vector.iter_mut().for_each(|v| *v /= norm);
    Some(vector)
}
