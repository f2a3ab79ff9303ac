//! Vector similarity helpers.
//!
//! Embedding backends are free to return vectors of any dimension, and a
//! store built with one model may later be queried with another. Rather
//! than rejecting mismatched vectors, similarity is computed over the
//! shared prefix.

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal, empty, or zero-norm
/// - `-1.0` = opposite direction
///
/// When the lengths differ only the first `min(a.len(), b.len())`
/// components participate.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let shared = a.len().min(b.len());
    if shared == 0 {
        return 0.0;
    }

    let (dot, sq_a, sq_b) = a[..shared]
        .iter()
        .zip(&b[..shared])
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, sq_a, sq_b), (x, y)| {
            (dot + x * y, sq_a + x * x, sq_b + y * y)
        });

    if sq_a == 0.0 || sq_b == 0.0 {
        return 0.0;
    }
    dot / (sq_a.sqrt() * sq_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_vector_scores_one() {
        let v = [0.2, 0.4, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_perpendicular_scores_zero() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_reversed_scores_minus_one() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[]), 0.0);
    }

    #[test]
    fn test_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_mismatched_lengths_use_prefix() {
        // Only [1.0, 0.0] vs [1.0, 0.0] is compared.
        let sim = cosine_similarity(&[1.0, 0.0, 5.0], &[1.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }
}
