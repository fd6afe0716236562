// Utility functions for recommendation-service

use ndarray::ArrayView1;

/// Cosine similarity between two embedding vectors.
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    a.dot(&b) / (norm_a * norm_b + 1e-9)
}
