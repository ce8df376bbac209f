use ndarray::ArrayView1;

/// Cosine similarity in `[-1, 1]`; zero for empty, mismatched or zero-norm
/// vectors.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> f32 {
    if query.is_empty() || query.len() != candidate.len() {
        return 0.0;
    }

    let a = ArrayView1::from(query);
    let b = ArrayView1::from(candidate);

    let dot = a.dot(&b);
    let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

/// Scales a vector to unit length in place; zero vectors are left alone.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = ArrayView1::from(&*vector).dot(&ArrayView1::from(&*vector)).sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
