use ndarray::ArrayView1;

use crate::core::errors::RagError;

pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, RagError> {
    if query.is_empty() || candidate.is_empty() {
        return Err(RagError::EmbeddingMismatch(
            "vectors must not be empty".to_string(),
        ));
    }
    if query.len() != candidate.len() {
        return Err(RagError::EmbeddingMismatch(format!(
            "vector length mismatch: {} != {}",
            query.len(),
            candidate.len()
        )));
    }

    let query = ArrayView1::from(query);
    let candidate = ArrayView1::from(candidate);

    let dot = query.dot(&candidate);
    let denom = l2_norm(&query) * l2_norm(&candidate);
    if denom <= f32::EPSILON {
        return Ok(0.0);
    }

    Ok(dot / denom)
}

/// Scales `vector` to unit length in place; zero vectors are left alone.
pub fn normalize(vector: &mut [f32]) {
    let norm = l2_norm(&ArrayView1::from(&*vector));
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

fn l2_norm(vector: &ArrayView1<f32>) -> f32 {
    vector.dot(vector).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn cosine_is_one_for_identical_vectors() {
        let vec = vec![1.0, 2.0, 3.0, 4.0];
        let score = cosine_similarity(&vec, &vec).expect("cosine should work");
        assert!(approx_eq(score, 1.0));
    }

    #[test]
    fn cosine_is_zero_for_orthogonal_vectors() {
        let score = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).expect("cosine should work");
        assert!(approx_eq(score, 0.0));
    }

    #[test]
    fn cosine_rejects_mismatched_lengths() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0]).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingMismatch(_)));
    }

    #[test]
    fn normalize_produces_unit_vectors() {
        let mut vec = vec![3.0, 4.0];
        normalize(&mut vec);
        assert!(approx_eq(vec[0], 0.6));
        assert!(approx_eq(vec[1], 0.8));

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
