/// Cosine similarity in [-1.0, 1.0].
///
/// Vectors of different lengths are compared over the shorter prefix. Returns 0.0 when
/// either side has zero norm, so an all-zero vector never matches anything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        tracing::warn!(
            a_len = a.len(),
            b_len = b.len(),
            "embedding length mismatch; comparing shared prefix"
        );
    }
    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn identical_vectors_score_one() {
        let a = vec![0.3, -1.2, 4.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 2.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let a = vec![1.0, 2.0];
        let b = vec![-1.0, -2.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_scores_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let a = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &a), 0.0);
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn mismatched_lengths_use_shorter_prefix() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
    }

    proptest! {
        #[test]
        fn cosine_is_symmetric(
            a in prop::collection::vec(-100.0f32..100.0, 1..32),
            b in prop::collection::vec(-100.0f32..100.0, 1..32),
        ) {
            prop_assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
        }

        #[test]
        fn cosine_is_bounded(
            a in prop::collection::vec(-100.0f32..100.0, 1..32),
            b in prop::collection::vec(-100.0f32..100.0, 1..32),
        ) {
            let score = cosine_similarity(&a, &b);
            prop_assert!((-1.0..=1.0).contains(&score));
        }

        #[test]
        fn self_similarity_is_one_for_non_zero(a in prop::collection::vec(0.5f32..100.0, 1..32)) {
            prop_assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-5);
        }
    }
}
