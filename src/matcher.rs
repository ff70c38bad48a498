//! Cosine similarity and best-match search over principle embeddings.
//!
//! A flat linear scan is deliberate: threshold semantics matter here, not
//! index speed. Ties break toward the first-encountered candidate so the
//! scan stays deterministic for a fixed principle order.

use crate::types::Principle;

/// Cosine similarity in [-1, 1].
///
/// Length mismatch or a zero vector yields 0.0, never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Outcome of a best-match scan
#[derive(Debug)]
pub struct MatchResult<'a> {
    pub principle: Option<&'a Principle>,
    pub similarity: f32,
    pub is_match: bool,
}

/// Scan all candidates and return the maximum-similarity one.
///
/// If the maximum falls below `threshold` the result is a no-match
/// (None, similarity 0.0) even when some candidate scored above zero.
pub fn find_best_match<'a>(
    target: &[f32],
    candidates: &'a [Principle],
    threshold: f32,
) -> MatchResult<'a> {
    let mut best: Option<&Principle> = None;
    let mut best_similarity = f32::NEG_INFINITY;

    for candidate in candidates {
        let similarity = cosine_similarity(target, &candidate.embedding);
        // Strict greater keeps the first-encountered candidate on ties
        if similarity > best_similarity {
            best_similarity = similarity;
            best = Some(candidate);
        }
    }

    match best {
        Some(principle) if best_similarity >= threshold => MatchResult {
            principle: Some(principle),
            similarity: best_similarity,
            is_match: true,
        },
        _ => MatchResult {
            principle: None,
            similarity: 0.0,
            is_match: false,
        },
    }
}
