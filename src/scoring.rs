//! Log-Probability Reduction
//!
//! Turns per-token log-probabilities into a single perplexity score and
//! ranks candidate answers by it. Lower perplexity means a more probable
//! continuation, so rankings are ascending.

/// Perplexity of a token-level log-probability sequence.
///
/// Computed as `exp(-mean(log_probs))`. The mean is order-insensitive, so
/// reordering the input does not change the result. An empty sequence
/// reduces to `+inf` (the worst possible score) so that a zero-token target
/// can never win a ranking.
#[must_use]
pub fn perplexity(log_probs: &[f64]) -> f64 {
    if log_probs.is_empty() {
        return f64::INFINITY;
    }
    let mean = log_probs.iter().sum::<f64>() / log_probs.len() as f64;
    (-mean).exp()
}

/// Indices of `scores` sorted ascending (best perplexity first).
///
/// The sort is stable: equal scores keep their original input order, which
/// makes rankings reproducible across runs.
#[must_use]
pub fn rank_ascending(scores: &[f64]) -> Vec<usize> {
    let mut indexes: Vec<usize> = (0..scores.len()).collect();
    indexes.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    indexes
}
