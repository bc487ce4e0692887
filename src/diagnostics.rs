//! Weight diagnostics
//!
//! Shared numerics for working with log-space importance weights. Everything
//! here is careful about underflow (log-sum-exp throughout) and deliberately
//! does not clamp: NaN and `-inf` propagate so that degeneracy checks can
//! see them.

/// `ln(sum(exp(x)))` computed stably.
///
/// Returns `-inf` for an empty slice or when every element is `-inf`, and
/// NaN if any element is NaN.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    if xs.iter().any(|x| x.is_nan()) {
        return f64::NAN;
    }
    let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = xs.iter().map(|x| (x - max).exp()).sum();
    max + sum.ln()
}

/// Normalize log-weights into probabilities.
///
/// The caller must ensure at least one weight is finite; degenerate input
/// produces non-finite probabilities rather than being silently repaired.
pub fn normalize_log_weights(log_weights: &[f64]) -> Vec<f64> {
    let lse = log_sum_exp(log_weights);
    log_weights.iter().map(|w| (w - lse).exp()).collect()
}

/// Effective sample size of a log-weight vector.
///
/// `ESS = 1 / sum(p_i^2)` over the normalized weights. Equal weights give
/// the vector length; a single dominant weight gives 1; an all-`-inf`
/// vector gives 0.
pub fn ess_from_log_weights(log_weights: &[f64]) -> f64 {
    if log_weights.is_empty() {
        return 0.0;
    }
    let lse = log_sum_exp(log_weights);
    if lse == f64::NEG_INFINITY {
        return 0.0;
    }
    let sum_sq: f64 = log_weights.iter().map(|w| (2.0 * (w - lse)).exp()).sum();
    1.0 / sum_sq
}
