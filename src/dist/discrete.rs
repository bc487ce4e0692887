//! Discrete distributions

use rand::{Rng, RngCore};

use super::Distribution;
use crate::error::{GenResult, ModelError};

/// Bernoulli distribution over `bool`
#[derive(Clone, Copy, Debug)]
pub struct Bernoulli {
    p: f64,
}

impl Bernoulli {
    /// Create a Bernoulli distribution; `p` must lie in `[0, 1]`
    pub fn new(p: f64) -> GenResult<Self> {
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(ModelError::InvalidParams(format!("Bernoulli(p={p})")).into());
        }
        Ok(Self { p })
    }
}

impl Distribution for Bernoulli {
    type Value = bool;

    fn sample(&self, rng: &mut dyn RngCore) -> bool {
        rng.gen_bool(self.p)
    }

    fn logpdf(&self, value: &bool) -> f64 {
        if *value {
            self.p.ln()
        } else {
            (1.0 - self.p).ln()
        }
    }
}

/// Categorical distribution over `0..k`, parameterized by unnormalized weights
#[derive(Clone, Debug)]
pub struct Categorical {
    probs: Vec<f64>,
    log_probs: Vec<f64>,
}

impl Categorical {
    /// Create a categorical distribution from non-negative weights.
    ///
    /// Weights are normalized at construction; at least one must be positive.
    pub fn new(weights: Vec<f64>) -> GenResult<Self> {
        if weights.is_empty() {
            return Err(ModelError::InvalidParams("Categorical with no weights".into()).into());
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(
                ModelError::InvalidParams(format!("Categorical(weights={weights:?})")).into(),
            );
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(ModelError::InvalidParams("Categorical weights sum to zero".into()).into());
        }
        let probs: Vec<f64> = weights.iter().map(|w| w / total).collect();
        let log_probs = probs.iter().map(|p| p.ln()).collect();
        Ok(Self { probs, log_probs })
    }

    /// Number of categories
    pub fn arity(&self) -> usize {
        self.probs.len()
    }
}

impl Distribution for Categorical {
    type Value = usize;

    fn sample(&self, rng: &mut dyn RngCore) -> usize {
        let u: f64 = rng.gen();
        let mut acc = 0.0;
        for (i, p) in self.probs.iter().enumerate() {
            acc += p;
            if u < acc {
                return i;
            }
        }
        self.probs.len() - 1
    }

    fn logpdf(&self, value: &usize) -> f64 {
        self.log_probs
            .get(*value)
            .copied()
            .unwrap_or(f64::NEG_INFINITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bernoulli_logpdf() {
        let d = Bernoulli::new(0.25).unwrap();
        assert!((d.logpdf(&true) - 0.25f64.ln()).abs() < 1e-12);
        assert!((d.logpdf(&false) - 0.75f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_bernoulli_degenerate() {
        let d = Bernoulli::new(0.0).unwrap();
        assert_eq!(d.logpdf(&true), f64::NEG_INFINITY);
        assert_eq!(d.logpdf(&false), 0.0);
        assert!(Bernoulli::new(1.5).is_err());
    }

    #[test]
    fn test_categorical_normalizes() {
        let d = Categorical::new(vec![1.0, 1.0, 2.0]).unwrap();
        assert_eq!(d.arity(), 3);
        assert!((d.logpdf(&2) - 0.5f64.ln()).abs() < 1e-12);
        assert!((d.logpdf(&0) - 0.25f64.ln()).abs() < 1e-12);
        assert_eq!(d.logpdf(&7), f64::NEG_INFINITY);
    }

    #[test]
    fn test_categorical_rejects_bad_weights() {
        assert!(Categorical::new(vec![]).is_err());
        assert!(Categorical::new(vec![0.0, 0.0]).is_err());
        assert!(Categorical::new(vec![1.0, -0.5]).is_err());
    }

    #[test]
    fn test_categorical_sample_frequencies() {
        let mut rng = StdRng::seed_from_u64(11);
        let d = Categorical::new(vec![0.0, 1.0, 0.0]).unwrap();
        for _ in 0..50 {
            assert_eq!(d.sample(&mut rng), 1);
        }
    }
}
