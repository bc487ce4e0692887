//! Continuous distributions

use std::f64::consts::PI;

use rand::{Rng, RngCore};
use rand_distr::Distribution as SampleDist;

use super::{ln_gamma, Distribution};
use crate::error::{GenResult, ModelError};

/// Normal (Gaussian) distribution parameterized by mean and standard deviation
#[derive(Clone, Copy, Debug)]
pub struct Normal {
    mean: f64,
    std: f64,
    sampler: rand_distr::Normal<f64>,
}

impl Normal {
    /// Create a normal distribution; `std` must be finite and positive
    pub fn new(mean: f64, std: f64) -> GenResult<Self> {
        if !mean.is_finite() || !std.is_finite() || std <= 0.0 {
            return Err(ModelError::InvalidParams(format!("Normal(mean={mean}, std={std})")).into());
        }
        let sampler = rand_distr::Normal::new(mean, std)
            .map_err(|e| ModelError::InvalidParams(e.to_string()))?;
        Ok(Self { mean, std, sampler })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }
}

impl Distribution for Normal {
    type Value = f64;

    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.sampler.sample(rng)
    }

    fn logpdf(&self, value: &f64) -> f64 {
        let z = (value - self.mean) / self.std;
        -0.5 * z * z - self.std.ln() - 0.5 * (2.0 * PI).ln()
    }
}

/// Continuous uniform distribution on the half-open interval `[low, high)`
#[derive(Clone, Copy, Debug)]
pub struct Uniform {
    low: f64,
    high: f64,
}

impl Uniform {
    /// Create a uniform distribution; requires `low < high`, both finite
    pub fn new(low: f64, high: f64) -> GenResult<Self> {
        if !low.is_finite() || !high.is_finite() || low >= high {
            return Err(ModelError::InvalidParams(format!("Uniform(low={low}, high={high})")).into());
        }
        Ok(Self { low, high })
    }
}

impl Distribution for Uniform {
    type Value = f64;

    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        rng.gen_range(self.low..self.high)
    }

    fn logpdf(&self, value: &f64) -> f64 {
        if *value >= self.low && *value < self.high {
            -(self.high - self.low).ln()
        } else {
            f64::NEG_INFINITY
        }
    }
}

/// Gamma distribution parameterized by shape and rate
#[derive(Clone, Copy, Debug)]
pub struct Gamma {
    shape: f64,
    rate: f64,
    sampler: rand_distr::Gamma<f64>,
}

impl Gamma {
    /// Create a gamma distribution; shape and rate must be finite and positive
    pub fn new(shape: f64, rate: f64) -> GenResult<Self> {
        if !shape.is_finite() || !rate.is_finite() || shape <= 0.0 || rate <= 0.0 {
            return Err(
                ModelError::InvalidParams(format!("Gamma(shape={shape}, rate={rate})")).into(),
            );
        }
        let sampler = rand_distr::Gamma::new(shape, 1.0 / rate)
            .map_err(|e| ModelError::InvalidParams(e.to_string()))?;
        Ok(Self {
            shape,
            rate,
            sampler,
        })
    }
}

impl Distribution for Gamma {
    type Value = f64;

    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.sampler.sample(rng)
    }

    fn logpdf(&self, value: &f64) -> f64 {
        if *value <= 0.0 {
            return f64::NEG_INFINITY;
        }
        self.shape * self.rate.ln() - ln_gamma(self.shape) + (self.shape - 1.0) * value.ln()
            - self.rate * value
    }
}

/// Beta distribution on the open interval `(0, 1)`
#[derive(Clone, Copy, Debug)]
pub struct Beta {
    alpha: f64,
    beta: f64,
    sampler: rand_distr::Beta<f64>,
}

impl Beta {
    /// Create a beta distribution; both shape parameters must be finite and positive
    pub fn new(alpha: f64, beta: f64) -> GenResult<Self> {
        if !alpha.is_finite() || !beta.is_finite() || alpha <= 0.0 || beta <= 0.0 {
            return Err(
                ModelError::InvalidParams(format!("Beta(alpha={alpha}, beta={beta})")).into(),
            );
        }
        let sampler = rand_distr::Beta::new(alpha, beta)
            .map_err(|e| ModelError::InvalidParams(e.to_string()))?;
        Ok(Self {
            alpha,
            beta,
            sampler,
        })
    }
}

impl Distribution for Beta {
    type Value = f64;

    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.sampler.sample(rng)
    }

    fn logpdf(&self, value: &f64) -> f64 {
        if *value <= 0.0 || *value >= 1.0 {
            return f64::NEG_INFINITY;
        }
        (self.alpha - 1.0) * value.ln() + (self.beta - 1.0) * (1.0 - value).ln()
            + ln_gamma(self.alpha + self.beta)
            - ln_gamma(self.alpha)
            - ln_gamma(self.beta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_normal_logpdf_standard() {
        let d = Normal::new(0.0, 1.0).unwrap();
        // density of N(0,1) at 0 is 1/sqrt(2*pi)
        assert!((d.logpdf(&0.0) - (-0.918_938_533_204_672_7)).abs() < 1e-12);
    }

    #[test]
    fn test_normal_invalid_params() {
        assert!(Normal::new(0.0, 0.0).is_err());
        assert!(Normal::new(0.0, -1.0).is_err());
        assert!(Normal::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_normal_sample_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let d = Normal::new(3.0, 0.1).unwrap();
        for _ in 0..100 {
            let x = d.sample(&mut rng);
            assert!((x - 3.0).abs() < 1.0);
        }
    }

    #[test]
    fn test_uniform_logpdf() {
        let d = Uniform::new(0.0, 2.0).unwrap();
        assert!((d.logpdf(&0.5) - (-(2.0f64).ln())).abs() < 1e-12);
        assert_eq!(d.logpdf(&2.5), f64::NEG_INFINITY);
        assert_eq!(d.logpdf(&-0.1), f64::NEG_INFINITY);
    }

    #[test]
    fn test_gamma_logpdf_exponential_case() {
        // Gamma(1, rate) is Exponential(rate): logpdf = ln(rate) - rate * x
        let d = Gamma::new(1.0, 2.0).unwrap();
        assert!((d.logpdf(&1.5) - (2.0f64.ln() - 3.0)).abs() < 1e-9);
        assert_eq!(d.logpdf(&-1.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_beta_uniform_case() {
        // Beta(1, 1) is Uniform(0, 1): density 1 everywhere on the support
        let d = Beta::new(1.0, 1.0).unwrap();
        assert!(d.logpdf(&0.3).abs() < 1e-9);
        assert_eq!(d.logpdf(&1.2), f64::NEG_INFINITY);
    }

    #[test]
    fn test_beta_symmetric() {
        let d = Beta::new(2.0, 2.0).unwrap();
        assert!((d.logpdf(&0.25) - d.logpdf(&0.75)).abs() < 1e-10);
    }
}
