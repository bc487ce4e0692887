//! Primitive probability distributions
//!
//! Distributions are the leaves of generative functions: each exposes
//! `sample` and `logpdf`, and its values round-trip through [`ChoiceValue`]
//! via [`ChoiceCompat`]. Sampling is delegated to `rand_distr`; log-densities
//! are written out explicitly so scores and weights stay exact and never go
//! through a sampling path.

use rand::RngCore;

use crate::choices::ChoiceCompat;

mod continuous;
mod discrete;

pub use continuous::{Beta, Gamma, Normal, Uniform};
pub use discrete::{Bernoulli, Categorical};

/// A primitive probability distribution.
///
/// `logpdf` must return the exact log-density (or log-mass) of `value`,
/// returning `-inf` outside the support rather than clamping or erroring.
pub trait Distribution {
    /// The type of sampled values
    type Value: ChoiceCompat;

    /// Draw a value using the supplied generator
    fn sample(&self, rng: &mut dyn RngCore) -> Self::Value;

    /// Natural-log density (or mass) of `value`
    fn logpdf(&self, value: &Self::Value) -> f64;
}

/// Lanczos approximation of `ln Γ(x)`, g = 7, n = 9
pub(crate) fn ln_gamma(x: f64) -> f64 {
    use std::f64::consts::PI;

    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // reflection formula
        PI.ln() - (PI * x).sin().ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut acc = COEFFS[0];
        let t = x + 7.5;
        for (i, &c) in COEFFS.iter().enumerate().skip(1) {
            acc += c / (x + i as f64);
        }
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
    }
}
