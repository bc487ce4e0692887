//! # gentrace
//!
//! A trace-based probabilistic programming runtime for Rust.
//!
//! Programs are modeled as *generative functions*: ordinary Rust closures
//! whose random decisions are recorded in a structured *trace* under stable
//! addresses. The generative function interface (`simulate` / `generate` /
//! `update`) carries exact score and importance-weight accounting, which is
//! what makes the inference algorithms on top of it sound:
//!
//! - **Importance sampling**: `generate` under observation constraints
//! - **Sequential Monte Carlo**: a particle filter with ESS-gated
//!   resampling and MH rejuvenation
//! - **Metropolis-Hastings**: single moves valid for any proposal, because
//!   `update` reports the exact score delta
//!
//! The [`Unfold`](gfi::Unfold) combinator builds chain models whose
//! per-step `update` cost is independent of chain length.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gentrace::prelude::*;
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//!
//! let model: DynGenFn<(), f64> = DynGenFn::new(|ctx, _| {
//!     let x: f64 = ctx.sample("x", &Normal::new(0.0, 1.0)?)?;
//!     let _z: f64 = ctx.sample("z", &Normal::new(x, 0.1)?)?;
//!     Ok(x)
//! });
//!
//! let obs = ChoiceMap::from_pairs(vec![(addr!("z"), ChoiceValue::F64(0.5))])?;
//! let (trace, weight) = model.generate(&mut rng, (), &obs)?;
//! ```

pub mod address;
pub mod choices;
pub mod diagnostics;
pub mod dist;
pub mod error;
pub mod gfi;
pub mod inference;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::addr;
    pub use crate::address::Address;
    pub use crate::choices::{ChoiceCompat, ChoiceEntry, ChoiceMap, ChoiceValue};
    pub use crate::diagnostics::{ess_from_log_weights, log_sum_exp, normalize_log_weights};
    pub use crate::dist::{
        Bernoulli, Beta, Categorical, Distribution, Gamma, Normal, Uniform,
    };
    pub use crate::error::{ChoiceError, GenError, GenResult, InferenceError, ModelError};
    pub use crate::gfi::{
        ArgDiff, DynGenFn, DynTrace, GenerativeFunction, RetDiff, Trace, TraceCtx, Unfold,
        UnfoldTrace, UnusedConstraintPolicy, UpdateOut,
    };
    pub use crate::inference::{
        metropolis_hastings, symmetric_random_walk, ParticleFilter, ParticleFilterConfig,
        ResamplingStrategy,
    };
}
