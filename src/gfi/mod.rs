//! Generative function interface
//!
//! A generative function defines a probability distribution over execution
//! traces. The interface has three required operations:
//!
//! - `simulate` runs the function forward, sampling every choice;
//! - `generate` runs it under partial constraints and reports an importance
//!   weight for the constrained choices;
//! - `update` re-executes an existing trace under new arguments and/or new
//!   constraints, reporting the exact score delta and the displaced values.
//!
//! Inference algorithms are written purely against this interface, so the
//! same Metropolis-Hastings and particle-filter code drives both the direct
//! interpreter ([`DynGenFn`]) and the chain combinator ([`Unfold`]).

use rand::Rng;

use crate::address::Address;
use crate::choices::{ChoiceCompat, ChoiceMap};
use crate::error::GenResult;

mod dynamic;
mod unfold;

pub use dynamic::{DynGenFn, DynTrace, TraceCtx, UnusedConstraintPolicy};
pub use unfold::{Unfold, UnfoldTrace};

/// Change hint for the arguments passed to `update`.
///
/// `Extend` promises that the previous arguments are a prefix of the new
/// ones (a chain grew; shared arguments and earlier inputs are untouched).
/// Implementations may exploit the hint but must stay correct if they
/// ignore it and re-execute everything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgDiff {
    /// Arguments are identical to the previous call
    NoChange,
    /// The previous arguments are a prefix of the new ones
    Extend,
    /// No information about what changed
    Unknown,
}

/// Change hint for the return value produced by `update`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetDiff {
    /// The return value is unchanged
    NoChange,
    /// No information about what changed
    Unknown,
}

/// Result of an `update` call, in canonical field order
#[derive(Debug)]
pub struct UpdateOut<T> {
    /// The new trace
    pub trace: T,
    /// `log p(t'; x') - log p(t; x)` restricted to changed terms
    pub weight: f64,
    /// Previous values at addresses that were overwritten or removed
    pub discard: ChoiceMap,
    /// Change hint for the return value
    pub retdiff: RetDiff,
}

/// A realized execution of a generative function
pub trait Trace {
    /// The argument tuple type
    type Args;
    /// The return value type
    type Ret;

    /// Arguments the function was executed with
    fn args(&self) -> &Self::Args;

    /// Return value of the execution
    fn retval(&self) -> &Self::Ret;

    /// The recorded random choices.
    ///
    /// Returns an owned map so implementations may assemble it on demand
    /// (the chain combinator nests per-step sub-maps lazily).
    fn choices(&self) -> ChoiceMap;

    /// Sum of log-densities of every recorded choice
    fn score(&self) -> f64;

    /// Convenience typed lookup into [`Trace::choices`]
    fn value<V: ChoiceCompat>(&self, addr: &Address) -> GenResult<V> {
        Ok(self.choices().typed(addr)?)
    }
}

/// A generative function: a program whose random choices are recorded under
/// stable addresses.
pub trait GenerativeFunction {
    /// The argument tuple type
    type Args: Clone;
    /// The return value type
    type Ret: Clone;
    /// The trace type produced by this function
    type TraceType: Trace<Args = Self::Args, Ret = Self::Ret>;

    /// Execute forward, sampling every choice fresh.
    ///
    /// The trace's score is the full joint log-probability of the sampled
    /// choice map; no importance weight is associated with simulation.
    fn simulate<R: Rng>(&self, rng: &mut R, args: Self::Args) -> GenResult<Self::TraceType>;

    /// Execute under constraints, sampling only unconstrained choices.
    ///
    /// Returns the trace together with the importance weight
    /// `log p(t; x) - log q(t; x, u)`, which telescopes to the sum of
    /// log-densities of the constrained choices.
    fn generate<R: Rng>(
        &self,
        rng: &mut R,
        args: Self::Args,
        constraints: &ChoiceMap,
    ) -> GenResult<(Self::TraceType, f64)>;

    /// Re-execute an existing trace under new arguments and constraints.
    ///
    /// Unconstrained addresses fall back to the previous trace's values
    /// instead of fresh samples. The returned weight is the exact score
    /// delta restricted to changed, added, and removed terms; the discard
    /// map holds every previous value that was overwritten or removed, so
    /// that applying the discard as constraints reverses the update.
    fn update<R: Rng>(
        &self,
        rng: &mut R,
        trace: &Self::TraceType,
        args: Self::Args,
        argdiff: ArgDiff,
        constraints: &ChoiceMap,
    ) -> GenResult<UpdateOut<Self::TraceType>>;

    /// Score-only query: log-density of a fully specified choice map.
    ///
    /// The map must constrain every address the execution visits; the
    /// returned weight then equals the trace score.
    fn assess<R: Rng>(
        &self,
        rng: &mut R,
        args: Self::Args,
        choices: &ChoiceMap,
    ) -> GenResult<(f64, Self::Ret)> {
        let (trace, weight) = self.generate(rng, args, choices)?;
        Ok((weight, trace.retval().clone()))
    }

    /// Sample a choice map and report the probability of proposing it
    fn propose<R: Rng>(
        &self,
        rng: &mut R,
        args: Self::Args,
    ) -> GenResult<(ChoiceMap, f64, Self::Ret)> {
        let trace = self.simulate(rng, args)?;
        Ok((trace.choices(), trace.score(), trace.retval().clone()))
    }
}
