//! Direct interpreter for generative functions
//!
//! A [`DynGenFn`] wraps an ordinary Rust closure that makes labeled random
//! choices through a [`TraceCtx`]. Every `simulate`/`generate`/`update` call
//! re-executes the closure end to end; the context decides, per address,
//! whether the value is sampled fresh, read from a constraint, or reused
//! from a previous trace, and keeps the score and weight accounting exact.

use std::sync::Arc;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::choices::{ChoiceCompat, ChoiceMap};
use crate::dist::Distribution;
use crate::error::{ChoiceError, GenError, GenResult, ModelError};
use crate::gfi::{ArgDiff, GenerativeFunction, RetDiff, Trace, UpdateOut};

/// What to do when a constraint references an address the model never visits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnusedConstraintPolicy {
    /// Log a warning and continue
    Warn,
    /// Abort the call with [`ModelError::UnusedConstraint`]
    #[default]
    Fatal,
}

/// Execution mode of a tracing context
#[derive(Clone, Copy)]
enum Mode<'a> {
    Simulate,
    Generate {
        constraints: &'a ChoiceMap,
    },
    Update {
        prev: &'a ChoiceMap,
        constraints: &'a ChoiceMap,
    },
}

/// The tracing context handed to a model body.
///
/// Model code never constructs one; it receives `&mut TraceCtx` and calls
/// [`TraceCtx::sample`] for primitive choices and [`TraceCtx::trace_call`]
/// for nested generative functions.
pub struct TraceCtx<'a> {
    rng: &'a mut dyn RngCore,
    mode: Mode<'a>,
    choices: ChoiceMap,
    discard: ChoiceMap,
    score: f64,
    weight: f64,
    fresh: f64,
}

impl<'a> TraceCtx<'a> {
    fn new(rng: &'a mut dyn RngCore, mode: Mode<'a>) -> Self {
        Self {
            rng,
            mode,
            choices: ChoiceMap::new(),
            discard: ChoiceMap::new(),
            score: 0.0,
            weight: 0.0,
            fresh: 0.0,
        }
    }

    /// Make (or replay) a random choice at `addr` from `dist`.
    ///
    /// Binding the same address twice in one execution is a fatal
    /// [`ModelError::DuplicateAddress`].
    pub fn sample<D>(&mut self, addr: impl Into<Address>, dist: &D) -> GenResult<D::Value>
    where
        D: Distribution,
    {
        let addr = addr.into();
        if self.choices.has(&addr) {
            return Err(ModelError::DuplicateAddress(addr).into());
        }

        let (constraints, prev) = match self.mode {
            Mode::Simulate => (None, None),
            Mode::Generate { constraints } => (Some(constraints), None),
            Mode::Update { prev, constraints } => (Some(constraints), Some(prev)),
        };
        let constrained = constraints.map_or(false, |c| c.has(&addr));
        let reused = !constrained && prev.map_or(false, |p| p.has(&addr));

        let source = if constrained {
            constraints
        } else if reused {
            prev
        } else {
            None
        };
        let value: D::Value = match source {
            Some(map) => map.typed(&addr)?,
            None => dist.sample(&mut *self.rng),
        };

        let lp = dist.logpdf(&value);
        self.score += lp;
        match self.mode {
            Mode::Generate { .. } if constrained => self.weight += lp,
            Mode::Update { prev, .. } => {
                if constrained {
                    if let Some(old) = prev.get(&addr) {
                        self.discard.insert(addr.clone(), old.clone())?;
                    }
                } else if !reused {
                    self.fresh += lp;
                }
            }
            _ => {}
        }

        self.record(addr, value.clone().into_choice())?;
        Ok(value)
    }

    /// Invoke a nested generative function, scoping its choices under `addr`.
    ///
    /// Constraints and previous values addressed under `addr` are routed to
    /// the callee; its choices, score, and discard are folded back into this
    /// context.
    pub fn trace_call<A2, T2>(
        &mut self,
        addr: impl Into<Address>,
        gen_fn: &DynGenFn<A2, T2>,
        args: &A2,
    ) -> GenResult<T2>
    where
        A2: Clone,
        T2: Clone,
    {
        let addr = addr.into();
        if self.choices.has(&addr) || self.choices.sub_at(&addr).is_some() {
            return Err(ModelError::DuplicateAddress(addr).into());
        }

        let empty = ChoiceMap::new();
        let child_mode = match self.mode {
            Mode::Simulate => Mode::Simulate,
            Mode::Generate { constraints } => Mode::Generate {
                constraints: constraints.sub_at(&addr).unwrap_or(&empty),
            },
            Mode::Update { prev, constraints } => Mode::Update {
                prev: prev.sub_at(&addr).unwrap_or(&empty),
                constraints: constraints.sub_at(&addr).unwrap_or(&empty),
            },
        };

        let mut child = TraceCtx::new(&mut *self.rng, child_mode);
        let retval = (gen_fn.body)(&mut child, args)?;

        self.score += child.score;
        self.weight += child.weight;
        self.fresh += child.fresh;
        if !child.choices.is_empty() {
            self.choices.insert_sub(addr.clone(), child.choices)?;
        }
        if !child.discard.is_empty() {
            self.discard.insert_sub(addr, child.discard)?;
        }
        Ok(retval)
    }

    fn record(&mut self, addr: Address, value: crate::choices::ChoiceValue) -> GenResult<()> {
        self.choices.insert(addr, value).map_err(|e| match e {
            ChoiceError::AddressConflict(a) => GenError::from(ModelError::DuplicateAddress(a)),
            other => other.into(),
        })
    }
}

type ModelBody<A, T> = dyn Fn(&mut TraceCtx<'_>, &A) -> GenResult<T> + Send + Sync;

/// A generative function defined by a Rust closure.
///
/// The closure is re-executed in full on every interface call, which keeps
/// it maximally flexible: control flow, the set of visited addresses, and
/// nested calls may all depend on arguments and earlier choices.
pub struct DynGenFn<A, T> {
    body: Arc<ModelBody<A, T>>,
    unused_policy: UnusedConstraintPolicy,
}

impl<A, T> Clone for DynGenFn<A, T> {
    fn clone(&self) -> Self {
        Self {
            body: Arc::clone(&self.body),
            unused_policy: self.unused_policy,
        }
    }
}

impl<A, T> DynGenFn<A, T> {
    /// Wrap a model body
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut TraceCtx<'_>, &A) -> GenResult<T> + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(body),
            unused_policy: UnusedConstraintPolicy::default(),
        }
    }

    /// Select how unused constraints are reported
    pub fn with_unused_policy(mut self, policy: UnusedConstraintPolicy) -> Self {
        self.unused_policy = policy;
        self
    }
}

fn check_unused(
    constraints: &ChoiceMap,
    choices: &ChoiceMap,
    policy: UnusedConstraintPolicy,
) -> GenResult<()> {
    for (addr, _) in constraints.iter() {
        if !choices.has(&addr) {
            match policy {
                UnusedConstraintPolicy::Fatal => {
                    return Err(ModelError::UnusedConstraint(addr).into())
                }
                UnusedConstraintPolicy::Warn => {
                    log::warn!("constraint at {addr} was never visited by the model");
                }
            }
        }
    }
    Ok(())
}

/// Trace produced by the direct interpreter
#[derive(Clone, Debug)]
pub struct DynTrace<A, T> {
    args: A,
    choices: ChoiceMap,
    retval: T,
    score: f64,
}

impl<A, T> Trace for DynTrace<A, T> {
    type Args = A;
    type Ret = T;

    fn args(&self) -> &A {
        &self.args
    }

    fn retval(&self) -> &T {
        &self.retval
    }

    fn choices(&self) -> ChoiceMap {
        self.choices.clone()
    }

    fn score(&self) -> f64 {
        self.score
    }
}

impl<A, T> GenerativeFunction for DynGenFn<A, T>
where
    A: Clone,
    T: Clone,
{
    type Args = A;
    type Ret = T;
    type TraceType = DynTrace<A, T>;

    fn simulate<R: Rng>(&self, rng: &mut R, args: A) -> GenResult<DynTrace<A, T>> {
        let mut ctx = TraceCtx::new(rng, Mode::Simulate);
        let retval = (self.body)(&mut ctx, &args)?;
        Ok(DynTrace {
            args,
            choices: ctx.choices,
            retval,
            score: ctx.score,
        })
    }

    fn generate<R: Rng>(
        &self,
        rng: &mut R,
        args: A,
        constraints: &ChoiceMap,
    ) -> GenResult<(DynTrace<A, T>, f64)> {
        let mut ctx = TraceCtx::new(rng, Mode::Generate { constraints });
        let retval = (self.body)(&mut ctx, &args)?;
        check_unused(constraints, &ctx.choices, self.unused_policy)?;
        let trace = DynTrace {
            args,
            choices: ctx.choices,
            retval,
            score: ctx.score,
        };
        Ok((trace, ctx.weight))
    }

    fn update<R: Rng>(
        &self,
        rng: &mut R,
        trace: &DynTrace<A, T>,
        args: A,
        _argdiff: ArgDiff,
        constraints: &ChoiceMap,
    ) -> GenResult<UpdateOut<DynTrace<A, T>>> {
        let prev = &trace.choices;
        let mut ctx = TraceCtx::new(rng, Mode::Update { prev, constraints });
        let retval = (self.body)(&mut ctx, &args)?;
        check_unused(constraints, &ctx.choices, self.unused_policy)?;

        let TraceCtx {
            choices,
            mut discard,
            score,
            fresh,
            ..
        } = ctx;

        // previous addresses the new execution never reached
        for (addr, value) in prev.iter() {
            if !choices.has(&addr) {
                discard.insert(addr, value.clone())?;
            }
        }

        let weight = score - trace.score - fresh;
        Ok(UpdateOut {
            trace: DynTrace {
                args,
                choices,
                retval,
                score,
            },
            weight,
            discard,
            retdiff: RetDiff::Unknown,
        })
    }
}
