//! Chain combinator
//!
//! [`Unfold`] turns a per-step kernel `kernel(step, prev_state, params) ->
//! next_state` into a generative function over whole chains
//! `chain(num_steps, init_state, params) -> Vec<state>`. Each step's choices
//! are scoped under the 1-based step index.
//!
//! The point of the combinator is the cost model of `update`: extending a
//! chain by k steps re-invokes the kernel k times, independent of the chain
//! length, because untouched sub-traces are kept and their stored scores are
//! reused verbatim. Constraining a past step re-executes that step and only
//! as many successors as its state change actually reaches.

use std::collections::BTreeSet;
use std::fmt;

use rand::Rng;

use crate::address::Address;
use crate::choices::{ChoiceEntry, ChoiceMap};
use crate::error::{GenResult, ModelError};
use crate::gfi::{ArgDiff, GenerativeFunction, RetDiff, Trace, UpdateOut};

/// Chain generative function built from a per-step kernel.
///
/// The kernel's arguments are `(step_index, prev_state, params)` with the
/// step index starting at 1; its return value is the next state. The chain's
/// arguments are `(num_steps, init_state, params)` and its return value is
/// the full state sequence.
#[derive(Clone, Debug)]
pub struct Unfold<K> {
    kernel: K,
}

impl<K> Unfold<K> {
    /// Wrap a step kernel
    pub fn new(kernel: K) -> Self {
        Self { kernel }
    }
}

/// Trace of a chain: one kernel sub-trace per step
pub struct UnfoldTrace<K: GenerativeFunction> {
    args: K::Args,
    steps: Vec<K::TraceType>,
    states: Vec<K::Ret>,
    score: f64,
}

impl<K: GenerativeFunction> UnfoldTrace<K> {
    /// The per-step kernel sub-traces, in step order
    pub fn steps(&self) -> &[K::TraceType] {
        &self.steps
    }

    /// Number of steps in the chain
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }
}

impl<K: GenerativeFunction> fmt::Debug for UnfoldTrace<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnfoldTrace")
            .field("num_steps", &self.steps.len())
            .field("score", &self.score)
            .finish_non_exhaustive()
    }
}

impl<K: GenerativeFunction> Clone for UnfoldTrace<K>
where
    K::TraceType: Clone,
{
    fn clone(&self) -> Self {
        Self {
            args: self.args.clone(),
            steps: self.steps.clone(),
            states: self.states.clone(),
            score: self.score,
        }
    }
}

impl<K: GenerativeFunction> Trace for UnfoldTrace<K> {
    type Args = K::Args;
    type Ret = Vec<K::Ret>;

    fn args(&self) -> &K::Args {
        &self.args
    }

    fn retval(&self) -> &Vec<K::Ret> {
        &self.states
    }

    fn choices(&self) -> ChoiceMap {
        let mut map = ChoiceMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            let sub = step.choices();
            if !sub.is_empty() {
                map.set_sub(Address::Idx(i + 1), sub);
            }
        }
        map
    }

    fn score(&self) -> f64 {
        self.score
    }
}

/// Reject constraint entries that cannot belong to any step of an n-step chain
fn check_step_constraints(constraints: &ChoiceMap, num_steps: usize) -> GenResult<()> {
    for (key, entry) in constraints.top_level() {
        match (key, entry) {
            (Address::Idx(t), ChoiceEntry::Sub(_)) if *t >= 1 && *t <= num_steps => {}
            _ => return Err(ModelError::UnusedConstraint(key.clone()).into()),
        }
    }
    Ok(())
}

/// Step indices with constraint entries, in increasing order
fn constrained_steps(constraints: &ChoiceMap) -> BTreeSet<usize> {
    constraints
        .top_level()
        .filter_map(|(key, _)| match key {
            Address::Idx(t) => Some(*t),
            _ => None,
        })
        .collect()
}

impl<K, S, P> GenerativeFunction for Unfold<K>
where
    K: GenerativeFunction<Args = (usize, S, P), Ret = S>,
    K::TraceType: Clone,
    S: Clone + PartialEq,
    P: Clone,
{
    type Args = (usize, S, P);
    type Ret = Vec<S>;
    type TraceType = UnfoldTrace<K>;

    fn simulate<R: Rng>(&self, rng: &mut R, args: (usize, S, P)) -> GenResult<UnfoldTrace<K>> {
        let (num_steps, init, params) = args.clone();
        let mut steps = Vec::with_capacity(num_steps);
        let mut states = Vec::with_capacity(num_steps);
        let mut score = 0.0;
        let mut state = init;
        for t in 1..=num_steps {
            let sub = self.kernel.simulate(rng, (t, state, params.clone()))?;
            state = sub.retval().clone();
            score += sub.score();
            states.push(state.clone());
            steps.push(sub);
        }
        Ok(UnfoldTrace {
            args,
            steps,
            states,
            score,
        })
    }

    fn generate<R: Rng>(
        &self,
        rng: &mut R,
        args: (usize, S, P),
        constraints: &ChoiceMap,
    ) -> GenResult<(UnfoldTrace<K>, f64)> {
        let (num_steps, init, params) = args.clone();
        check_step_constraints(constraints, num_steps)?;

        let empty = ChoiceMap::new();
        let mut steps = Vec::with_capacity(num_steps);
        let mut states = Vec::with_capacity(num_steps);
        let mut score = 0.0;
        let mut weight = 0.0;
        let mut state = init;
        for t in 1..=num_steps {
            let sub_constraints = constraints.sub_at(&Address::Idx(t)).unwrap_or(&empty);
            let (sub, w) = self
                .kernel
                .generate(rng, (t, state, params.clone()), sub_constraints)?;
            state = sub.retval().clone();
            score += sub.score();
            weight += w;
            states.push(state.clone());
            steps.push(sub);
        }
        Ok((
            UnfoldTrace {
                args,
                steps,
                states,
                score,
            },
            weight,
        ))
    }

    fn update<R: Rng>(
        &self,
        rng: &mut R,
        trace: &UnfoldTrace<K>,
        args: (usize, S, P),
        argdiff: ArgDiff,
        constraints: &ChoiceMap,
    ) -> GenResult<UpdateOut<UnfoldTrace<K>>> {
        let (num_new, init_new, params_new) = args.clone();
        let num_old = trace.steps.len();
        let overlap = num_old.min(num_new);
        check_step_constraints(constraints, num_new)?;
        let touched = constrained_steps(constraints);

        // earliest existing step whose execution must be revisited
        let first_redo = match argdiff {
            ArgDiff::Unknown => 1,
            ArgDiff::NoChange | ArgDiff::Extend => touched
                .iter()
                .next()
                .copied()
                .filter(|t| *t <= overlap)
                .unwrap_or(overlap + 1),
        };

        let mut steps: Vec<K::TraceType> = trace.steps[..first_redo - 1].to_vec();
        let mut states: Vec<S> = trace.states[..first_redo - 1].to_vec();
        let mut score: f64 = steps.iter().map(|s| s.score()).sum();
        let mut weight = 0.0;
        let mut discard = ChoiceMap::new();
        let empty = ChoiceMap::new();

        let (_, init_old, _) = &trace.args;
        let mut state: S = if first_redo == 1 {
            init_new.clone()
        } else {
            states[first_redo - 2].clone()
        };

        let mut t = first_redo;
        while t <= overlap {
            let sub_constraints = constraints.sub_at(&Address::Idx(t)).unwrap_or(&empty);
            let old_input: &S = if t == 1 {
                init_old
            } else {
                &trace.states[t - 2]
            };
            let input_changed = state != *old_input;
            let sub_argdiff = if input_changed || argdiff == ArgDiff::Unknown {
                ArgDiff::Unknown
            } else {
                ArgDiff::NoChange
            };

            let out = self.kernel.update(
                rng,
                &trace.steps[t - 1],
                (t, state.clone(), params_new.clone()),
                sub_argdiff,
                sub_constraints,
            )?;
            state = out.trace.retval().clone();
            weight += out.weight;
            score += out.trace.score();
            if !out.discard.is_empty() {
                discard.insert_sub(Address::Idx(t), out.discard)?;
            }
            let output_unchanged = state == trace.states[t - 1];
            states.push(state.clone());
            steps.push(out.trace);
            t += 1;

            // once the state re-converges and no later step is constrained,
            // the remaining prefix is untouched and can be kept wholesale
            let later_constrained = touched.range(t..).next().map_or(false, |&s| s <= overlap);
            if output_unchanged && argdiff != ArgDiff::Unknown && !later_constrained {
                for u in t..=overlap {
                    score += trace.steps[u - 1].score();
                    steps.push(trace.steps[u - 1].clone());
                    states.push(trace.states[u - 1].clone());
                }
                state = trace.states[overlap - 1].clone();
                break;
            }
        }

        // newly appended steps
        for t in overlap + 1..=num_new {
            let sub_constraints = constraints.sub_at(&Address::Idx(t)).unwrap_or(&empty);
            let (sub, w) = self
                .kernel
                .generate(rng, (t, state.clone(), params_new.clone()), sub_constraints)?;
            state = sub.retval().clone();
            weight += w;
            score += sub.score();
            states.push(state.clone());
            steps.push(sub);
        }

        // steps removed by a shorter chain
        for t in num_new + 1..=num_old {
            let dropped = &trace.steps[t - 1];
            weight -= dropped.score();
            discard.insert_sub(Address::Idx(t), dropped.choices())?;
        }

        let retdiff = if num_new == num_old && states == trace.states {
            RetDiff::NoChange
        } else {
            RetDiff::Unknown
        };

        Ok(UpdateOut {
            trace: UnfoldTrace {
                args,
                steps,
                states,
                score,
            },
            weight,
            discard,
            retdiff,
        })
    }
}
