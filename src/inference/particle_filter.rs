//! Particle filter controller
//!
//! Owns a fixed-size collection of weighted traces and drives them through
//! the classic sequential Monte Carlo loop: initialize from observations,
//! optionally resample when the effective sample size degrades, extend every
//! particle with `update`, and optionally rejuvenate particles with MH moves
//! between steps.
//!
//! Per-particle work inside one iteration is independent, so `step` and
//! `rejuvenate` can run under rayon when enabled in the config; iterations
//! themselves are strictly ordered. All particle updates are staged and
//! committed only when every particle succeeded, so a failed call never
//! leaves the filter holding a partially-updated set.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::choices::ChoiceMap;
use crate::diagnostics::{ess_from_log_weights, log_sum_exp, normalize_log_weights};
use crate::error::{GenResult, InferenceError};
use crate::gfi::{ArgDiff, GenerativeFunction, UpdateOut};
use crate::inference::mh::metropolis_hastings;

/// How resampling indices are drawn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResamplingStrategy {
    /// Independent categorical draws
    #[default]
    Multinomial,
    /// One uniform offset, stratified strides
    Systematic,
}

/// Configuration for the particle filter
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ParticleFilterConfig {
    /// Resample when the effective sample size drops below this value
    pub ess_threshold: f64,
    /// Resampling strategy
    pub resampling: ResamplingStrategy,
    /// Run per-particle updates and rejuvenation moves on the rayon pool
    pub parallel: bool,
}

impl Default for ParticleFilterConfig {
    fn default() -> Self {
        Self {
            ess_threshold: 0.0,
            resampling: ResamplingStrategy::default(),
            parallel: false,
        }
    }
}

impl ParticleFilterConfig {
    /// Create a config with the given ESS threshold
    pub fn new(ess_threshold: f64) -> Self {
        Self {
            ess_threshold,
            ..Default::default()
        }
    }

    /// Set the resampling strategy
    pub fn resampling(mut self, strategy: ResamplingStrategy) -> Self {
        self.resampling = strategy;
        self
    }

    /// Enable or disable parallel per-particle execution
    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }
}

/// A weighted particle collection for sequential Monte Carlo.
///
/// The particle count is fixed at initialization; resampling replaces
/// entries but never changes the count.
pub struct ParticleFilter<G: GenerativeFunction> {
    model: G,
    config: ParticleFilterConfig,
    args: G::Args,
    particles: Vec<G::TraceType>,
    log_weights: Vec<f64>,
    log_ml: f64,
}

impl<G: GenerativeFunction> fmt::Debug for ParticleFilter<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.particles.len())
            .field("log_weights", &self.log_weights)
            .finish_non_exhaustive()
    }
}

impl<G> ParticleFilter<G>
where
    G: GenerativeFunction,
    G::TraceType: Clone,
{
    /// Initialize `num_particles` particles from the initial observations.
    ///
    /// Each particle is drawn with `generate` and carries the returned
    /// importance weight as its initial log-weight.
    pub fn initialize<R: Rng>(
        rng: &mut R,
        model: G,
        config: ParticleFilterConfig,
        args: G::Args,
        observations: &ChoiceMap,
        num_particles: usize,
    ) -> GenResult<Self> {
        if num_particles == 0 {
            return Err(InferenceError::InvalidParticleCount(num_particles).into());
        }
        let mut particles = Vec::with_capacity(num_particles);
        let mut log_weights = Vec::with_capacity(num_particles);
        for _ in 0..num_particles {
            let (trace, weight) = model.generate(rng, args.clone(), observations)?;
            particles.push(trace);
            log_weights.push(weight);
        }
        Ok(Self {
            model,
            config,
            args,
            particles,
            log_weights,
            log_ml: 0.0,
        })
    }

    /// Number of particles
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// The current particle traces
    pub fn particles(&self) -> &[G::TraceType] {
        &self.particles
    }

    /// The current log-weights
    pub fn log_weights(&self) -> &[f64] {
        &self.log_weights
    }

    /// The model arguments the particles currently reflect
    pub fn args(&self) -> &G::Args {
        &self.args
    }

    /// Effective sample size of the current weight vector
    pub fn ess(&self) -> f64 {
        ess_from_log_weights(&self.log_weights)
    }

    /// Running estimate of the log marginal likelihood of all observations
    pub fn log_ml_estimate(&self) -> f64 {
        self.log_ml + log_sum_exp(&self.log_weights) - (self.num_particles() as f64).ln()
    }

    /// Resample if the effective sample size is below the configured
    /// threshold. Returns whether resampling happened.
    ///
    /// After resampling every log-weight is `log(1/N)`, so the ESS is
    /// exactly N again.
    pub fn maybe_resample<R: Rng>(&mut self, rng: &mut R) -> GenResult<bool> {
        self.check_weights()?;
        let ess = self.ess();
        if ess >= self.config.ess_threshold {
            return Ok(false);
        }
        let n = self.num_particles();
        log::debug!(
            "resampling {n} particles (ess {ess:.2} < threshold {:.2})",
            self.config.ess_threshold
        );

        let probs = normalize_log_weights(&self.log_weights);
        let indices = match self.config.resampling {
            ResamplingStrategy::Multinomial => multinomial_indices(rng, &probs, n),
            ResamplingStrategy::Systematic => systematic_indices(rng, &probs, n),
        };

        self.log_ml += log_sum_exp(&self.log_weights);
        self.particles = indices.iter().map(|&i| self.particles[i].clone()).collect();
        self.log_weights = vec![-(n as f64).ln(); n];
        Ok(true)
    }

    /// Draw `count` traces with probability proportional to weight.
    ///
    /// The returned traces are weight-free samples of the current posterior
    /// approximation and must not be reused for weighted computation.
    pub fn sample_unweighted<R: Rng>(
        &self,
        rng: &mut R,
        count: usize,
    ) -> GenResult<Vec<G::TraceType>> {
        self.check_weights()?;
        let probs = normalize_log_weights(&self.log_weights);
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let idx = categorical_index(rng, &probs);
            out.push(self.particles[idx].clone());
        }
        Ok(out)
    }

    fn check_weights(&self) -> GenResult<()> {
        if self.log_weights.iter().any(|w| w.is_nan()) {
            return Err(InferenceError::DegenerateWeights.into());
        }
        if self.log_weights.iter().all(|w| *w == f64::NEG_INFINITY) {
            return Err(InferenceError::FilterCollapse.into());
        }
        Ok(())
    }

    fn commit(&mut self, staged: Vec<UpdateOut<G::TraceType>>, new_args: G::Args) {
        for (i, out) in staged.into_iter().enumerate() {
            self.log_weights[i] += out.weight;
            self.particles[i] = out.trace;
        }
        self.args = new_args;
    }
}

impl<G> ParticleFilter<G>
where
    G: GenerativeFunction + Sync,
    G::Args: Send + Sync,
    G::TraceType: Clone + Send + Sync,
{
    /// Advance every particle to the new arguments and observations.
    ///
    /// Each particle's `update` weight is accumulated into its log-weight.
    /// Call [`ParticleFilter::maybe_resample`] first: resample-then-extend
    /// is the intended ordering.
    pub fn step<R: Rng>(
        &mut self,
        rng: &mut R,
        new_args: G::Args,
        argdiff: ArgDiff,
        observations: &ChoiceMap,
    ) -> GenResult<()> {
        let staged: Vec<UpdateOut<G::TraceType>> = if self.config.parallel {
            let seeds: Vec<u64> = (0..self.particles.len()).map(|_| rng.gen()).collect();
            let model = &self.model;
            let args = &new_args;
            self.particles
                .par_iter()
                .zip(seeds.into_par_iter())
                .map(|(trace, seed)| {
                    let mut prng = StdRng::seed_from_u64(seed);
                    model.update(&mut prng, trace, args.clone(), argdiff, observations)
                })
                .collect::<GenResult<Vec<_>>>()?
        } else {
            let mut staged = Vec::with_capacity(self.particles.len());
            for trace in &self.particles {
                staged.push(self.model.update(
                    rng,
                    trace,
                    new_args.clone(),
                    argdiff,
                    observations,
                )?);
            }
            staged
        };
        self.commit(staged, new_args);
        Ok(())
    }

    /// Apply one MH move to every particle, leaving weights untouched.
    ///
    /// Returns the number of accepted moves.
    pub fn rejuvenate<R, P, PA>(
        &mut self,
        rng: &mut R,
        proposal: &P,
        proposal_args: &PA,
    ) -> GenResult<usize>
    where
        R: Rng,
        P: GenerativeFunction<Args = (ChoiceMap, PA)> + Sync,
        PA: Clone + Sync,
    {
        let staged: Vec<(G::TraceType, bool)> = if self.config.parallel {
            let seeds: Vec<u64> = (0..self.particles.len()).map(|_| rng.gen()).collect();
            let model = &self.model;
            self.particles
                .par_iter()
                .zip(seeds.into_par_iter())
                .map(|(trace, seed)| {
                    let mut prng = StdRng::seed_from_u64(seed);
                    metropolis_hastings(&mut prng, model, trace.clone(), proposal, proposal_args)
                })
                .collect::<GenResult<Vec<_>>>()?
        } else {
            let mut staged = Vec::with_capacity(self.particles.len());
            for trace in &self.particles {
                staged.push(metropolis_hastings(
                    rng,
                    &self.model,
                    trace.clone(),
                    proposal,
                    proposal_args,
                )?);
            }
            staged
        };

        let mut accepted = 0usize;
        for (i, (trace, ok)) in staged.into_iter().enumerate() {
            if ok {
                accepted += 1;
            }
            self.particles[i] = trace;
        }
        Ok(accepted)
    }
}

fn categorical_index<R: Rng + ?Sized>(rng: &mut R, probs: &[f64]) -> usize {
    let u: f64 = rng.gen();
    let mut acc = 0.0;
    for (i, p) in probs.iter().enumerate() {
        acc += p;
        if u < acc {
            return i;
        }
    }
    probs.len() - 1
}

fn multinomial_indices<R: Rng>(rng: &mut R, probs: &[f64], count: usize) -> Vec<usize> {
    (0..count).map(|_| categorical_index(rng, probs)).collect()
}

fn systematic_indices<R: Rng>(rng: &mut R, probs: &[f64], count: usize) -> Vec<usize> {
    let n = probs.len();
    let mut cumulative = vec![0.0; n];
    let mut acc = 0.0;
    for (i, p) in probs.iter().enumerate() {
        acc += p;
        cumulative[i] = acc;
    }

    let offset: f64 = rng.gen::<f64>() / count as f64;
    let mut indices = Vec::with_capacity(count);
    let mut j = 0;
    for i in 0..count {
        let u = offset + i as f64 / count as f64;
        while j < n - 1 && cumulative[j] < u {
            j += 1;
        }
        indices.push(j);
    }
    indices
}
