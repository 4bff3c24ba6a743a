//! Seedable, parallel Monte Carlo trial runner.
//!
//! Both the permutation null and the sub-sample stability analysis are
//! batches of independent trials. This module runs such a batch on the rayon
//! pool with:
//!
//! - one independent `StdRng` per trial, derived from `(master_seed, index)`,
//!   so results do not depend on thread scheduling
//! - results returned in trial order
//! - all-or-nothing semantics: any failed trial (or an abort) fails the batch,
//!   and no partial result is ever returned

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::debug;

use crate::error::EngineError;

/// Cloneable abort signal shared with in-flight trials.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How many trials to run and how to seed them.
#[derive(Debug, Clone, Default)]
pub struct TrialPlan {
    pub trials: usize,
    /// Fixed master seed for reproducible runs; `None` draws one from the OS-seeded
    /// thread RNG.
    pub seed: Option<u64>,
    pub abort: Option<AbortHandle>,
}

impl TrialPlan {
    pub fn new(trials: usize, seed: Option<u64>) -> Self {
        Self {
            trials,
            seed,
            abort: None,
        }
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(abort);
        self
    }

    fn aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortHandle::is_aborted)
    }
}

/// SplitMix64 finalizer; decorrelates neighbouring trial indices.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// The RNG used by trial `index` of a batch seeded with `master`.
pub fn trial_rng(master: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(splitmix64(master ^ splitmix64(index as u64)))
}

/// Run `plan.trials` independent trials in parallel.
pub fn run_trials<T, F>(plan: &TrialPlan, trial: F) -> Result<Vec<T>, EngineError>
where
    T: Send,
    F: Fn(usize, &mut StdRng) -> Result<T, EngineError> + Sync,
{
    if plan.trials == 0 {
        return Err(EngineError::invalid("trial count must be > 0"));
    }
    let master = plan.seed.unwrap_or_else(rand::random);

    let results: Vec<T> = (0..plan.trials)
        .into_par_iter()
        .map(|i| {
            if plan.aborted() {
                return Err(EngineError::Aborted);
            }
            let mut rng = trial_rng(master, i);
            trial(i, &mut rng)
        })
        .collect::<Result<Vec<T>, EngineError>>()?;

    // A late abort still invalidates the batch.
    if plan.aborted() {
        return Err(EngineError::Aborted);
    }

    debug!(trials = plan.trials, seeded = plan.seed.is_some(), "trial batch complete");
    Ok(results)
}
