use num_bigint::BigUint;
use std::time::Instant;

use crate::cache::PrimeCache;
use crate::cancel::CancelLike;
use crate::config::{CacheBudget, StoreConfig};
use crate::events::ProgressListenerLike;
use crate::loader::load_existing_state;
use crate::primality::PrimalityTester;
use crate::store::ResultStore;
use crate::PrimeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Loading,
    MemoryGeneration,
    Overflowing,
    DiskGeneration,
    Stopped,
}

/// What a run accomplished before cancellation stopped it.
#[derive(Debug)]
pub struct RunSummary {
    pub primes_discovered: usize,
    pub primes_in_memory: usize,
    pub next_candidate: BigUint,
    pub aborted: bool,
}

/// Drives discovery: loads existing state, tests candidates against the
/// cache, and flushes checkpoint batches through the store.
///
/// Every failure except the cache-budget signal unwinds out of `run`
/// wrapped with the in-flight candidate; the budget signal alone becomes
/// the overflow transition.
pub struct GenerationEngine<C: CancelLike, L: ProgressListenerLike> {
    config: StoreConfig,
    budget: CacheBudget,
    tester: PrimalityTester,
    cancel: C,
    listener: L,
    state: EngineState,
}

impl<C: CancelLike, L: ProgressListenerLike> GenerationEngine<C, L> {
    pub fn new(
        config: StoreConfig,
        budget: CacheBudget,
        tester: PrimalityTester,
        cancel: C,
        listener: L,
    ) -> Self {
        Self {
            config,
            budget,
            tester,
            cancel,
            listener,
            state: EngineState::Loading,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn run(&mut self) -> Result<RunSummary, PrimeError> {
        let started = Instant::now();

        self.state = EngineState::Loading;
        let loaded = load_existing_state(&self.config, self.budget, &self.cancel, &mut self.listener)?;

        let mut cache = loaded.cache;
        let mut candidate = loaded.next_candidate;
        let loaded_count = cache.len();

        if loaded.aborted {
            self.state = EngineState::Stopped;
            return Ok(RunSummary {
                primes_discovered: 0,
                primes_in_memory: loaded_count,
                next_candidate: candidate,
                aborted: true,
            });
        }

        let mut store = ResultStore::open_at(self.config.clone(), loaded.next_file_index, started)
            .map_err(|e| PrimeError::fatal(&candidate, e))?;

        if loaded.memory_limit_reached {
            // Everything the loader saw is already checkpointed, so the
            // tail flush has nothing to do; generation goes straight to
            // the disk-backed path.
            return self.enter_disk_generation(candidate);
        }

        self.state = EngineState::MemoryGeneration;
        self.listener.generation_started();

        let mut pending: Vec<BigUint> = Vec::new();
        let mut discovered = 0usize;

        loop {
            // Iteration boundary: an in-flight test always completes, and
            // primes from a completed iteration are kept.
            if self.cancel.cancel_requested() {
                self.state = EngineState::Stopped;
                break;
            }

            let is_prime = self
                .tester
                .is_prime(cache.as_slice(), &candidate)
                .map_err(|e| PrimeError::fatal(&candidate, e))?;

            if is_prime {
                match cache.push(candidate.clone()) {
                    Ok(()) => {
                        discovered += 1;
                        pending.push(candidate.clone());
                        if pending.len() == self.config.capacity_per_file {
                            let events = store
                                .append(&pending)
                                .map_err(|e| PrimeError::fatal(&candidate, e))?;
                            for event in &events {
                                self.listener.checkpoint_written(event);
                            }
                            pending.clear();
                        }
                    }
                    Err(PrimeError::CacheExhausted { .. }) => {
                        return self.overflow(&mut store, &mut pending, candidate);
                    }
                    Err(other) => return Err(PrimeError::fatal(&candidate, other)),
                }
            }

            candidate += 1u32;
        }

        Ok(RunSummary {
            primes_discovered: discovered,
            primes_in_memory: cache.len(),
            next_candidate: candidate,
            aborted: true,
        })
    }

    /// The cache refused `overflow_candidate`. Flush the remainder since
    /// the last checkpoint, then the candidate itself: it passed the
    /// primality test in this same iteration, so persisting it without a
    /// second test never writes an untested value.
    fn overflow(
        &mut self,
        store: &mut ResultStore,
        pending: &mut Vec<BigUint>,
        overflow_candidate: BigUint,
    ) -> Result<RunSummary, PrimeError> {
        self.state = EngineState::Overflowing;

        if !pending.is_empty() {
            let events = store
                .append(pending)
                .map_err(|e| PrimeError::fatal(&overflow_candidate, e))?;
            for event in &events {
                self.listener.checkpoint_written(event);
            }
            pending.clear();
        }

        let tail = [overflow_candidate.clone()];
        let events = store
            .append(&tail)
            .map_err(|e| PrimeError::fatal(&overflow_candidate, e))?;
        for event in &events {
            self.listener.checkpoint_written(event);
        }

        self.enter_disk_generation(&overflow_candidate + 1u32)
    }

    /// Disk-backed trial division past the cache boundary is an open
    /// extension point; invoking it fails loudly instead of under-testing.
    fn enter_disk_generation(&mut self, candidate: BigUint) -> Result<RunSummary, PrimeError> {
        self.state = EngineState::DiskGeneration;
        Err(PrimeError::fatal(
            &candidate,
            PrimeError::Unsupported("disk-backed generation is not implemented".to_string()),
        ))
    }
}
