use num_bigint::BigUint;
use std::fs;
use std::path::PathBuf;

use crate::cache::PrimeCache;
use crate::cancel::CancelLike;
use crate::config::{CacheBudget, StoreConfig};
use crate::events::ProgressListenerLike;
use crate::store;
use crate::PrimeError;

/// Generation state reconstructed from the checkpoint files at startup.
#[derive(Debug)]
pub struct LoadedState {
    pub cache: PrimeCache,
    /// Next integer to test.
    pub next_candidate: BigUint,
    /// The cache budget ran out while replaying; the cache holds a prefix
    /// of the on-disk sequence and generation must go disk-backed.
    pub memory_limit_reached: bool,
    /// Index of the file with room for more primes.
    pub next_file_index: usize,
    /// Cancellation observed mid-load; the caller must not proceed to
    /// generation.
    pub aborted: bool,
    pub files_loaded: usize,
}

/// Replay the trusted checkpoint files into a fresh cache and compute where
/// generation resumes. Files are trusted once structurally validated; no
/// primality re-verification.
pub fn load_existing_state<C: CancelLike, L: ProgressListenerLike>(
    config: &StoreConfig,
    budget: CacheBudget,
    cancel: &C,
    listener: &mut L,
) -> Result<LoadedState, PrimeError> {
    let files = store::list_checkpoint_files(config)?;
    let total = files.len();
    listener.load_started(total);

    let mut cache = PrimeCache::with_budget(budget);
    let mut last_seen: Option<BigUint> = None;
    let mut memory_limit_reached = false;
    let mut aborted = false;
    let mut files_loaded = 0usize;
    let mut highest_processed: Option<(usize, usize)> = None;
    let mut stopped_at_empty: Option<usize> = None;

    for (ordinal, (index, path)) in files.iter().enumerate() {
        listener.load_progress(ordinal + 1, total);

        let text = fs::read_to_string(path).map_err(PrimeError::Io)?;
        let line_count = text.lines().filter(|l| !l.trim().is_empty()).count();

        if line_count == 0 {
            // A prime was expected here. Abnormal but not fatal: keep the
            // state accumulated so far and let generation refill this file.
            stopped_at_empty = Some(*index);
            break;
        }
        if line_count > config.capacity_per_file {
            return Err(PrimeError::StorageCorruption {
                index: *index,
                path: path.clone(),
                reason: format!(
                    "{} lines exceed capacity {}",
                    line_count, config.capacity_per_file
                ),
            });
        }
        if ordinal + 1 < total && line_count < config.capacity_per_file {
            return Err(PrimeError::StorageCorruption {
                index: *index,
                path: path.clone(),
                reason: format!(
                    "completeness violated: only the highest-indexed file may be \
                     partial, found {} of {} lines",
                    line_count, config.capacity_per_file
                ),
            });
        }

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let value: BigUint = line.parse().map_err(|_| PrimeError::Parse {
                path: path.clone(),
                line: line_no + 1,
                text: line.to_string(),
            })?;
            if let Some(prev) = &last_seen {
                if *prev >= value {
                    return Err(PrimeError::StorageCorruption {
                        index: *index,
                        path: path.clone(),
                        reason: format!("ascending order violated: {} follows {}", value, prev),
                    });
                }
            }
            if !memory_limit_reached {
                match cache.push(value.clone()) {
                    Ok(()) => {}
                    Err(PrimeError::CacheExhausted { .. }) => {
                        // The one expected failure: remember it and keep
                        // validating the remaining lines without caching.
                        memory_limit_reached = true;
                    }
                    Err(other) => return Err(other),
                }
            }
            last_seen = Some(value);
        }

        files_loaded += 1;
        highest_processed = Some((*index, line_count));

        if cancel.cancel_requested() {
            aborted = true;
            break;
        }
    }

    let next_file_index = match (stopped_at_empty, highest_processed) {
        (Some(index), _) => index,
        (None, Some((index, count))) => {
            if count < config.capacity_per_file {
                index
            } else {
                index + 1
            }
        }
        (None, None) => 1,
    };

    let incremental_candidate = match cache.last() {
        Some(last) => last + 1u32,
        None => BigUint::from(2u32),
    };

    let next_candidate = if memory_limit_reached && !aborted {
        recover_overflow_candidate(&files, &incremental_candidate)?
    } else {
        incremental_candidate
    };

    if !aborted {
        listener.load_finished(cache.len(), files_loaded);
    }

    Ok(LoadedState {
        cache,
        next_candidate,
        memory_limit_reached,
        next_file_index,
        aborted,
        files_loaded,
    })
}

/// The cache could not hold the whole on-disk sequence, so the resume point
/// comes from the final line of the last non-empty file: that prime plus
/// one. It can never be below the candidate derived from the cached stream;
/// if it is, the files are inconsistent.
fn recover_overflow_candidate(
    files: &[(usize, PathBuf)],
    incremental_candidate: &BigUint,
) -> Result<BigUint, PrimeError> {
    for (index, path) in files.iter().rev() {
        let text = fs::read_to_string(path).map_err(PrimeError::Io)?;
        let Some(line) = text.lines().rev().map(str::trim).find(|l| !l.is_empty()) else {
            continue;
        };
        let final_prime: BigUint = line.parse().map_err(|_| PrimeError::Parse {
            path: path.clone(),
            line: text.lines().count(),
            text: line.to_string(),
        })?;
        let recovered = final_prime + 1u32;
        if recovered < *incremental_candidate {
            return Err(PrimeError::StorageCorruption {
                index: *index,
                path: path.clone(),
                reason: format!(
                    "ascending order or completeness violated: final prime {} is below \
                     the {} already replayed",
                    line, incremental_candidate
                ),
            });
        }
        return Ok(recovered);
    }
    Ok(incremental_candidate.clone())
}
