use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::Zero;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::PrimeError;

/// Needed-factor sets below this size are tested on the calling thread;
/// spawning a pool for a handful of divisions costs more than it saves.
const INLINE_THRESHOLD: usize = 64;

/// Trial-division primality tester over an ascending known-primes basis.
///
/// The basis must be gapless with respect to primality up to its last
/// element; the tester only verifies that the basis reaches far enough to
/// span every factor below the candidate's square root.
pub struct PrimalityTester {
    workers: usize,
}

impl PrimalityTester {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn is_prime(&self, known: &[BigUint], candidate: &BigUint) -> Result<bool, PrimeError> {
        let two = BigUint::from(2u32);
        if *candidate < two {
            return Ok(false);
        }
        if *candidate == two {
            return Ok(true);
        }
        if candidate.is_even() {
            return Ok(false);
        }
        if known.is_empty() {
            return Err(PrimeError::InvalidInput(format!(
                "cannot test {} against an empty known-primes basis",
                candidate
            )));
        }

        // First index whose prime squared reaches the candidate. The basis
        // is ascending so p*p is monotonic over it.
        let boundary = known.partition_point(|p| p * p < *candidate);

        if boundary == known.len() {
            // Even the largest known prime squared stays below the
            // candidate; factors above the basis cannot be ruled out.
            return Err(PrimeError::Unsupported(format!(
                "known primes end at {} which squared is below candidate {}; \
                 disk-backed trial division is not implemented",
                known[known.len() - 1],
                candidate
            )));
        }

        // Landing exactly on p*p means the candidate is that prime's
        // square; the single factor settles it.
        if &known[boundary] * &known[boundary] == *candidate {
            return Ok(false);
        }

        let needed = &known[..boundary];
        if self.workers == 1 || needed.len() < INLINE_THRESHOLD {
            return Ok(!needed.iter().any(|p| (candidate % p).is_zero()));
        }

        Ok(!self.divides_parallel(needed, candidate))
    }

    /// Fan the factor checks out across a bounded pool. One cooperative
    /// stop flag, one write-once found flag; a worker that finds a factor
    /// sets both and the rest stop at their next iteration.
    fn divides_parallel(&self, needed: &[BigUint], candidate: &BigUint) -> bool {
        let stop = AtomicBool::new(false);
        let found = AtomicBool::new(false);
        let chunk_len = needed.len().div_ceil(self.workers);

        thread::scope(|s| {
            let stop = &stop;
            let found = &found;
            for part in needed.chunks(chunk_len) {
                s.spawn(move || {
                    for p in part {
                        if stop.load(Ordering::Relaxed) {
                            break;
                        }
                        if (candidate % p).is_zero() {
                            found.store(true, Ordering::Relaxed);
                            stop.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                });
            }
        });

        found.load(Ordering::Relaxed)
    }
}
