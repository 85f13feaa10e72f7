use num_bigint::BigUint;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum PrimeError {
    /// Caller supplied an empty known-primes basis (or otherwise malformed
    /// input) where one is required.
    InvalidInput(String),
    /// A checkpoint file is provably inconsistent: too many lines, or an
    /// ordering/completeness violation.
    StorageCorruption {
        index: usize,
        path: PathBuf,
        reason: String,
    },
    /// A file expected to be empty or absent had content, or an append
    /// targeted an already-full file.
    StorageConflict {
        index: usize,
        path: PathBuf,
        reason: String,
    },
    /// The in-memory cache hit its configured budget. The only recoverable
    /// condition: the engine converts it into the overflow transition.
    CacheExhausted { len: usize },
    /// Disk-backed generation invoked while unimplemented.
    Unsupported(String),
    Io(std::io::Error),
    /// A checkpoint line failed to parse as a decimal integer.
    Parse {
        path: PathBuf,
        line: usize,
        text: String,
    },
    /// Outermost wrapper: the error plus the candidate that was in flight
    /// when it happened, for the caller's diagnostic log.
    Fatal {
        candidate: BigUint,
        source: Box<PrimeError>,
    },
}

impl PrimeError {
    /// Wrap an error with the in-flight candidate. Already-wrapped and
    /// cache-budget errors pass through untouched.
    pub fn fatal(candidate: &BigUint, source: PrimeError) -> PrimeError {
        match source {
            PrimeError::Fatal { .. } | PrimeError::CacheExhausted { .. } => source,
            other => PrimeError::Fatal {
                candidate: candidate.clone(),
                source: Box::new(other),
            },
        }
    }
}

impl fmt::Display for PrimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimeError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            PrimeError::StorageCorruption {
                index,
                path,
                reason,
            } => write!(
                f,
                "Storage corruption in checkpoint file {} ({}): {}",
                index,
                path.display(),
                reason
            ),
            PrimeError::StorageConflict {
                index,
                path,
                reason,
            } => write!(
                f,
                "Storage conflict on checkpoint file {} ({}): {}",
                index,
                path.display(),
                reason
            ),
            PrimeError::CacheExhausted { len } => {
                write!(f, "Prime cache budget exhausted at {} primes", len)
            }
            PrimeError::Unsupported(e) => write!(f, "Unsupported operation: {}", e),
            PrimeError::Io(e) => write!(f, "IO error: {}", e),
            PrimeError::Parse { path, line, text } => write!(
                f,
                "Parse error in {} at line {}: {:?} is not a decimal integer",
                path.display(),
                line,
                text
            ),
            PrimeError::Fatal { candidate, source } => {
                write!(f, "Fatal error at candidate {}: {}", candidate, source)
            }
        }
    }
}

impl std::error::Error for PrimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PrimeError::Io(e) => Some(e),
            PrimeError::Fatal { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PrimeError {
    fn from(err: std::io::Error) -> Self {
        PrimeError::Io(err)
    }
}

impl From<serde_json::Error> for PrimeError {
    fn from(err: serde_json::Error) -> Self {
        PrimeError::InvalidInput(format!("config: {}", err))
    }
}
