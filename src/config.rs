use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::System;

use crate::PrimeError;

pub const DEFAULT_CAPACITY_PER_FILE: usize = 10_000;
pub const DEFAULT_FILE_PREFIX: &str = "PrimeNumbers";
pub const DEFAULT_FILE_EXTENSION: &str = "txt";

/// Configuration for the checkpoint file store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the checkpoint files.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// Primes per checkpoint file. A file is complete once it holds exactly
    /// this many lines.
    #[serde(default = "default_capacity")]
    pub capacity_per_file: usize,
    #[serde(default = "default_prefix")]
    pub file_prefix: String,
    /// Extension without the leading dot.
    #[serde(default = "default_extension")]
    pub file_extension: String,
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY_PER_FILE
}

fn default_prefix() -> String {
    DEFAULT_FILE_PREFIX.to_string()
}

fn default_extension() -> String {
    DEFAULT_FILE_EXTENSION.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            capacity_per_file: default_capacity(),
            file_prefix: default_prefix(),
            file_extension: default_extension(),
        }
    }
}

impl StoreConfig {
    /// Custom configuration for tests
    pub fn custom(dir: PathBuf, capacity_per_file: usize) -> Self {
        Self {
            dir,
            capacity_per_file,
            ..Self::default()
        }
    }

    /// Path of the checkpoint file with the given 1-based index.
    pub fn file_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!(
            "{}{}.{}",
            self.file_prefix, index, self.file_extension
        ))
    }
}

/// Element budget for the in-memory prime cache. A push beyond `max_primes`
/// is rejected deterministically instead of waiting for the allocator to
/// give out.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CacheBudget {
    pub max_primes: usize,
}

impl CacheBudget {
    /// Derive a budget from system RAM, targeting 75% of it.
    ///
    /// Estimate: ~64 bytes per cached prime (heap digits for the magnitudes
    /// this generator reaches, plus Vec slot overhead).
    pub fn calculate() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let total_memory = sys.total_memory() as usize;
        let target_memory = (total_memory * 75) / 100;

        let bytes_per_prime = 64;
        let max_primes = (target_memory / bytes_per_prime).max(1_000);

        println!(
            "[primegen] Total system RAM: {} MB, cache budget: {} primes",
            total_memory / 1_048_576,
            max_primes
        );

        Self { max_primes }
    }

    pub fn with_max_primes(max_primes: usize) -> Self {
        Self { max_primes }
    }

    /// Fixed budget for tests or when system info is unavailable.
    pub fn default_config() -> Self {
        Self {
            max_primes: 10_000_000,
        }
    }
}

/// Top-level configuration, loadable from a JSON file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "CacheBudget::default_config")]
    pub cache: CacheBudget,
    /// Worker threads for trial division fan-out.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            cache: CacheBudget::default_config(),
            workers: default_workers(),
        }
    }
}

impl GeneratorConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, PrimeError> {
        let text = fs::read_to_string(path).map_err(PrimeError::Io)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }
}
