use itertools::Itertools;
use num_bigint::BigUint;
use rustc_hash::FxHashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use crate::config::StoreConfig;
use crate::events::CheckpointWritten;
use crate::PrimeError;

/// Scan the storage directory for `<prefix><index>.<ext>` files and return
/// the maximal consecutive run starting at index 1, ascending. A gap hides
/// everything above it: disjoint history cannot be verified, so it is not
/// trusted.
pub fn list_checkpoint_files(config: &StoreConfig) -> Result<Vec<(usize, PathBuf)>, PrimeError> {
    let mut by_index: FxHashMap<usize, PathBuf> = FxHashMap::default();

    if !config.dir.exists() {
        return Ok(Vec::new());
    }

    let suffix = format!(".{}", config.file_extension);
    for entry in fs::read_dir(&config.dir).map_err(PrimeError::Io)? {
        let entry = entry.map_err(PrimeError::Io)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = name.strip_suffix(&suffix) else {
            continue;
        };
        let Some(index_str) = stem.strip_prefix(&config.file_prefix) else {
            continue;
        };
        // Plain positive decimal only; a zero-padded name would alias a
        // real index.
        if index_str.is_empty()
            || index_str.starts_with('0')
            || !index_str.chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }
        if let Ok(index) = index_str.parse::<usize>() {
            by_index.insert(index, path);
        }
    }

    let mut files = Vec::new();
    let mut index = 1;
    while let Some(path) = by_index.remove(&index) {
        files.push((index, path));
        index += 1;
    }

    Ok(files)
}

/// Count the primes already present in a checkpoint file.
pub fn count_lines(path: &Path) -> Result<usize, PrimeError> {
    let text = fs::read_to_string(path).map_err(PrimeError::Io)?;
    Ok(text.lines().filter(|l| !l.trim().is_empty()).count())
}

/// Durable, ordered, chunked persistence of primes across fixed-capacity
/// checkpoint files.
///
/// The write cursor (current file index, lines already in it, total primes
/// persisted) lives in instance fields with no cross-run persistence beyond
/// the files themselves.
#[derive(Debug)]
pub struct ResultStore {
    config: StoreConfig,
    next_file_index: usize,
    lines_in_current: usize,
    total_written: usize,
    last_write: Instant,
}

impl ResultStore {
    /// Position the write cursor from the files already on disk. `start`
    /// seeds the elapsed baseline for the first write event.
    pub fn open(config: StoreConfig, start: Instant) -> Result<Self, PrimeError> {
        let files = list_checkpoint_files(&config)?;

        let next_file_index = match files.last() {
            None => 1,
            Some((index, path)) => {
                let lines = count_lines(path)?;
                if lines > config.capacity_per_file {
                    return Err(PrimeError::StorageCorruption {
                        index: *index,
                        path: path.clone(),
                        reason: format!(
                            "{} lines exceed capacity {}",
                            lines, config.capacity_per_file
                        ),
                    });
                }
                if lines == config.capacity_per_file {
                    index + 1
                } else {
                    *index
                }
            }
        };

        Self::open_at(config, next_file_index, start)
    }

    /// Position the write cursor at a specific file index, as reconstructed
    /// by the loader.
    pub fn open_at(
        config: StoreConfig,
        next_file_index: usize,
        start: Instant,
    ) -> Result<Self, PrimeError> {
        let path = config.file_path(next_file_index);
        let lines_in_current = if path.exists() { count_lines(&path)? } else { 0 };

        if lines_in_current > config.capacity_per_file {
            return Err(PrimeError::StorageCorruption {
                index: next_file_index,
                path,
                reason: format!(
                    "{} lines exceed capacity {}",
                    lines_in_current, config.capacity_per_file
                ),
            });
        }

        let total_written = (next_file_index - 1) * config.capacity_per_file + lines_in_current;

        Ok(Self {
            config,
            next_file_index,
            lines_in_current,
            total_written,
            last_write: start,
        })
    }

    pub fn next_file_index(&self) -> usize {
        self.next_file_index
    }

    pub fn total_written(&self) -> usize {
        self.total_written
    }

    /// Append an ascending batch, draining it across the current file and
    /// as many newly allocated files as needed. Returns one event per file
    /// write, produced only after that file's bytes are flushed.
    pub fn append(&mut self, primes: &[BigUint]) -> Result<Vec<CheckpointWritten>, PrimeError> {
        if !primes.iter().tuple_windows().all(|(a, b)| a < b) {
            return Err(PrimeError::InvalidInput(
                "append input must be strictly ascending".to_string(),
            ));
        }

        let capacity = self.config.capacity_per_file;
        let mut events = Vec::new();
        let mut remaining = primes;

        while !remaining.is_empty() {
            let index = self.next_file_index;
            let path = self.config.file_path(index);

            if self.lines_in_current >= capacity {
                return Err(PrimeError::StorageConflict {
                    index,
                    path,
                    reason: format!(
                        "overfilled file: {} lines with capacity {}",
                        self.lines_in_current, capacity
                    ),
                });
            }

            let file = if self.lines_in_current == 0 {
                // Fresh allocation: refuse to clobber unexpected content,
                // then truncate so stale bytes can never leak through.
                if path.exists() && fs::metadata(&path).map_err(PrimeError::Io)?.len() > 0 {
                    return Err(PrimeError::StorageConflict {
                        index,
                        path,
                        reason: "expected empty checkpoint file but found existing content"
                            .to_string(),
                    });
                }
                File::create(&path).map_err(PrimeError::Io)?
            } else {
                OpenOptions::new()
                    .append(true)
                    .open(&path)
                    .map_err(PrimeError::Io)?
            };

            let room = capacity - self.lines_in_current;
            let take = room.min(remaining.len());
            let (batch, rest) = remaining.split_at(take);
            remaining = rest;

            let mut writer = BufWriter::new(file);
            for prime in batch {
                writeln!(writer, "{}", prime).map_err(PrimeError::Io)?;
            }
            writer.flush().map_err(PrimeError::Io)?;

            let completed_at = SystemTime::now();
            let now = Instant::now();
            let elapsed = now.duration_since(self.last_write);
            self.last_write = now;

            let start_ordinal = self.total_written;
            self.total_written += take;
            events.push(CheckpointWritten {
                file_index: index,
                start_ordinal,
                end_ordinal: self.total_written - 1,
                completed_at,
                elapsed,
            });

            self.lines_in_current += take;
            if self.lines_in_current == capacity {
                self.next_file_index += 1;
                self.lines_in_current = 0;
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn primes(values: &[u32]) -> Vec<BigUint> {
        values.iter().map(|&v| BigUint::from(v)).collect()
    }

    fn read_file(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn test_list_empty_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 5);
        assert!(list_checkpoint_files(&config).unwrap().is_empty());
    }

    #[test]
    fn test_list_returns_consecutive_prefix_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 5);
        fs::write(config.file_path(1), "2\n").unwrap();
        fs::write(config.file_path(3), "5\n").unwrap();

        let files = list_checkpoint_files(&config).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, 1);
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 5);
        fs::write(config.file_path(1), "2\n").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "x").unwrap();
        fs::write(temp_dir.path().join("PrimeNumbersX.txt"), "x").unwrap();
        fs::write(temp_dir.path().join("PrimeNumbers01.txt"), "x").unwrap();
        fs::write(temp_dir.path().join("PrimeNumbers2.log"), "x").unwrap();

        let files = list_checkpoint_files(&config).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, 1);
    }

    #[test]
    fn test_append_single_batch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 5);
        let mut store = ResultStore::open(config.clone(), Instant::now()).unwrap();

        let events = store.append(&primes(&[2, 3, 5])).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].file_index, 1);
        assert_eq!(events[0].start_ordinal, 0);
        assert_eq!(events[0].end_ordinal, 2);
        assert_eq!(read_file(&config.file_path(1)), vec!["2", "3", "5"]);
        assert_eq!(store.next_file_index(), 1);
    }

    #[test]
    fn test_append_rolls_over_across_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 2);
        let mut store = ResultStore::open(config.clone(), Instant::now()).unwrap();

        let events = store.append(&primes(&[2, 3, 5, 7, 11])).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events.iter().map(|e| e.file_index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(
            events
                .iter()
                .map(|e| (e.start_ordinal, e.end_ordinal))
                .collect::<Vec<_>>(),
            vec![(0, 1), (2, 3), (4, 4)]
        );
        assert_eq!(read_file(&config.file_path(1)), vec!["2", "3"]);
        assert_eq!(read_file(&config.file_path(2)), vec!["5", "7"]);
        assert_eq!(read_file(&config.file_path(3)), vec!["11"]);
        assert_eq!(store.next_file_index(), 3);
    }

    #[test]
    fn test_complete_files_hold_exactly_capacity() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 3);
        let mut store = ResultStore::open(config.clone(), Instant::now()).unwrap();

        store.append(&primes(&[2, 3])).unwrap();
        store.append(&primes(&[5, 7, 11, 13])).unwrap();

        // 6 primes over capacity 3: both files complete, none partial.
        assert_eq!(read_file(&config.file_path(1)).len(), 3);
        assert_eq!(read_file(&config.file_path(2)).len(), 3);
        assert!(!config.file_path(3).exists());
    }

    #[test]
    fn test_open_resumes_partial_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 5);

        {
            let mut store = ResultStore::open(config.clone(), Instant::now()).unwrap();
            store.append(&primes(&[2, 3, 5])).unwrap();
        }

        let mut store = ResultStore::open(config.clone(), Instant::now()).unwrap();
        assert_eq!(store.total_written(), 3);
        let events = store.append(&primes(&[7, 11, 13])).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start_ordinal, 3);
        assert_eq!(events[0].end_ordinal, 4);
        assert_eq!(
            read_file(&config.file_path(1)),
            vec!["2", "3", "5", "7", "11"]
        );
        assert_eq!(read_file(&config.file_path(2)), vec!["13"]);
    }

    #[test]
    fn test_open_after_complete_file_points_past_it() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 2);
        fs::write(config.file_path(1), "2\n3\n").unwrap();

        let store = ResultStore::open(config, Instant::now()).unwrap();
        assert_eq!(store.next_file_index(), 2);
        assert_eq!(store.total_written(), 2);
    }

    #[test]
    fn test_open_rejects_overlong_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 2);
        fs::write(config.file_path(1), "2\n3\n5\n").unwrap();

        let result = ResultStore::open(config, Instant::now());
        match result {
            Err(PrimeError::StorageCorruption { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected StorageCorruption, got {:?}", other),
        }
    }

    #[test]
    fn test_rollover_refuses_stale_content_past_a_gap() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 2);
        fs::write(config.file_path(1), "2\n3\n").unwrap();
        // Index 3 is past a gap, so the listing ignores it, but rollover
        // will try to allocate it fresh once file 2 fills up.
        fs::write(config.file_path(3), "999\n").unwrap();

        let mut store = ResultStore::open(config.clone(), Instant::now()).unwrap();
        let result = store.append(&primes(&[5, 7, 11]));
        match result {
            Err(PrimeError::StorageConflict { index, .. }) => assert_eq!(index, 3),
            other => panic!("expected StorageConflict, got {:?}", other),
        }
        // The write that fit before the conflict landed.
        assert_eq!(read_file(&config.file_path(2)), vec!["5", "7"]);
    }

    #[test]
    fn test_append_refuses_overfilled_cursor() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 2);
        fs::write(config.file_path(1), "2\n3\n").unwrap();

        // Cursor forced onto a file that is already full.
        let mut store = ResultStore::open_at(config.clone(), 1, Instant::now()).unwrap();
        let result = store.append(&primes(&[5]));
        match result {
            Err(PrimeError::StorageConflict { index, reason, .. }) => {
                assert_eq!(index, 1);
                assert!(reason.contains("overfilled"));
            }
            other => panic!("expected StorageConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_append_rejects_unordered_input() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 5);
        let mut store = ResultStore::open(config, Instant::now()).unwrap();

        let result = store.append(&primes(&[3, 2]));
        assert!(matches!(result, Err(PrimeError::InvalidInput(_))));
    }

    #[test]
    fn test_append_empty_batch_is_a_no_op() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::custom(temp_dir.path().to_path_buf(), 5);
        let mut store = ResultStore::open(config.clone(), Instant::now()).unwrap();

        let events = store.append(&[]).unwrap();
        assert!(events.is_empty());
        assert!(!config.file_path(1).exists());
    }
}
