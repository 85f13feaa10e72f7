use std::time::{Duration, SystemTime};

/// Emitted by the store after the bytes of one file write are flushed.
///
/// Ordinals are 0-based positions in the overall discovered prime sequence,
/// counting primes already on disk from earlier runs. `elapsed` measures
/// from the previous write, or from the run start for the first write.
#[derive(Clone, Debug)]
pub struct CheckpointWritten {
    pub file_index: usize,
    pub start_ordinal: usize,
    /// Inclusive.
    pub end_ordinal: usize,
    pub completed_at: SystemTime,
    pub elapsed: Duration,
}

/// Progress surface consumed by a presentation layer. All callbacks default
/// to no-ops and are invoked synchronously from the state-machine step that
/// produced them; `checkpoint_written` fires only after the bytes are
/// flushed.
pub trait ProgressListenerLike {
    fn load_started(&mut self, _total_files: usize) {}
    fn load_progress(&mut self, _file_ordinal: usize, _total_files: usize) {}
    fn load_finished(&mut self, _primes_loaded: usize, _files_loaded: usize) {}
    fn generation_started(&mut self) {}
    fn checkpoint_written(&mut self, _event: &CheckpointWritten) {}
}

/// Listener that discards everything.
pub struct NullListener;

impl ProgressListenerLike for NullListener {}
