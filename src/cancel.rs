use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation capability. Polled by the engine once per outer
/// loop iteration and by the loader between files; never preemptive.
pub trait CancelLike {
    fn cancel_requested(&self) -> bool;
}

/// Cancellation source that never fires, for headless runs and tests.
pub struct NeverCancel;

impl CancelLike for NeverCancel {
    fn cancel_requested(&self) -> bool {
        false
    }
}

/// Shared flag set by an external input source (the binary wires it to a
/// keypress-watching thread).
#[derive(Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

impl CancelLike for CancelFlag {
    fn cancel_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_cancel() {
        assert!(!NeverCancel.cancel_requested());
    }

    #[test]
    fn test_flag_visible_through_clone() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        assert!(!observer.cancel_requested());
        flag.request();
        assert!(observer.cancel_requested());
    }
}
