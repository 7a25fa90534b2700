use log::{log_enabled, Level};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Simple scoped timer for tracing critical sections of a step.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            let elapsed = self.start.elapsed();
            log::trace!("end {} ({} µs)", self.label, elapsed.as_micros());
        }
    }
}

/// Latch for warnings that should only be logged the first time they trigger.
pub struct WarnOnce {
    fired: AtomicBool,
}

impl WarnOnce {
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Returns `true` exactly once.
    pub fn first(&self) -> bool {
        !self.fired.swap(true, Ordering::Relaxed)
    }
}

impl Default for WarnOnce {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_once_latches() {
        let latch = WarnOnce::new();
        assert!(latch.first());
        assert!(!latch.first());
    }
}
