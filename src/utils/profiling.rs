use std::time::{Duration, Instant};

/// Per-step timing and population counters, attached to the world.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhysicsProfiler {
    pub queue_flush_time: Duration,
    pub broad_phase_time: Duration,
    pub narrow_phase_time: Duration,
    pub island_time: Duration,
    pub solver_time: Duration,
    pub ccd_time: Duration,
    pub total_frame_time: Duration,

    pub body_count: usize,
    pub collider_count: usize,
    pub candidate_pair_count: usize,
    pub contact_count: usize,
    pub active_island_count: usize,
    pub sleeping_body_count: usize,
}

impl PhysicsProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Emits the collected numbers through the `log` facade at debug level.
    pub fn report(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let total_us = self.total_frame_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        let share = |d: Duration| (d.as_micros() as f32 / total_us) * 100.0;
        log::debug!(
            "physics step: bodies={} colliders={} pairs={} contacts={} islands={} sleeping={}",
            self.body_count,
            self.collider_count,
            self.candidate_pair_count,
            self.contact_count,
            self.active_island_count,
            self.sleeping_body_count
        );
        log::debug!(
            "physics step: total {:.2} ms | flush {:.1}% | broad {:.1}% | narrow {:.1}% | islands {:.1}% | solver {:.1}% | ccd {:.1}%",
            self.total_frame_time.as_secs_f32() * 1000.0,
            share(self.queue_flush_time),
            share(self.broad_phase_time),
            share(self.narrow_phase_time),
            share(self.island_time),
            share(self.solver_time),
            share(self.ccd_time)
        );
    }
}

/// Accumulates the lifetime of the guard into `output`.
pub struct ScopedTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
