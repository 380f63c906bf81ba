use std::time::Instant;

/// Kernel time source: a deterministic logical tick counter used to order
/// published events, plus a monotonic nanosecond reading used only for
/// latency instrumentation (never for ordering).
#[derive(Debug)]
pub struct KernelClock {
    tick: u64,
    origin: Instant,
}

impl KernelClock {
    pub fn new() -> Self {
        Self {
            tick: 0,
            origin: Instant::now(),
        }
    }

    /// Advance the logical clock and return the new timestamp.
    pub fn tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn now(&self) -> u64 {
        self.tick
    }

    /// Monotonic nanoseconds since the clock was created.
    pub fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

impl Default for KernelClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_clock_is_monotonic() {
        let mut clock = KernelClock::new();
        let first = clock.tick();
        let second = clock.tick();
        assert!(second > first);
        assert_eq!(clock.now(), second);
    }

    #[test]
    fn nanosecond_source_does_not_go_backwards() {
        let clock = KernelClock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }
}
