//! Process-lifetime monotonic clock.

use std::time::Instant;

use crate::app::ports::Clock;

/// [`Clock`] backed by `std::time::Instant`, anchored at construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_goes_backwards() {
        let clock = SystemClock::new();
        let a = clock.elapsed_millis();
        let b = clock.elapsed_millis();
        assert!(b >= a);
    }
}
