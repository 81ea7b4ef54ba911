use std::sync::atomic::{AtomicU64, Ordering};

/// Source of write timestamps in fractional milliseconds
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock that never returns the same value twice
///
/// Two calls within the same microsecond are pushed apart by a thousandth
/// of a millisecond so that `lwt` ordering stays strict.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicU64,
}

const MIN_STEP_MS: f64 = 0.001;

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        let wall = chrono::Utc::now().timestamp_micros() as f64 / 1000.0;
        let mut current = self.last.load(Ordering::Acquire);
        loop {
            let last = f64::from_bits(current);
            let next = if wall > last { wall } else { last + MIN_STEP_MS };
            match self.last.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut previous = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > previous);
            previous = next;
        }
    }
}
