//! Process-wide elapsed-time accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Accumulates wall time spent in work attempts across every task in the
/// graph.
///
/// Lives as long as the [`Engine`](super::Engine) that owns it (one pipeline
/// run); increments are atomic, so concurrent attempts never lose time. Hosts
/// read it to enforce an external pipeline time budget.
#[derive(Debug, Default)]
pub struct ElapsedCounter {
    nanos: AtomicU64,
}

impl ElapsedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, spent: Duration) {
        self.nanos
            .fetch_add(spent.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates() {
        let counter = ElapsedCounter::new();
        counter.add(Duration::from_millis(3));
        counter.add(Duration::from_millis(4));
        assert_eq!(counter.total(), Duration::from_millis(7));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let counter = std::sync::Arc::new(ElapsedCounter::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = std::sync::Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    c.add(Duration::from_micros(5));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.total(), Duration::from_micros(5 * 8 * 100));
    }
}
