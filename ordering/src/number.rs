use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Collision-resistant order numbers.
///
/// A bare clock reading collides when two submissions land in the same
/// millisecond, so the externally visible number combines the UTC
/// second, a process-wide monotonic sequence and a random suffix.
#[derive(Debug, Default)]
pub struct OrderNumberGenerator {
    sequence: AtomicU64,
}

impl OrderNumberGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, now: DateTime<Utc>) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) % 1_000_000;
        let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
        format!("{}{:06}{:04}", now.format("%Y%m%d%H%M%S"), seq, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn numbers_are_unique_within_one_instant() {
        let generator = OrderNumberGenerator::new();
        let now = Utc::now();
        let numbers: HashSet<String> = (0..10_000).map(|_| generator.next(now)).collect();
        assert_eq!(numbers.len(), 10_000);
    }

    #[test]
    fn numbers_embed_the_submission_second() {
        let generator = OrderNumberGenerator::new();
        let now = Utc::now();
        let number = generator.next(now);
        assert!(number.starts_with(&now.format("%Y%m%d%H%M%S").to_string()));
        assert_eq!(number.len(), 14 + 6 + 4);
    }
}
