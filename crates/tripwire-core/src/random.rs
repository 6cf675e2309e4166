//! Integer rolls for counter increments.
//!
//! Worlds own a boxed [`RandomSource`]. [`SeededRandom`] wraps a seeded
//! [`StdRng`] so a world configured with the same seed replays the same
//! tallies.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tripwire_types::RollRange;

/// A source of inclusive integer rolls.
pub trait RandomSource: Send {
    /// Roll a value in `min..=max`. Implementations return `min` when the
    /// range is empty or degenerate.
    fn roll(&mut self, min: u32, max: u32) -> u32;

    /// Roll a configured [`RollRange`].
    fn roll_range(&mut self, range: RollRange) -> u32 {
        self.roll(range.min, range.max)
    }
}

/// Deterministic random source backed by [`StdRng`].
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    /// Create a source seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn roll(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        self.rng.random_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolls_stay_in_range() {
        let mut source = SeededRandom::new(42);
        for _ in 0..200 {
            let v = source.roll(3, 6);
            assert!((3..=6).contains(&v));
        }
    }

    #[test]
    fn degenerate_range_returns_min() {
        let mut source = SeededRandom::new(1);
        assert_eq!(source.roll(4, 4), 4);
        assert_eq!(source.roll(9, 2), 9);
        assert_eq!(source.roll_range(RollRange::fixed(7)), 7);
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SeededRandom::new(99);
        let mut b = SeededRandom::new(99);
        let left: Vec<u32> = (0..16).map(|_| a.roll(0, 1000)).collect();
        let right: Vec<u32> = (0..16).map(|_| b.roll(0, 1000)).collect();
        assert_eq!(left, right);
    }
}
