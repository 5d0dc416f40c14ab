// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Sequence ids
//!
//! Monotonic id generators seeded by a shard value. Ids are `seed * SHIFT + n`, so two
//! generators seeded with different shards never hand out the same id as long as neither emits
//! more than `SHIFT` ids.
//!

use crate::Error;

use parking_lot::Mutex;

use std::sync::atomic::{AtomicU64, Ordering};

/// Distance between the id ranges of two consecutive seeds.
pub const SHIFT: u64 = 1_000_000;

/// Seeded, strictly increasing id generator.
#[derive(Debug, Default)]
pub struct SequenceId {
    seed: Mutex<u64>,
    current: AtomicU64,
}

impl SequenceId {
    /// Creates a generator with seed 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator starting at `seed * SHIFT`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Mutex::new(seed),
            current: AtomicU64::new(seed.saturating_mul(SHIFT)),
        }
    }

    /// Current seed.
    pub fn seed(&self) -> u64 {
        *self.seed.lock()
    }

    /// Last id handed out.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Moves the generator to a new shard.
    ///
    /// A lower seed is rejected. The counter never moves backwards: re-seeding to the current
    /// seed keeps the ids already issued.
    pub fn set_seed(&self, seed: u64) -> Result<(), Error> {
        let mut current_seed = self.seed.lock();
        if seed < *current_seed {
            return Err(Error::Sequence(format!(
                "seed {} is lower than the current seed {}",
                seed, *current_seed
            )));
        }
        *current_seed = seed;
        self.current
            .fetch_max(seed.saturating_mul(SHIFT), Ordering::AcqRel);
        Ok(())
    }

    /// Returns the next id.
    pub fn next_id(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{collections::HashSet, sync::Arc};

    #[test]
    fn test_ids_follow_seed() {
        let sequence = SequenceId::with_seed(3);
        assert_eq!(sequence.next_id(), 3 * SHIFT + 1);
        assert_eq!(sequence.next_id(), 3 * SHIFT + 2);
        assert_eq!(sequence.seed(), 3);
    }

    #[test]
    fn test_lower_seed_rejected() {
        let sequence = SequenceId::with_seed(5);
        assert!(matches!(sequence.set_seed(4), Err(Error::Sequence(_))));
        assert_eq!(sequence.seed(), 5);
    }

    #[test]
    fn test_same_seed_never_goes_back() {
        let sequence = SequenceId::with_seed(1);
        let first = sequence.next_id();
        let second = sequence.next_id();
        sequence.set_seed(1).unwrap();
        let third = sequence.next_id();
        assert!(first < second && second < third);

        sequence.set_seed(2).unwrap();
        assert_eq!(sequence.next_id(), 2 * SHIFT + 1);
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let sequence = Arc::new(SequenceId::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sequence = sequence.clone();
                std::thread::spawn(move || {
                    (0..1000).map(|_| sequence.next_id()).collect::<Vec<_>>()
                })
            })
            .collect();
        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 4000);
    }
}
