use fxhash::FxHashMap;

/// Occurrence counts of every position reached in one game, keyed by board hash.
#[derive(Clone, Debug, Default)]
pub struct PositionHistory {
    positions: FxHashMap<u64, u32>,
}

impl PositionHistory {
    pub fn new() -> Self {
        Self {
            positions: FxHashMap::default(),
        }
    }

    pub fn push(&mut self, hash: u64) {
        *self.positions.entry(hash).or_insert(0) += 1;
    }

    /// How many times this position has occurred, including the current one.
    pub fn occurrences(&self, hash: u64) -> u32 {
        self.positions.get(&hash).copied().unwrap_or(0)
    }

    pub fn is_fivefold_repetition(&self, hash: u64) -> bool {
        self.occurrences(hash) >= 5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_occurrences() {
        let mut history = PositionHistory::new();
        for _ in 0..4 {
            history.push(7);
            history.push(9);
        }
        assert_eq!(history.occurrences(7), 4);
        assert!(!history.is_fivefold_repetition(7));

        history.push(7);
        assert!(history.is_fivefold_repetition(7));
        assert_eq!(history.occurrences(3), 0);
    }
}
