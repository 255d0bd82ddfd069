//! Generation counters and generation-tagged memoization.
//!
//! Each cached value records the generations of the inputs it was derived
//! from; bumping any input generation makes the cache miss on next read.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    pub fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Single-slot cache keyed by an input tag (typically a tuple of generations).
#[derive(Debug, Clone)]
pub struct Memo<K, V> {
    slot: Option<(K, V)>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<K: PartialEq, V> Memo<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    pub fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> &V {
        if self.slot.as_ref().is_some_and(|(cached, _)| *cached != key) {
            self.slot = None;
        }
        let (_, value) = self.slot.get_or_insert_with(|| (key, compute()));
        value
    }

    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        match &self.slot {
            Some((cached, value)) if cached == key => Some(value),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{Generation, Memo};

    #[test]
    fn memo_recomputes_only_when_generation_changes() {
        let mut data = Generation::default();
        let mut memo = Memo::new();
        let mut calls = 0;

        let _ = memo.get_or_compute(data, || {
            calls += 1;
            1
        });
        let _ = memo.get_or_compute(data, || {
            calls += 1;
            2
        });
        assert_eq!(calls, 1);

        data.bump();
        let value = *memo.get_or_compute(data, || {
            calls += 1;
            3
        });
        assert_eq!(calls, 2);
        assert_eq!(value, 3);
        assert!(memo.peek(&Generation::default()).is_none());
    }
}
