//! Single-slot overwriting register with a change-detection version.
//!
//! This is the slow stream's channel. A queue between preprocess and
//! inference would let frames pile up behind a slow model; the register lets
//! the producer always succeed immediately, and the consumer works on the
//! newest value, skipping everything that arrived while it was busy. Overload
//! shows up as detection staleness, not as queueing delay.

use parking_lot::Mutex;

struct Inner<T> {
    value: Option<T>,
    version: u64,
}

/// Newest-wins buffer shared by one producer and one consumer (the type
/// itself supports any number of either).
pub struct LatestStore<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for LatestStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestStore<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                value: None,
                version: 0,
            }),
        }
    }

    /// Replace the stored value and advance the version by exactly one.
    pub fn write(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.value = Some(value);
        inner.version += 1;
    }

    /// Version counter: 0 before the first write, then the total number of
    /// writes. Consumers poll this and read only when it advances.
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    pub fn has_value(&self) -> bool {
        self.inner.lock().value.is_some()
    }
}

impl<T: Clone> LatestStore<T> {
    /// Copy out the current value, if any. Does not consume the slot or
    /// advance the version; consecutive reads between writes are equal.
    pub fn read_latest(&self) -> Option<T> {
        self.inner.lock().value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_at_version_zero() {
        let store: LatestStore<u32> = LatestStore::new();
        assert_eq!(store.version(), 0);
        assert!(!store.has_value());
        assert_eq!(store.read_latest(), None);
    }

    #[test]
    fn version_counts_writes_and_reads_see_the_newest() {
        let store = LatestStore::new();
        for k in 1..=5u64 {
            store.write(k * 10);
            assert_eq!(store.version(), k);
        }
        assert_eq!(store.read_latest(), Some(50));
    }

    #[test]
    fn reads_do_not_disturb_the_slot() {
        let store = LatestStore::new();
        store.write("latest".to_string());
        let a = store.read_latest();
        let b = store.read_latest();
        assert_eq!(a, b);
        assert_eq!(store.version(), 1);
        assert!(store.has_value());
    }

    #[test]
    fn writer_overwrites_unread_values() {
        let store = LatestStore::new();
        store.write(1u32);
        store.write(2);
        store.write(3);
        assert_eq!(store.read_latest(), Some(3));
        assert_eq!(store.version(), 3);
    }
}
