use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use arc_swap::ArcSwap;

/// Versioned copy-on-write config holder.
///
/// Each execution reads one immutable snapshot via [`ConfigCell::load`];
/// a reload swaps in a new snapshot without blocking readers. Executions
/// already holding the old snapshot finish with it.
pub struct ConfigCell<T> {
    current: ArcSwap<T>,
    version: AtomicU64,
}

impl<T> ConfigCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(value),
            version: AtomicU64::new(0),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Replace the snapshot and return the new version.
    pub fn publish(&self, value: T) -> u64 {
        self.current.store(Arc::new(value));
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of values published since creation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl<T: Default> Default for ConfigCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for ConfigCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigCell")
            .field("version", &self.version())
            .field("current", &self.load())
            .finish()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_survive_publish() {
        let cell = ConfigCell::new("v1".to_string());
        let before = cell.load();

        assert_eq!(cell.publish("v2".to_string()), 1);
        assert_eq!(*before, "v1");
        assert_eq!(*cell.load(), "v2");
        assert_eq!(cell.version(), 1);
    }
}
