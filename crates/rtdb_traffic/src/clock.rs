use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ClockError;

/// Server-vs-local clock skew in milliseconds, as last reported by the stream.
///
/// Clones share one value. Each [`crate::Collector`] owns its own handle, so two collectors in
/// one process never see each other's offsets.
#[derive(Debug, Clone, Default)]
pub struct ClockOffset {
    millis: Arc<AtomicI64>,
}

impl ClockOffset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> i64 {
        self.millis.load(Ordering::Relaxed)
    }

    /// Overwrites the offset. Offsets are never accumulated.
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::Relaxed);
    }

    /// Server-adjusted Unix time in fractional seconds for a local wall-clock reading.
    pub fn adjusted_seconds(&self, local_unix_millis: i64) -> f64 {
        local_unix_millis.saturating_add(self.get()) as f64 / 1000.0
    }
}

pub(crate) fn unix_millis_now() -> Result<i64, ClockError> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| ClockError::BeforeEpoch {
            behind: err.duration(),
        })?;
    i64::try_from(since_epoch.as_millis()).map_err(|_| ClockError::OutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_overwritten_and_shared_by_clones() {
        let offset = ClockOffset::new();
        let shared = offset.clone();

        offset.set(250);
        offset.set(-40);

        assert_eq!(shared.get(), -40);
        assert_eq!(shared.adjusted_seconds(10_040), 10.0);
    }

    #[test]
    fn independent_offsets_do_not_interfere() {
        let a = ClockOffset::new();
        let b = ClockOffset::new();
        a.set(1_000);
        assert_eq!(b.get(), 0);
    }

    #[test]
    fn adjusted_seconds_keeps_fractions() {
        let offset = ClockOffset::new();
        offset.set(5);
        assert_eq!(offset.adjusted_seconds(1_500), 1.505);
    }
}
