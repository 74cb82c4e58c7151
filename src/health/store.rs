use crate::health::HealthState;
use std::sync::atomic::{AtomicU8, Ordering};

/// Process-wide cell holding the last published health state.
///
/// A single atomic word: safe under one writer per inbound screenshot and
/// any number of concurrent readers, with no lock scope beyond the cell
/// itself.
#[derive(Debug)]
pub struct HealthStateStore {
    cell: AtomicU8,
}

impl HealthStateStore {
    /// Create a store initialized to `Full`
    pub fn new() -> Self {
        Self::with_state(HealthState::Full)
    }

    pub fn with_state(initial: HealthState) -> Self {
        Self {
            cell: AtomicU8::new(initial as u8),
        }
    }

    /// Current state, without side effects
    pub fn get(&self) -> HealthState {
        HealthState::from_u8(self.cell.load(Ordering::Acquire))
    }

    /// Atomically replace the stored state only if it differs from the
    /// current value. Returns whether a change occurred, which callers use
    /// to suppress redundant broadcasts.
    pub fn compare_and_set(&self, new: HealthState) -> bool {
        let mut current = self.cell.load(Ordering::Acquire);
        loop {
            if current == new as u8 {
                return false;
            }
            match self.cell.compare_exchange_weak(
                current,
                new as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for HealthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_initial_state_is_full() {
        let store = HealthStateStore::new();
        assert_eq!(store.get(), HealthState::Full);
    }

    #[test]
    fn test_compare_and_set_reports_change_once() {
        let store = HealthStateStore::new();

        assert!(store.compare_and_set(HealthState::Critical));
        assert!(!store.compare_and_set(HealthState::Critical));
        assert_eq!(store.get(), HealthState::Critical);
    }

    #[test]
    fn test_get_has_no_side_effects() {
        let store = HealthStateStore::with_state(HealthState::Dead);
        assert_eq!(store.get(), HealthState::Dead);
        assert_eq!(store.get(), HealthState::Dead);
    }

    #[test]
    fn test_concurrent_writers_report_exactly_one_change() {
        let store = Arc::new(HealthStateStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.compare_and_set(HealthState::Half))
            })
            .collect();

        let changes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|changed| *changed)
            .count();

        assert_eq!(changes, 1);
        assert_eq!(store.get(), HealthState::Half);
    }
}
