//! Ordering of style mutations.
//!
//! Every config change bumps a shared sequence id and pushes its mutation
//! onto a FIFO. When the style becomes ready, only the change whose captured
//! id is still current drains and applies the whole queue; earlier changes
//! find themselves stale and do nothing. A burst of changes therefore costs
//! one cancel, one apply and one style update.
//!
//! # Example
//!
//! ```
//! use mapcompose::sequencer::ConfigChangeSequencer;
//!
//! let sequencer = ConfigChangeSequencer::new();
//! let first = sequencer.enqueue(Box::new(|_style| {}));
//! let second = sequencer.enqueue(Box::new(|_style| {}));
//!
//! assert!(sequencer.try_drain(first).is_none());
//! assert_eq!(sequencer.try_drain(second).map(|q| q.len()), Some(2));
//! ```

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

use crate::style::Style;

/// Monotonic id of a config change.
pub type SequenceId = u64;

/// A deferred style mutation.
pub type ConfigMutation = Box<dyn FnOnce(&dyn Style) + Send>;

struct SequencerState {
    current: SequenceId,
    queue: VecDeque<ConfigMutation>,
}

/// Shared FIFO of pending mutations plus the current sequence id.
pub struct ConfigChangeSequencer {
    state: Mutex<SequencerState>,
}

impl ConfigChangeSequencer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SequencerState {
                current: 0,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Queue a mutation and bump the sequence id, returning the new id.
    pub fn enqueue(&self, mutation: ConfigMutation) -> SequenceId {
        let mut state = self.state.lock();
        state.queue.push_back(mutation);
        state.current += 1;
        state.current
    }

    /// Queue a mutation without bumping the sequence id.
    ///
    /// It will be applied by whichever change drains the queue next.
    pub fn stage(&self, mutation: ConfigMutation) {
        self.state.lock().queue.push_back(mutation);
    }

    /// Bump the sequence id without queueing anything.
    pub fn bump(&self) -> SequenceId {
        let mut state = self.state.lock();
        state.current += 1;
        state.current
    }

    /// Take the whole queue if `captured` is still the current id.
    ///
    /// Returns `None` when a later change superseded `captured`.
    pub fn try_drain(&self, captured: SequenceId) -> Option<Vec<ConfigMutation>> {
        let mut state = self.state.lock();
        if state.current != captured {
            return None;
        }
        Some(state.queue.drain(..).collect())
    }

    /// The most recently issued id.
    pub fn current(&self) -> SequenceId {
        self.state.lock().current
    }

    /// Number of mutations waiting to be applied.
    pub fn queued_len(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl Default for ConfigChangeSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConfigChangeSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConfigChangeSequencer")
            .field("current", &state.current)
            .field("queued", &state.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::standalone::StaticStyle;

    fn recording(log: &Arc<Mutex<Vec<u32>>>, value: u32) -> ConfigMutation {
        let log = Arc::clone(log);
        Box::new(move |_style| log.lock().push(value))
    }

    #[test]
    fn test_ids_are_monotonic() {
        let sequencer = ConfigChangeSequencer::new();
        let a = sequencer.enqueue(Box::new(|_| {}));
        let b = sequencer.enqueue(Box::new(|_| {}));
        assert!(b > a);
        assert_eq!(sequencer.current(), b);
    }

    #[test]
    fn test_only_latest_drains_in_fifo_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sequencer = ConfigChangeSequencer::new();
        let first = sequencer.enqueue(recording(&log, 1));
        let second = sequencer.enqueue(recording(&log, 2));
        let third = sequencer.enqueue(recording(&log, 3));

        assert!(sequencer.try_drain(first).is_none());
        assert!(sequencer.try_drain(second).is_none());

        let style = StaticStyle::new(Vec::new());
        for mutation in sequencer.try_drain(third).unwrap() {
            mutation(&style);
        }
        assert_eq!(*log.lock(), vec![1, 2, 3]);
        assert_eq!(sequencer.queued_len(), 0);

        // Draining again yields an empty batch.
        assert_eq!(sequencer.try_drain(third).map(|q| q.len()), Some(0));
    }

    #[test]
    fn test_staged_mutation_rides_with_next_change() {
        let sequencer = ConfigChangeSequencer::new();
        sequencer.stage(Box::new(|_| {}));
        assert_eq!(sequencer.current(), 0);
        assert_eq!(sequencer.queued_len(), 1);

        let id = sequencer.bump();
        assert_eq!(sequencer.try_drain(id).map(|q| q.len()), Some(1));
    }
}
