//! Append-only, ordered chat history.

use crate::event::{ChatEvent, LoggedEvent, Sequence};
use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// How much history the log keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
    #[default]
    Unbounded,
    /// Keep only the most recent N entries.
    Bounded(NonZeroUsize),
}

impl Retention {
    /// `0` means unbounded.
    pub fn from_max(max_history: usize) -> Self {
        NonZeroUsize::new(max_history)
            .map(Retention::Bounded)
            .unwrap_or(Retention::Unbounded)
    }
}

/// The message log. `append` is the only mutation.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: VecDeque<LoggedEvent>,
    next_seq: Sequence,
    retention: Retention,
}

impl MessageLog {
    pub fn new(retention: Retention) -> Self {
        Self {
            entries: VecDeque::new(),
            next_seq: 0,
            retention,
        }
    }

    /// Append an event and return its sequence number.
    ///
    /// Evicting old entries never renumbers the ones that remain.
    pub fn append(&mut self, event: ChatEvent) -> Sequence {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(LoggedEvent { seq, event });

        if let Retention::Bounded(max) = self.retention {
            while self.entries.len() > max.get() {
                self.entries.pop_front();
            }
        }
        seq
    }

    /// Point-in-time copy of the retained history, oldest first.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.entries.iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A frozen view of the log. Iterate it as many times as needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: Vec<LoggedEvent>,
}

impl Snapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, LoggedEvent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn events(&self) -> impl Iterator<Item = &ChatEvent> {
        self.entries.iter().map(|e| &e.event)
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a LoggedEvent;
    type IntoIter = std::slice::Iter<'a, LoggedEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
