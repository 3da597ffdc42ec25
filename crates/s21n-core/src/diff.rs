//! "Already seen" tracking.
//!
//! The diff itself is a pure function of the fetched events and the seen set;
//! [`DiffEngine`] adds the first-run suppression on top of it.

use std::collections::HashSet;

use crate::domain::{NotificationEvent, NotificationId};

/// Insertion-ordered set of notification ids. Ids are never removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeenSet {
    order: Vec<NotificationId>,
    index: HashSet<NotificationId>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.index.contains(id)
    }

    /// Returns `true` if the id was not present before.
    pub fn insert(&mut self, id: NotificationId) -> bool {
        if !self.index.insert(id.clone()) {
            return false;
        }
        self.order.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in the order they were first seen.
    pub fn iter(&self) -> impl Iterator<Item = &NotificationId> {
        self.order.iter()
    }
}

impl<I: Into<String>> FromIterator<I> for SeenSet {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        let mut set = SeenSet::new();
        for id in iter {
            set.insert(NotificationId(id.into()));
        }
        set
    }
}

/// Events whose id is not in `seen`, in the order received, plus `seen` extended
/// with every id from `current`.
///
/// An id repeated within `current` is reported once.
pub fn diff(current: Vec<NotificationEvent>, seen: SeenSet) -> (Vec<NotificationEvent>, SeenSet) {
    let mut updated = seen;
    let mut fresh = Vec::new();
    for event in current {
        if updated.insert(event.id.clone()) {
            fresh.push(event);
        }
    }
    (fresh, updated)
}

/// Stateful wrapper owning the seen set for one monitoring run.
#[derive(Debug)]
pub struct DiffEngine {
    seen: SeenSet,
    first_run: bool,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffEngine {
    pub fn new() -> Self {
        Self {
            seen: SeenSet::new(),
            first_run: true,
        }
    }

    /// Feed a fetched snapshot and get back the genuinely new events.
    ///
    /// The first snapshot only seeds the seen set (nothing is reported), even
    /// when it is empty.
    pub fn apply(&mut self, current: Vec<NotificationEvent>) -> Vec<NotificationEvent> {
        let seen = std::mem::take(&mut self.seen);
        let (fresh, updated) = diff(current, seen);
        self.seen = updated;

        if self.first_run {
            self.first_run = false;
            tracing::info!(seeded = self.seen.len(), "seeded seen set from first snapshot");
            return Vec::new();
        }
        fresh
    }

    pub fn is_first_run(&self) -> bool {
        self.first_run
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }
}
