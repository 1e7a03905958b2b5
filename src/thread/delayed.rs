//! Deferred responses, per originating entity.
//!
//! When a handler defers the response to a request, a copy of the response
//! shell is parked here under the handler's entity and the request cookie. The
//! handler later fetches the shell, fills it in and puts it back, at which
//! point the record leaves the registry and is delivered.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::{id::Id, thread::pool::EventIdx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    cookie: u32,
    event: EventIdx,
}

/// Registry of deferred responses.
#[derive(Debug, Default)]
pub struct DelayedResponses {
    lists: FxHashMap<Id, VecDeque<Pending>>,
}

impl DelayedResponses {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `entity` owes the response `event` for `cookie`.
    pub fn mark_pending(&mut self, entity: Id, cookie: u32, event: EventIdx) {
        self.lists
            .entry(entity)
            .or_default()
            .push_back(Pending { cookie, event });
    }

    /// Returns the pool record of the response `entity` owes for `cookie`.
    pub fn find(&self, entity: Id, cookie: u32) -> Option<EventIdx> {
        self.lists
            .get(&entity)?
            .iter()
            .find(|p| p.cookie == cookie)
            .map(|p| p.event)
    }

    /// Removes and returns the pool record of the response `entity` owes for `cookie`.
    pub fn take(&mut self, entity: Id, cookie: u32) -> Option<EventIdx> {
        let list = self.lists.get_mut(&entity)?;
        let pos = list.iter().position(|p| p.cookie == cookie)?;
        let pending = list.remove(pos)?;
        if list.is_empty() {
            self.lists.remove(&entity);
        }
        Some(pending.event)
    }

    /// Returns `true` when `entity` owes no response.
    pub fn is_empty(&self, entity: Id) -> bool {
        self.lists.get(&entity).map_or(true, VecDeque::is_empty)
    }

    /// Number of deferred responses across all entities.
    pub fn len(&self) -> usize {
        self.lists.values().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_lifecycle() {
        let mut delayed = DelayedResponses::new();
        let entity = Id::element(2, 0);
        assert!(delayed.is_empty(entity));

        delayed.mark_pending(entity, 4, 10);
        delayed.mark_pending(entity, 5, 11);
        delayed.mark_pending(Id::module(3), 4, 12);

        assert_eq!(delayed.len(), 3);
        assert_eq!(delayed.find(entity, 5), Some(11));
        assert_eq!(delayed.find(entity, 6), None);
        assert_eq!(delayed.find(Id::module(2), 4), None);

        assert_eq!(delayed.take(entity, 4), Some(10));
        assert_eq!(delayed.take(entity, 4), None);
        assert!(!delayed.is_empty(entity));
        assert_eq!(delayed.take(entity, 5), Some(11));
        assert!(delayed.is_empty(entity));
        assert_eq!(delayed.len(), 1);
    }
}
