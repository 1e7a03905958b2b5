//! Fixed-capacity arena of event records.
//!
//! Queues link events by [`EventIdx`] into this arena. The pool is sized once
//! and never grows: the free list is a FIFO of indices, released records join
//! its tail and acquired records come from its head.

use std::collections::VecDeque;

use log::error;

use crate::{event::Event, Error, Result};

/// Index of an event record in the [`EventPool`].
pub type EventIdx = usize;

/// Arena of reusable event records.
pub struct EventPool {
    events: Vec<Event>,
    free: VecDeque<EventIdx>,
}

impl EventPool {
    /// Creates a pool of `capacity` free records.
    pub fn new(capacity: usize) -> Self {
        EventPool {
            events: vec![Event::default(); capacity],
            free: (0..capacity).collect(),
        }
    }

    /// Takes the record at the head of the free list.
    ///
    /// # Errors
    /// Returns [`Error::NoMemory`] when every record is in use.
    pub fn acquire(&mut self) -> Result<EventIdx> {
        match self.free.pop_front() {
            Some(idx) => Ok(idx),
            None => {
                error!("event pool exhausted ({} records in use)", self.events.len());
                Err(Error::NoMemory)
            }
        }
    }

    /// Returns a record to the tail of the free list.
    pub fn release(&mut self, idx: EventIdx) {
        self.free.push_back(idx);
    }

    /// Acquires a record and copies `event` into it.
    ///
    /// # Errors
    /// Returns [`Error::NoMemory`] when every record is in use.
    pub fn duplicate(&mut self, event: &Event) -> Result<EventIdx> {
        let idx = self.acquire()?;
        self.events[idx] = *event;
        Ok(idx)
    }

    /// Returns the record at `idx`.
    pub fn get(&self, idx: EventIdx) -> &Event {
        &self.events[idx]
    }

    /// Returns the record at `idx` for modification.
    pub fn get_mut(&mut self, idx: EventIdx) -> &mut Event {
        &mut self.events[idx]
    }

    /// Total number of records.
    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    /// Number of records on the free list.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
