//! Per-thread dispatcher bookkeeping.

use std::collections::VecDeque;

use crate::{event::Event, id::Id, os::ThreadHandle, thread::pool::EventIdx};

/// Index of a [`ThreadContext`] in the kernel state.
pub type ThreadIdx = usize;

/// The common thread always owns the first context.
pub const COMMON_THREAD: ThreadIdx = 0;

/// Rendezvous between a thread blocked in a synchronous call and the thread
/// completing that call.
///
/// The slot is armed with the cookie of the outstanding request and filled at
/// most once with the completion event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSlot {
    cookie: u32,
    event: Option<Event>,
}

impl ResponseSlot {
    /// Arms a slot for the request identified by `cookie`.
    pub fn new(cookie: u32) -> Self {
        ResponseSlot {
            cookie,
            event: None,
        }
    }

    /// Cookie of the awaited completion.
    pub fn cookie(&self) -> u32 {
        self.cookie
    }

    /// Returns `true` if `event` is the awaited completion.
    pub fn awaits(&self, event: &Event) -> bool {
        event.is_response && event.cookie == self.cookie
    }

    /// Stores the completion. Returns `false` if the slot was already filled.
    pub fn fill(&mut self, event: Event) -> bool {
        if self.event.is_some() {
            return false;
        }
        self.event = Some(event);
        true
    }

    /// Returns `true` once the completion has been stored.
    pub fn is_filled(&self) -> bool {
        self.event.is_some()
    }

    /// Consumes the slot and returns the completion, if any.
    pub fn into_event(self) -> Option<Event> {
        self.event
    }
}

/// State of one schedulable kernel thread.
#[derive(Debug, Default)]
pub struct ThreadContext {
    /// Events waiting to be processed by this thread, head first
    pub event_queue: VecDeque<EventIdx>,
    /// The thread is blocked in a synchronous call
    pub waiting_event_processing_completion: bool,
    /// Completion slot of the synchronous call, if any
    pub response: Option<ResponseSlot>,
    /// OS thread running this context
    pub os_thread: Option<ThreadHandle>,
    /// Entity bound to the thread, `None` for the common thread
    pub id: Option<Id>,
}

impl ThreadContext {
    /// Creates a context for the entity `id`, or for the common thread.
    pub fn new(id: Option<Id>) -> Self {
        ThreadContext {
            id,
            ..Default::default()
        }
    }

    /// Returns `true` if `event` completes the synchronous call of this thread.
    pub fn is_wakeup_event(&self, event: &Event) -> bool {
        self.waiting_event_processing_completion
            && self
                .response
                .as_ref()
                .is_some_and(|slot| slot.awaits(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_is_write_once() {
        let mut slot = ResponseSlot::new(7);
        let first = Event {
            cookie: 7,
            is_response: true,
            ..Default::default()
        };
        let second = Event {
            cookie: 8,
            ..first
        };

        assert!(!slot.is_filled());
        assert!(slot.fill(first));
        assert!(!slot.fill(second));
        assert_eq!(slot.into_event(), Some(first));
    }

    #[test]
    fn test_wakeup_detection() {
        let mut ctx = ThreadContext::new(Some(Id::module(1)));
        let response = Event {
            cookie: 7,
            is_response: true,
            ..Default::default()
        };
        assert!(!ctx.is_wakeup_event(&response));

        ctx.response = Some(ResponseSlot::new(7));
        assert!(!ctx.is_wakeup_event(&response));

        ctx.waiting_event_processing_completion = true;
        assert!(ctx.is_wakeup_event(&response));

        let request = Event {
            is_response: false,
            ..response
        };
        assert!(!ctx.is_wakeup_event(&request));

        let other = Event {
            cookie: 6,
            ..response
        };
        assert!(!ctx.is_wakeup_event(&other));
    }
}
