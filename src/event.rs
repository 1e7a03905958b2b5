//! Event records routed through the dispatcher.
//!
//! An [`Event`] carries its addressing (`id`, `source_id`, `target_id`), the
//! correlation cookie assigned by the kernel when the event is handed off, the
//! dispatch flags and a small fixed-size parameter payload. Events are plain
//! values: the kernel copies them into its pool when they are queued and copies
//! them back out for handlers, so callers never share storage with the kernel.
//!
//! # Examples
//!
//! ```rust
//! use scpfwk::{Event, Id};
//!
//! let request = Event::new(Id::event(2, 0), Id::module(1), Id::element(2, 0))
//!     .with_param_u32(0, 0xdead_beef)
//!     .with_response_requested();
//!
//! let response = request.response_shell();
//! assert_eq!(response.source_id, Id::element(2, 0));
//! assert_eq!(response.target_id, Id::module(1));
//! assert_eq!(response.param_u32(0), Some(0xdead_beef));
//! ```

use crate::id::Id;

/// Size in bytes of the parameter payload carried by every event.
pub const EVENT_PARAMS_SIZE: usize = 16;

/// A dispatchable event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Event {
    /// Identifier of the event or notification kind
    pub id: Id,
    /// Entity that emitted the event
    pub source_id: Id,
    /// Entity the event is delivered to
    pub target_id: Id,
    /// Correlation value assigned when the event is handed to the kernel
    pub cookie: u32,
    /// The event answers an earlier request or is a notification
    pub is_response: bool,
    /// The source expects a response to this event
    pub response_requested: bool,
    /// The event completes a blocking call of its target thread
    pub is_thread_wakeup_event: bool,
    /// The response is deferred (handler side) or completes a deferred one (put side)
    pub is_delayed_response: bool,
    /// The event is a notification delivered to a subscriber
    pub is_notification: bool,
    /// Opaque parameters
    pub params: [u8; EVENT_PARAMS_SIZE],
}

impl Event {
    /// Creates an event with cleared flags and zeroed parameters.
    #[must_use]
    pub fn new(id: Id, source_id: Id, target_id: Id) -> Self {
        Event {
            id,
            source_id,
            target_id,
            ..Default::default()
        }
    }

    /// Replaces the parameter payload.
    #[must_use]
    pub fn with_params(mut self, params: [u8; EVENT_PARAMS_SIZE]) -> Self {
        self.params = params;
        self
    }

    /// Stores a little-endian `u32` at byte `offset` of the payload.
    #[must_use]
    pub fn with_param_u32(mut self, offset: usize, value: u32) -> Self {
        self.set_param_u32(offset, value);
        self
    }

    /// Marks the event as a request expecting a response.
    #[must_use]
    pub fn with_response_requested(mut self) -> Self {
        self.response_requested = true;
        self
    }

    /// Marks the event as a response.
    #[must_use]
    pub fn with_response(mut self) -> Self {
        self.is_response = true;
        self
    }

    /// Reads a little-endian `u32` at byte `offset` of the payload.
    ///
    /// Returns `None` when the value does not fit in the payload.
    #[must_use]
    pub fn param_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.params.get(offset..offset.checked_add(4)?)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(bytes);
        Some(u32::from_le_bytes(word))
    }

    /// Writes a little-endian `u32` at byte `offset` of the payload.
    ///
    /// Returns `false` and leaves the payload untouched when the value does not fit.
    pub fn set_param_u32(&mut self, offset: usize, value: u32) -> bool {
        let Some(end) = offset.checked_add(4) else {
            return false;
        };
        match self.params.get_mut(offset..end) {
            Some(bytes) => {
                bytes.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Builds the response a handler fills in for this event.
    ///
    /// The addressing is swapped, the cookie and parameters are kept and the
    /// response is not deferred until the handler says so.
    #[must_use]
    pub fn response_shell(&self) -> Event {
        Event {
            source_id: self.target_id,
            target_id: self.source_id,
            is_delayed_response: false,
            ..*self
        }
    }
}
