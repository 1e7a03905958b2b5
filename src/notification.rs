//! Notifications.
//!
//! A notification is an event a module or element broadcasts to every entity
//! that subscribed to it. Subscriptions are keyed by the notification
//! identifier and the emitting entity; each subscriber receives its own copy of
//! the notification, delivered like any other event on the subscriber's thread.
//!
//! The number of subscriptions is bounded by
//! [`crate::KernelConfig::notification_count`].
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use scpfwk::prelude::*;
//! use scpfwk::os::host::{HostInterrupts, HostOs};
//!
//! struct Quiet;
//!
//! impl EventHandler for Quiet {
//!     fn process_event(&self, _: &Kernel, _: &Event, _: &mut Event) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let mut modules = ModuleRegistry::new();
//! let power = modules.register(ModuleDesc::new("power", Arc::new(Quiet)).with_notifications(1));
//! let clock = modules.register(ModuleDesc::new("clock", Arc::new(Quiet)));
//!
//! let os = Arc::new(HostOs::new());
//! let kernel = Kernel::init(KernelConfig::default(), modules, os.clone(), Arc::new(HostInterrupts::new()))?;
//!
//! let state_changed = Id::notification(0, 0);
//! kernel.subscribe(state_changed, power, clock)?;
//! assert_eq!(kernel.subscriber_count(state_changed, power), 1);
//! kernel.unsubscribe(state_changed, power, clock)?;
//! assert_eq!(kernel.subscriber_count(state_changed, power), 0);
//!
//! os.halt();
//! os.join()?;
//! # Ok::<(), scpfwk::Error>(())
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use log::{debug, warn};

use crate::{event::Event, id::Id, os::CriticalSection, thread::Kernel, Error, Result};

/// Subscription table shared by all kernel threads.
pub(crate) struct Subscriptions {
    /// Subscribers per (notification, source) pair, in subscription order
    table: DashMap<(Id, Id), Vec<Id>>,
    /// Maximum number of subscriptions
    capacity: usize,
    /// Subscriptions in use
    used: AtomicUsize,
}

impl Subscriptions {
    pub(crate) fn new(capacity: usize) -> Self {
        Subscriptions {
            table: DashMap::new(),
            capacity,
            used: AtomicUsize::new(0),
        }
    }

    fn insert(&self, notification: Id, source: Id, target: Id) -> Result<()> {
        let mut targets = self.table.entry((notification, source)).or_default();
        if targets.contains(&target) {
            return Err(Error::InvalidState(format!(
                "{target} already subscribed to {notification} from {source}"
            )));
        }

        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.capacity).then_some(used + 1)
            })
            .map_err(|_| Error::NoMemory)?;

        targets.push(target);
        Ok(())
    }

    fn remove(&self, notification: Id, source: Id, target: Id) -> Result<()> {
        let removed = self
            .table
            .get_mut(&(notification, source))
            .and_then(|mut targets| {
                let pos = targets.iter().position(|t| *t == target)?;
                Some(targets.remove(pos))
            });

        if removed.is_none() {
            return Err(Error::InvalidState(format!(
                "{target} is not subscribed to {notification} from {source}"
            )));
        }

        self.table
            .remove_if(&(notification, source), |_, targets| targets.is_empty());
        self.used.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    fn targets(&self, notification: Id, source: Id) -> Vec<Id> {
        self.table
            .get(&(notification, source))
            .map(|targets| targets.clone())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }
}

impl Kernel {
    fn check_subscription(&self, notification: Id, source: Id, target: Id) -> Result<()> {
        if !lock!(self.state).initialized {
            return Err(Error::NotInitialized);
        }
        if self.interrupts.in_interrupt() {
            return Err(Error::HandlerContext);
        }
        if !self.modules.is_valid_notification_id(notification)
            || !self.modules.is_valid_entity_id(source)
            || !self.modules.is_valid_entity_id(target)
            || !notification.same_module(&source)
        {
            return Err(param_error!(
                "invalid subscription of {} to {} from {}",
                target,
                notification,
                source
            ));
        }
        Ok(())
    }

    /// Subscribes `target` to the notification `notification` emitted by `source`.
    ///
    /// # Errors
    /// - [`Error::NotInitialized`] before [`Kernel::initialize`]
    /// - [`Error::HandlerContext`] from interrupt context
    /// - [`Error::InvalidParameter`] for unknown identifiers, or when the
    ///   notification is not owned by the module of `source`
    /// - [`Error::InvalidState`] if the subscription exists
    /// - [`Error::NoMemory`] when the subscription table is full
    pub fn subscribe(&self, notification: Id, source: Id, target: Id) -> Result<()> {
        self.check_subscription(notification, source, target)?;

        let _masked = CriticalSection::enter(self.interrupts.as_ref());
        self.subscriptions.insert(notification, source, target)?;
        debug!("{target} subscribed to {notification} from {source}");
        Ok(())
    }

    /// Removes a subscription made with [`Kernel::subscribe`].
    ///
    /// # Errors
    /// As [`Kernel::subscribe`], with [`Error::InvalidState`] if the
    /// subscription does not exist.
    pub fn unsubscribe(&self, notification: Id, source: Id, target: Id) -> Result<()> {
        self.check_subscription(notification, source, target)?;

        let _masked = CriticalSection::enter(self.interrupts.as_ref());
        self.subscriptions.remove(notification, source, target)
    }

    /// Number of entities subscribed to `notification` from `source`.
    pub fn subscriber_count(&self, notification: Id, source: Id) -> usize {
        self.subscriptions.targets(notification, source).len()
    }

    /// Number of subscriptions in use.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Sends `event` to every subscriber of its notification and source.
    ///
    /// From a handler, an invalid source is replaced by the entity the handler
    /// runs for. From interrupt context the source must be valid. Each copy is
    /// queued like an event put from the same context. Returns the number of
    /// subscribers the notification was queued for.
    ///
    /// # Errors
    /// - [`Error::NotInitialized`] before [`Kernel::initialize`]
    /// - [`Error::InvalidParameter`] for an invalid source or notification, or
    ///   when the notification is not owned by the module of the source
    pub fn notify(&self, event: &mut Event) -> Result<usize> {
        let in_isr = self.interrupts.in_interrupt();
        let current = {
            let state = lock!(self.state);
            if !state.initialized {
                return Err(Error::NotInitialized);
            }
            state.current_event
        };

        if in_isr {
            if !self.modules.is_valid_entity_id(event.source_id) {
                return Err(param_error!("invalid notification source {}", event.source_id));
            }
        } else if let Some(current) = current {
            if !self.modules.is_valid_entity_id(event.source_id) {
                event.source_id = current.target_id;
            }
        }

        if !self.modules.is_valid_notification_id(event.id)
            || !event.id.same_module(&event.source_id)
        {
            return Err(param_error!(
                "{} cannot notify {}",
                event.source_id,
                event.id
            ));
        }

        event.is_response = false;
        event.is_notification = true;
        event.is_delayed_response = false;

        let targets = self.subscriptions.targets(event.id, event.source_id);
        let mut state = lock!(self.state);
        let mut count = 0;

        for target in targets {
            let mut copy = Event {
                target_id: target,
                ..*event
            };
            let delivered = if in_isr {
                self.put_isr_event(&mut state, &copy)
            } else {
                state
                    .thread_of(&self.modules, target)
                    .and_then(|thread| state.enqueue(thread, &mut copy))
            };

            match delivered {
                Ok(()) => count += 1,
                Err(e) => warn!("cannot deliver {} to {target}: {e}", event.id),
            }
        }

        Ok(count)
    }
}
