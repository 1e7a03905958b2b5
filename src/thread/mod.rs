//! Cooperative multi-threaded event dispatch.
//!
//! The [`Kernel`] routes events between modules running on a set of kernel
//! threads. Handlers run to completion, and at most one thread processes an
//! event at any time: a thread that finishes an event hands the baton to the
//! head of the ready queue, or back to the common thread when nothing is
//! ready.
//!
//! # Threads
//!
//! - The **common thread** is created by [`Kernel::initialize`]. It drains the
//!   interrupt inbox and runs the events of every entity without a thread of
//!   its own.
//! - **Worker threads** are created with [`Kernel::create_thread`] for a module
//!   or an element. Events for an element run on the element thread, then on
//!   the module thread, then on the common thread.
//!
//! # Requests and Responses
//!
//! An event with `response_requested` is answered by the dispatcher once its
//! handler returns, using the response the handler filled in. A handler may
//! instead defer the response and complete it later with
//! [`Kernel::get_delayed_response`] and [`Kernel::put_event`].
//!
//! A worker handler can also block on a request with
//! [`Kernel::put_event_and_wait`]. The thread stays out of the ready queue
//! until the response arrives, and the response is delivered ahead of any other
//! event queued for it.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use scpfwk::prelude::*;
//! use scpfwk::os::host::{HostInterrupts, HostOs};
//!
//! struct Sensor;
//!
//! impl EventHandler for Sensor {
//!     fn process_event(&self, _: &Kernel, event: &Event, _: &mut Event) -> Result<()> {
//!         assert_eq!(event.param_u32(0), Some(42));
//!         Ok(())
//!     }
//! }
//!
//! let mut modules = ModuleRegistry::new();
//! let sensor = modules.register(ModuleDesc::new("sensor", Arc::new(Sensor)).with_events(1));
//!
//! let os = Arc::new(HostOs::new());
//! let interrupts = Arc::new(HostInterrupts::new());
//! let kernel = Kernel::init(KernelConfig::default(), modules, os.clone(), interrupts.clone())?;
//! kernel.create_thread(sensor)?;
//! kernel.run()?;
//!
//! let mut event = Event::new(Id::event(0, 0), sensor, sensor).with_param_u32(0, 42);
//! interrupts.raise(3, || kernel.put_event(&mut event))??;
//!
//! os.halt();
//! os.join()?;
//! # Ok::<(), scpfwk::Error>(())
//! ```

mod common;
pub(crate) mod context;
pub(crate) mod delayed;
pub(crate) mod pool;
pub(crate) mod state;
mod worker;

use std::sync::{Arc, Mutex};

use log::{debug, error};

use crate::{
    config::KernelConfig,
    event::Event,
    id::Id,
    module::ModuleRegistry,
    notification::Subscriptions,
    os::{Interrupts, Os, Signals, ThreadAttr, WaitMode},
    thread::{
        context::{ResponseSlot, ThreadContext, COMMON_THREAD},
        state::KernelState,
    },
    Error, Result,
};

pub use state::KernelStats;

/// The event dispatch kernel.
///
/// Created once with [`Kernel::init`] and shared as `Arc<Kernel>` with every
/// kernel thread and with the handlers.
pub struct Kernel {
    pub(crate) config: KernelConfig,
    pub(crate) modules: ModuleRegistry,
    pub(crate) os: Arc<dyn Os>,
    pub(crate) interrupts: Arc<dyn Interrupts>,
    pub(crate) state: Mutex<KernelState>,
    pub(crate) subscriptions: Subscriptions,
}

impl Kernel {
    /// Creates an uninitialized kernel.
    ///
    /// Every entry point returns [`Error::NotInitialized`] until
    /// [`Kernel::initialize`] succeeds.
    pub fn new(
        config: KernelConfig,
        modules: ModuleRegistry,
        os: Arc<dyn Os>,
        interrupts: Arc<dyn Interrupts>,
    ) -> Arc<Self> {
        Arc::new(Kernel {
            state: Mutex::new(KernelState::new(config.event_count)),
            subscriptions: Subscriptions::new(config.notification_count),
            config,
            modules,
            os,
            interrupts,
        })
    }

    /// Creates and initializes a kernel.
    ///
    /// # Errors
    /// See [`Kernel::initialize`].
    pub fn init(
        config: KernelConfig,
        modules: ModuleRegistry,
        os: Arc<dyn Os>,
        interrupts: Arc<dyn Interrupts>,
    ) -> Result<Arc<Self>> {
        let kernel = Self::new(config, modules, os, interrupts);
        kernel.initialize()?;
        Ok(kernel)
    }

    /// Initializes the OS and creates the common thread.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] when called twice and [`Error::Os`] when
    /// the OS cannot be initialized or the thread cannot be created.
    pub fn initialize(self: &Arc<Self>) -> Result<()> {
        let mut state = lock!(self.state);
        if state.initialized {
            return Err(Error::InvalidState("kernel already initialized".to_string()));
        }

        self.os.kernel_initialize()?;

        let kernel = Arc::clone(self);
        let handle = self.os.thread_new(
            &self.thread_attr("common"),
            Box::new(move || kernel.run_common_thread()),
        )?;
        state.threads[COMMON_THREAD].os_thread = Some(handle);
        state.initialized = true;

        debug!(
            "kernel initialized: {} events, {} subscriptions, {} modules",
            self.config.event_count,
            self.config.notification_count,
            self.modules.len()
        );
        Ok(())
    }

    /// Creates a worker thread for the module or element `id`.
    ///
    /// # Errors
    /// - [`Error::NotInitialized`] before [`Kernel::initialize`]
    /// - [`Error::InvalidParameter`] if `id` is not a registered module or element
    /// - [`Error::InvalidState`] once the kernel runs or if `id` already has a thread
    /// - [`Error::Os`] if the OS thread cannot be created
    pub fn create_thread(self: &Arc<Self>, id: Id) -> Result<()> {
        let mut guard = lock!(self.state);
        let state = &mut *guard;
        if !state.initialized {
            return Err(Error::NotInitialized);
        }
        if !self.modules.is_valid_entity_id(id) {
            return Err(param_error!("{} is not a registered module or element", id));
        }
        if state.running {
            return Err(Error::InvalidState(format!(
                "cannot create a thread for {id} while running"
            )));
        }
        if state.bindings.contains_key(&id) {
            return Err(Error::InvalidState(format!("{id} already has a thread")));
        }

        let thread = state.threads.len();
        let kernel = Arc::clone(self);
        let handle = self.os.thread_new(
            &self.thread_attr(&self.entity_name(id)),
            Box::new(move || kernel.run_worker_thread(thread)),
        )?;

        let mut ctx = ThreadContext::new(Some(id));
        ctx.os_thread = Some(handle);
        state.threads.push(ctx);
        state.bindings.insert(id, thread);

        debug!("thread {thread} created for {id}");
        Ok(())
    }

    /// Starts the OS scheduler.
    ///
    /// # Errors
    /// Returns [`Error::NotInitialized`] before [`Kernel::initialize`] and
    /// [`Error::Os`] when the OS cannot be started.
    pub fn run(&self) -> Result<()> {
        if !lock!(self.state).initialized {
            return Err(Error::NotInitialized);
        }
        self.os.kernel_start()
    }

    /// Queues `event` for asynchronous processing.
    ///
    /// Callable from handlers, other threads and interrupt handlers. From a
    /// handler the source becomes the entity the handler runs for. From
    /// interrupt context the event goes through the interrupt inbox of the
    /// common thread. The assigned cookie is written back to `event` when it is
    /// queued from thread context.
    ///
    /// A response put from thread context completes a response the caller
    /// deferred earlier: it must carry the cookie of the original request.
    ///
    /// # Errors
    /// - [`Error::NotInitialized`] before [`Kernel::initialize`]
    /// - [`Error::InvalidParameter`] for inconsistent identifiers or flags
    /// - [`Error::DelayedResponseNotFound`] for a response nobody deferred
    /// - [`Error::NoMemory`] when the event pool is exhausted
    /// - [`Error::Os`] when the common thread cannot be woken up
    pub fn put_event(&self, event: &mut Event) -> Result<()> {
        let in_isr = self.interrupts.in_interrupt();
        let mut guard = lock!(self.state);
        let state = &mut *guard;

        if !state.initialized {
            return Err(Error::NotInitialized);
        }

        let target = state.thread_of(&self.modules, event.target_id)?;

        match state.current_event {
            Some(current) if !in_isr => event.source_id = current.target_id,
            _ => {
                if !self.modules.is_valid_entity_id(event.source_id) {
                    return Err(param_error!("invalid source {}", event.source_id));
                }
            }
        }

        self.validate_event(event)?;

        if !in_isr {
            event.is_delayed_response = event.is_response;
            return state.enqueue(target, event);
        }
        self.put_isr_event(state, event)
    }

    fn validate_event(&self, event: &Event) -> Result<()> {
        if event.is_notification {
            if !self.modules.is_valid_notification_id(event.id) {
                return Err(param_error!("invalid notification {}", event.id));
            }
            if !event.is_response || event.response_requested {
                return Err(param_error!(
                    "notification {} must be a response without response request",
                    event.id
                ));
            }
            if !event.target_id.same_module(&event.id) {
                return Err(param_error!(
                    "notification {} cannot target {}",
                    event.id,
                    event.target_id
                ));
            }
            return Ok(());
        }

        if !self.modules.is_valid_event_id(event.id) {
            return Err(param_error!("invalid event {}", event.id));
        }
        if event.is_response {
            if !event.source_id.same_module(&event.id) {
                return Err(param_error!(
                    "response {} cannot come from {}",
                    event.id,
                    event.source_id
                ));
            }
            if event.response_requested {
                return Err(param_error!("response {} requests a response", event.id));
            }
        } else if !event.target_id.same_module(&event.id) {
            return Err(param_error!(
                "event {} cannot target {}",
                event.id,
                event.target_id
            ));
        }
        Ok(())
    }

    /// Appends a copy of `event` to the interrupt inbox and wakes the common
    /// thread if it waits for interrupt events.
    pub(crate) fn put_isr_event(&self, state: &mut KernelState, event: &Event) -> Result<()> {
        let idx = state.pool.duplicate(event)?;
        debug!(
            "add ISR event ({},{},{})",
            event.source_id, event.target_id, event.id
        );
        state.isr_inbox.push_back(idx);

        if state.waiting_for_isr_event {
            let common = state.handle(COMMON_THREAD)?;
            self.os
                .thread_flags_set(common, Signals::ISR_EVENT)
                .map_err(|e| Error::Os(format!("cannot wake the common thread: {e}")))?;
            state.waiting_for_isr_event = false;
        }
        Ok(())
    }

    /// Sends a request and blocks the calling handler until it is answered.
    ///
    /// Only handlers running on a worker thread may block. Other events queued
    /// for the thread stay queued until the handler returns. The response
    /// handler of the target is not allowed to block on the caller in turn.
    ///
    /// Returns the response.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] when the kernel is not running
    /// - [`Error::InvalidParameter`] for an invalid event or target
    /// - [`Error::AccessDenied`] from interrupt context, from the common thread,
    ///   outside a handler or when the target runs on the calling thread
    /// - [`Error::Os`] when the completion signal is not received
    pub fn put_event_and_wait(&self, event: &mut Event) -> Result<Event> {
        let in_isr = self.interrupts.in_interrupt();

        let (calling, saved_event, handle) = {
            let mut guard = lock!(self.state);
            let state = &mut *guard;

            if !state.running {
                return Err(Error::InvalidState("kernel is not running".to_string()));
            }

            let target = state.thread_of(&self.modules, event.target_id)?;
            if !self.modules.is_valid_event_id(event.id) {
                return Err(param_error!("invalid event {}", event.id));
            }
            if !event.target_id.same_module(&event.id) {
                return Err(param_error!(
                    "event {} cannot target {}",
                    event.id,
                    event.target_id
                ));
            }

            let calling = match state.current_thread {
                _ if in_isr => None,
                Some(COMMON_THREAD) => None,
                Some(current) if current == target => None,
                current => current,
            };
            let Some(calling) = calling else {
                return Err(Error::AccessDenied(format!(
                    "cannot wait for {} from this context",
                    event.id
                )));
            };

            match state.current_event {
                Some(current) => event.source_id = current.target_id,
                None => {
                    if !self.modules.is_valid_entity_id(event.source_id) {
                        return Err(param_error!("invalid source {}", event.source_id));
                    }
                }
            }

            event.is_response = false;
            event.is_delayed_response = false;
            event.response_requested = true;
            event.is_notification = false;
            state.enqueue(target, event)?;

            let ctx = &mut state.threads[calling];
            ctx.response = Some(ResponseSlot::new(event.cookie));
            ctx.waiting_event_processing_completion = true;

            (calling, state.current_event, state.handle(calling)?)
        };

        self.launch_next_event_processing(calling)?;

        let flags = self
            .os
            .thread_flags_wait(handle, Signals::EVENT_PROCESSED, WaitMode::All);

        let mut state = lock!(self.state);
        let slot = state.threads[calling].response.take();
        state.threads[calling].waiting_event_processing_completion = false;

        let flags = flags?;
        if flags != Signals::EVENT_PROCESSED {
            return Err(Error::Os(format!(
                "unexpected completion signals {flags:?}"
            )));
        }

        state.current_thread = Some(calling);
        state.current_event = saved_event;

        slot.and_then(ResponseSlot::into_event)
            .ok_or_else(|| Error::Os("completion signalled without a response".to_string()))
    }

    /// Returns a copy of the response `id` deferred for the request `cookie`.
    ///
    /// # Errors
    /// - [`Error::NotInitialized`] before [`Kernel::initialize`]
    /// - [`Error::AccessDenied`] from interrupt context
    /// - [`Error::InvalidParameter`] if `id` is not a registered module or element
    /// - [`Error::DelayedResponseNotFound`] if no such response is pending
    pub fn get_delayed_response(&self, id: Id, cookie: u32) -> Result<Event> {
        let state = lock!(self.state);
        if !state.initialized {
            return Err(Error::NotInitialized);
        }
        if self.interrupts.in_interrupt() {
            return Err(Error::AccessDenied(
                "delayed responses are not available from interrupt context".to_string(),
            ));
        }
        if !self.modules.is_valid_entity_id(id) {
            return Err(param_error!("{} is not a registered module or element", id));
        }

        state
            .delayed
            .find(id, cookie)
            .map(|idx| *state.pool.get(idx))
            .ok_or(Error::DelayedResponseNotFound { id, cookie })
    }

    /// Returns `true` when `id` has no pending delayed response.
    ///
    /// # Errors
    /// Returns [`Error::NotInitialized`] before [`Kernel::initialize`] and
    /// [`Error::InvalidParameter`] if `id` is not a registered module or element.
    pub fn is_delayed_response_list_empty(&self, id: Id) -> Result<bool> {
        let state = lock!(self.state);
        if !state.initialized {
            return Err(Error::NotInitialized);
        }
        if !self.modules.is_valid_entity_id(id) {
            return Err(param_error!("{} is not a registered module or element", id));
        }
        Ok(state.delayed.is_empty(id))
    }

    /// Returns the event being processed, if a handler is running.
    pub fn current_event(&self) -> Option<Event> {
        with_lock!(self.state, |state: &mut KernelState| state.current_event)
            .ok()
            .flatten()
    }

    /// Returns a snapshot of the dispatcher queues.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the state lock is poisoned.
    pub fn stats(&self) -> Result<KernelStats> {
        with_lock!(self.state, |state: &mut KernelState| state.stats())
    }

    /// The registered modules.
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// The configuration the kernel was created with.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    fn thread_attr(&self, suffix: &str) -> ThreadAttr {
        ThreadAttr {
            name: format!("{}-{}", self.config.thread_name_prefix, suffix),
            stack_size: self.config.thread_stack_size,
            priority: self.config.thread_priority,
        }
    }

    fn entity_name(&self, id: Id) -> String {
        let name = self.modules.name(id).unwrap_or("unknown");
        match id {
            Id::Element { element, .. } => format!("{name}.{element}"),
            _ => name.to_string(),
        }
    }

    fn run_common_thread(&self) {
        match self.common_thread_function() {
            Ok(()) | Err(Error::Halted) => debug!("common thread stopped"),
            Err(e) => error!("common thread stopped: {e}"),
        }
    }

    fn run_worker_thread(&self, thread: usize) {
        match self.specific_thread_function(thread) {
            Ok(()) | Err(Error::Halted) => debug!("thread {thread} stopped"),
            Err(e) => error!("thread {thread} stopped: {e}"),
        }
    }
}
