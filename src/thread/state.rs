//! Shared dispatcher state.
//!
//! Everything the kernel threads share lives in one [`KernelState`] behind the
//! kernel mutex. Queues hold indices into the event pool and the thread table,
//! so moving an event between queues never copies it.

use std::collections::VecDeque;

use log::debug;
use rustc_hash::FxHashMap;

use crate::{
    event::Event,
    id::Id,
    module::ModuleRegistry,
    os::ThreadHandle,
    thread::{
        context::{ThreadContext, ThreadIdx, COMMON_THREAD},
        delayed::DelayedResponses,
        pool::{EventIdx, EventPool},
    },
    Error, Result,
};

/// Snapshot of the dispatcher queues, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelStats {
    /// Total number of pool records
    pub pool_capacity: usize,
    /// Pool records on the free list
    pub pool_free: usize,
    /// Threads in the ready queue
    pub ready_len: usize,
    /// Events waiting in the interrupt inbox
    pub isr_inbox_len: usize,
    /// Deferred responses not yet completed
    pub delayed_responses: usize,
    /// Next cookie to be assigned
    pub event_cookie_counter: u32,
    /// The common thread is parked waiting for interrupt events
    pub waiting_for_isr_event: bool,
}

/// Mutable state shared by the kernel threads.
pub struct KernelState {
    /// Event records
    pub pool: EventPool,
    /// Events queued from interrupt context, drained by the common thread
    pub isr_inbox: VecDeque<EventIdx>,
    /// Threads with work that are not blocked, head runs next
    pub ready: VecDeque<ThreadIdx>,
    /// Thread contexts, [`COMMON_THREAD`] first
    pub threads: Vec<ThreadContext>,
    /// Entity to thread bindings made by [`crate::Kernel::create_thread`]
    pub bindings: FxHashMap<Id, ThreadIdx>,
    /// Deferred responses
    pub delayed: DelayedResponses,
    /// Thread running a handler
    pub current_thread: Option<ThreadIdx>,
    /// Event being handled
    pub current_event: Option<Event>,
    /// The common thread waits for [`crate::os::Signals::ISR_EVENT`]
    pub waiting_for_isr_event: bool,
    /// Next cookie
    pub event_cookie_counter: u32,
    /// [`crate::Kernel::initialize`] completed
    pub initialized: bool,
    /// The common thread entered its dispatch loop
    pub running: bool,
}

impl KernelState {
    /// Creates the state with a pool of `event_count` records and the common thread context.
    pub fn new(event_count: usize) -> Self {
        KernelState {
            pool: EventPool::new(event_count),
            isr_inbox: VecDeque::new(),
            ready: VecDeque::new(),
            threads: vec![ThreadContext::new(None)],
            bindings: FxHashMap::default(),
            delayed: DelayedResponses::new(),
            current_thread: None,
            current_event: None,
            waiting_for_isr_event: false,
            event_cookie_counter: 0,
            initialized: false,
            running: false,
        }
    }

    /// Resolves the thread events for `id` are dispatched on.
    ///
    /// An element runs on its own thread when it has one, otherwise on the
    /// thread of its module, otherwise on the common thread.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if `id` is not a registered entity.
    pub fn thread_of(&self, modules: &ModuleRegistry, id: Id) -> Result<ThreadIdx> {
        if !modules.is_valid_entity_id(id) {
            return Err(param_error!("{} is not a registered module or element", id));
        }

        if let Some(&thread) = self.bindings.get(&id) {
            return Ok(thread);
        }
        Ok(self
            .bindings
            .get(&id.to_module_id())
            .copied()
            .unwrap_or(COMMON_THREAD))
    }

    /// OS handle of `thread`.
    ///
    /// # Errors
    /// Returns [`Error::Os`] if no OS thread backs the context yet.
    pub fn handle(&self, thread: ThreadIdx) -> Result<ThreadHandle> {
        self.threads
            .get(thread)
            .and_then(|ctx| ctx.os_thread)
            .ok_or_else(|| Error::Os(format!("no OS thread for context {thread}")))
    }

    /// Appends `thread` to the ready queue unless it is already there.
    pub fn mark_ready(&mut self, thread: ThreadIdx) {
        if !self.ready.contains(&thread) {
            self.ready.push_back(thread);
        }
    }

    /// Moves `thread` to the head of the ready queue.
    pub fn mark_ready_front(&mut self, thread: ThreadIdx) {
        self.ready.retain(|&t| t != thread);
        self.ready.push_front(thread);
    }

    /// Returns the next cookie and advances the counter.
    pub fn next_cookie(&mut self) -> u32 {
        let cookie = self.event_cookie_counter;
        self.event_cookie_counter = self.event_cookie_counter.wrapping_add(1);
        cookie
    }

    /// Queues `event` to `target` from thread context.
    ///
    /// The event becomes a wakeup event when it completes the synchronous call
    /// `target` is blocked in; it then jumps to the head of the thread queue and
    /// of the ready queue. Otherwise it is appended, and `target` becomes ready
    /// if its queue was empty, it is not the running thread and it is not blocked.
    ///
    /// A delayed response reuses the record parked in the delayed registry.
    /// The assigned cookie is written back to `event`.
    ///
    /// # Errors
    /// Returns [`Error::DelayedResponseNotFound`] for an unknown delayed response
    /// and [`Error::NoMemory`] when the pool is exhausted.
    pub fn enqueue(&mut self, target: ThreadIdx, event: &mut Event) -> Result<()> {
        debug!(
            "add event to thread queue ({},{},{})",
            event.source_id, event.target_id, event.id
        );

        event.is_thread_wakeup_event = self.threads[target].is_wakeup_event(event);

        let idx = if event.is_delayed_response {
            let idx = self.delayed.take(event.source_id, event.cookie).ok_or(
                Error::DelayedResponseNotFound {
                    id: event.source_id,
                    cookie: event.cookie,
                },
            )?;
            let stored = self.pool.get_mut(idx);
            stored.params = event.params;
            stored.is_thread_wakeup_event = event.is_thread_wakeup_event;
            idx
        } else {
            self.pool.duplicate(event)?
        };

        let cookie = self.next_cookie();
        self.pool.get_mut(idx).cookie = cookie;
        event.cookie = cookie;

        let ctx = &mut self.threads[target];
        if event.is_thread_wakeup_event {
            ctx.event_queue.push_front(idx);
            self.mark_ready_front(target);
        } else {
            let was_empty = ctx.event_queue.is_empty();
            ctx.event_queue.push_back(idx);
            if was_empty
                && self.current_thread != Some(target)
                && !ctx.waiting_event_processing_completion
            {
                self.mark_ready(target);
            }
        }
        Ok(())
    }

    /// Number of events linked in any queue or parked as a delayed response.
    pub fn linked_events(&self) -> usize {
        self.isr_inbox.len()
            + self.delayed.len()
            + self
                .threads
                .iter()
                .map(|ctx| ctx.event_queue.len())
                .sum::<usize>()
    }

    /// Diagnostics snapshot.
    pub fn stats(&self) -> KernelStats {
        KernelStats {
            pool_capacity: self.pool.capacity(),
            pool_free: self.pool.free_count(),
            ready_len: self.ready.len(),
            isr_inbox_len: self.isr_inbox.len(),
            delayed_responses: self.delayed.len(),
            event_cookie_counter: self.event_cookie_counter,
            waiting_for_isr_event: self.waiting_for_isr_event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::two_module_registry;
    use crate::thread::context::ResponseSlot;

    fn state_with_worker() -> KernelState {
        let mut state = KernelState::new(4);
        state.threads.push(ThreadContext::new(Some(Id::module(1))));
        state.bindings.insert(Id::module(1), 1);
        state
    }

    fn request() -> Event {
        Event::new(Id::event(1, 0), Id::module(0), Id::module(1))
    }

    #[test]
    fn test_thread_resolution() {
        let modules = two_module_registry();
        let mut state = state_with_worker();
        assert_eq!(state.thread_of(&modules, Id::module(0)).unwrap(), COMMON_THREAD);
        assert_eq!(state.thread_of(&modules, Id::module(1)).unwrap(), 1);
        assert_eq!(state.thread_of(&modules, Id::element(1, 0)).unwrap(), 1);

        state.threads.push(ThreadContext::new(Some(Id::element(1, 1))));
        state.bindings.insert(Id::element(1, 1), 2);
        assert_eq!(state.thread_of(&modules, Id::element(1, 1)).unwrap(), 2);
        assert_eq!(state.thread_of(&modules, Id::element(1, 0)).unwrap(), 1);

        assert!(matches!(
            state.thread_of(&modules, Id::module(7)),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(matches!(
            state.thread_of(&modules, Id::event(1, 0)),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_ready_queue_has_no_duplicates() {
        let mut state = state_with_worker();
        state.mark_ready(1);
        state.mark_ready(0);
        state.mark_ready(1);
        assert_eq!(state.ready, VecDeque::from([1, 0]));

        state.mark_ready_front(0);
        assert_eq!(state.ready, VecDeque::from([0, 1]));
    }

    #[test]
    fn test_enqueue_promotes_idle_thread_once() {
        let mut state = state_with_worker();
        let mut first = request();
        let mut second = request();

        state.enqueue(1, &mut first).unwrap();
        state.enqueue(1, &mut second).unwrap();

        assert_eq!(first.cookie, 0);
        assert_eq!(second.cookie, 1);
        assert_eq!(state.event_cookie_counter, 2);
        assert_eq!(state.ready, VecDeque::from([1]));
        let queued: Vec<u32> = state.threads[1]
            .event_queue
            .iter()
            .map(|&idx| state.pool.get(idx).cookie)
            .collect();
        assert_eq!(queued, vec![0, 1]);
    }

    #[test]
    fn test_enqueue_to_running_thread_does_not_promote() {
        let mut state = state_with_worker();
        state.current_thread = Some(1);
        state.enqueue(1, &mut request()).unwrap();
        assert!(state.ready.is_empty());
        assert_eq!(state.threads[1].event_queue.len(), 1);
    }

    #[test]
    fn test_enqueue_to_blocked_thread() {
        let mut state = state_with_worker();
        state.threads[1].waiting_event_processing_completion = true;
        state.threads[1].response = Some(ResponseSlot::new(7));

        state.enqueue(1, &mut request()).unwrap();
        assert!(state.ready.is_empty());

        let mut completion = Event {
            cookie: 7,
            is_response: true,
            ..request()
        };
        state.enqueue(1, &mut completion).unwrap();

        assert!(completion.is_thread_wakeup_event);
        assert_eq!(state.ready, VecDeque::from([1]));
        let head = *state.threads[1].event_queue.front().unwrap();
        assert!(state.pool.get(head).is_thread_wakeup_event);
        assert_eq!(state.pool.get(head).cookie, completion.cookie);
    }

    #[test]
    fn test_enqueue_delayed_response() {
        let mut state = state_with_worker();
        let mut missing = Event {
            is_delayed_response: true,
            is_response: true,
            cookie: 3,
            ..request()
        };
        assert!(matches!(
            state.enqueue(1, &mut missing),
            Err(Error::DelayedResponseNotFound { cookie: 3, .. })
        ));

        let parked = state.pool.duplicate(&missing).unwrap();
        state.delayed.mark_pending(Id::module(0), 3, parked);
        let free_before = state.pool.free_count();

        let mut completion = missing.with_param_u32(0, 77);
        state.enqueue(1, &mut completion).unwrap();

        assert_eq!(state.pool.free_count(), free_before);
        assert!(state.delayed.is_empty(Id::module(0)));
        assert_eq!(state.threads[1].event_queue.front(), Some(&parked));
        assert_eq!(state.pool.get(parked).param_u32(0), Some(77));
    }

    #[test]
    fn test_enqueue_exhausted_pool() {
        let mut state = KernelState::new(1);
        state.enqueue(COMMON_THREAD, &mut request()).unwrap();
        assert!(matches!(
            state.enqueue(COMMON_THREAD, &mut request()),
            Err(Error::NoMemory)
        ));
        assert_eq!(state.event_cookie_counter, 1);
    }
}
