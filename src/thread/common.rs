//! Common thread: interrupt inbox draining and baton hand-off.
//!
//! The common thread owns the interrupt inbox. When no thread has work it parks
//! on [`Signals::ISR_EVENT`]; an interrupt event wakes it, the event is moved to
//! its target's queue, and the target is promoted and signalled through
//! [`Kernel::launch_next_event_processing`]. Every thread that finishes an event
//! uses the same hand-off, so exactly one thread holds the baton at any time.

use log::{debug, warn};

use crate::{
    os::{CriticalSection, Signals, WaitMode},
    thread::{
        context::{ThreadIdx, COMMON_THREAD},
        Kernel,
    },
    Result,
};

impl Kernel {
    /// Moves the next interrupt event to its target thread queue.
    ///
    /// Blocks on [`Signals::ISR_EVENT`] while the inbox is empty. An event for a
    /// thread blocked in a synchronous call is queued without promotion and the
    /// next inbox event is fetched, unless it is the awaited completion, which is
    /// queued and promoted ahead of everything else.
    pub(crate) fn get_next_isr_event(&self) -> Result<()> {
        loop {
            let guard = CriticalSection::enter(self.interrupts.as_ref());
            let mut state = lock!(self.state);

            let Some(idx) = state.isr_inbox.pop_front() else {
                state.waiting_for_isr_event = true;
                let common = state.handle(COMMON_THREAD)?;
                drop(state);
                drop(guard);

                let flags = self
                    .os
                    .thread_flags_wait(common, Signals::ISR_EVENT, WaitMode::All)?;
                if flags != Signals::ISR_EVENT {
                    warn!("common thread: spurious wake {:?} while waiting for ISR events", flags);
                }
                continue;
            };
            drop(guard);

            let state = &mut *state;
            let event = *state.pool.get(idx);
            debug!(
                "get ISR event ({},{},{})",
                event.source_id, event.target_id, event.id
            );

            let cookie = state.next_cookie();
            let target = match state.thread_of(&self.modules, event.target_id) {
                Ok(target) => target,
                Err(e) => {
                    warn!("dropping ISR event {}: {e}", event.id);
                    state.pool.release(idx);
                    continue;
                }
            };

            let wakeup = state.threads[target].is_wakeup_event(&event);
            let stored = state.pool.get_mut(idx);
            stored.is_thread_wakeup_event = wakeup;
            stored.cookie = cookie;

            if wakeup {
                state.threads[target].event_queue.push_front(idx);
                state.mark_ready_front(target);
                return Ok(());
            }

            state.threads[target].event_queue.push_back(idx);
            if !state.threads[target].waiting_event_processing_completion {
                state.mark_ready(target);
                return Ok(());
            }
        }
    }

    /// Hands the baton to the head of the ready queue.
    ///
    /// Returns `current` when it is the head, so the caller keeps processing its
    /// own queue. Otherwise the head is signalled: a thread whose first event
    /// completes its synchronous call gets the completion in its response slot
    /// and [`Signals::EVENT_PROCESSED`], any other thread gets
    /// [`Signals::EVENT_TO_PROCESS`].
    ///
    /// When a thread cannot be signalled its first event is dropped and the
    /// thread goes back to the ready tail if more events are queued. This repeats
    /// without bound, so a permanently unsignalable thread with a long queue
    /// keeps the caller here until its queue is drained.
    ///
    /// Returns `None` when no thread is ready.
    pub(crate) fn launch_next_event_processing(
        &self,
        current: ThreadIdx,
    ) -> Result<Option<ThreadIdx>> {
        let mut guard = lock!(self.state);
        let state = &mut *guard;

        while let Some(next) = state.ready.pop_front() {
            if next == current {
                return Ok(Some(current));
            }

            let Some(&head) = state.threads[next].event_queue.front() else {
                warn!("thread {next} was ready with an empty queue");
                continue;
            };
            let event = *state.pool.get(head);
            let handle = state.handle(next)?;

            let failure = if event.is_thread_wakeup_event {
                match self.os.thread_flags_set(handle, Signals::EVENT_PROCESSED) {
                    Ok(_) => {
                        let ctx = &mut state.threads[next];
                        if let Some(slot) = ctx.response.as_mut() {
                            if !slot.fill(event) {
                                warn!("thread {next}: response slot already filled");
                            }
                        }
                        ctx.event_queue.pop_front();
                        state.pool.release(head);
                        return Ok(Some(next));
                    }
                    Err(e) => e,
                }
            } else {
                match self.os.thread_flags_set(handle, Signals::EVENT_TO_PROCESS) {
                    Ok(_) => return Ok(Some(next)),
                    Err(e) => e,
                }
            };

            warn!(
                "cannot signal thread {next} ({failure}), dropping event ({},{},{})",
                event.source_id, event.target_id, event.id
            );
            state.threads[next].event_queue.pop_front();
            state.pool.release(head);
            if !state.threads[next].event_queue.is_empty() {
                state.ready.push_back(next);
            }
        }

        Ok(None)
    }

    /// Entry of the common thread.
    ///
    /// Returns only with the error that stopped the dispatch loop, normally
    /// [`crate::Error::Halted`].
    pub(crate) fn common_thread_function(&self) -> Result<()> {
        lock!(self.state).running = true;
        debug!("common thread running");

        loop {
            if let Some(next) = self.launch_next_event_processing(COMMON_THREAD)? {
                self.thread_function(COMMON_THREAD, Some(next))?;
            }
            self.get_next_isr_event()?;
        }
    }
}
