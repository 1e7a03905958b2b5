//! Event processing loop shared by the common thread and the worker threads.

use log::{debug, warn};

use crate::{
    os::{Signals, WaitMode},
    thread::{
        context::{ThreadIdx, COMMON_THREAD},
        Kernel,
    },
    Result,
};

impl Kernel {
    /// Runs the handler of the first event queued to `thread`.
    ///
    /// The handler runs without the state lock. A requested response is routed
    /// back to the requester, or parked in the delayed registry when the handler
    /// deferred it. Handler errors are logged only.
    pub(crate) fn process_next_thread_event(&self, thread: ThreadIdx) -> Result<()> {
        let (idx, event) = {
            let mut guard = lock!(self.state);
            let state = &mut *guard;
            let Some(idx) = state.threads[thread].event_queue.pop_front() else {
                warn!("thread {thread} signalled with an empty queue");
                return Ok(());
            };
            let event = *state.pool.get(idx);
            state.current_thread = Some(thread);
            state.current_event = Some(event);
            (idx, event)
        };

        debug!(
            "process thread event ({},{},{})",
            event.source_id, event.target_id, event.id
        );

        let mut response = if event.response_requested {
            event.response_shell()
        } else {
            event
        };
        let status = match self.modules.handler(event.target_id) {
            Some(handler) if event.is_notification => {
                handler.process_notification(self, &event, &mut response)
            }
            Some(handler) => handler.process_event(self, &event, &mut response),
            None => Err(param_error!("no module handles {}", event.target_id)),
        };
        if let Err(e) = status {
            warn!("handler of {} failed on {}: {e}", event.target_id, event.id);
        }

        let mut guard = lock!(self.state);
        let state = &mut *guard;

        if event.response_requested {
            response.is_response = true;
            response.response_requested = false;

            if response.is_delayed_response {
                match state.pool.duplicate(&response) {
                    Ok(copy) => {
                        state
                            .delayed
                            .mark_pending(response.source_id, response.cookie, copy)
                    }
                    Err(e) => warn!("cannot defer response to {}: {e}", response.target_id),
                }
            } else {
                let routed = state
                    .thread_of(&self.modules, response.target_id)
                    .and_then(|requester| state.enqueue(requester, &mut response));
                if let Err(e) = routed {
                    warn!("cannot route response to {}: {e}", response.target_id);
                }
            }
        }

        state.current_event = None;
        state.current_thread = None;
        state.pool.release(idx);

        if !state.threads[thread].event_queue.is_empty() {
            state.mark_ready(thread);
        }
        Ok(())
    }

    /// Dispatch loop of `thread`.
    ///
    /// Unless `next` already names `thread`, waits for the baton: the common
    /// thread on [`Signals::EVENT_TO_PROCESS`] or [`Signals::NO_READY_THREAD`],
    /// workers on [`Signals::EVENT_TO_PROCESS`]. Each turn processes one event and
    /// passes the baton on. When nothing is ready the common thread returns and a
    /// worker tells the common thread to go back to interrupt events.
    pub(crate) fn thread_function(&self, thread: ThreadIdx, next: Option<ThreadIdx>) -> Result<()> {
        let signals = if thread == COMMON_THREAD {
            Signals::EVENT_TO_PROCESS | Signals::NO_READY_THREAD
        } else {
            Signals::EVENT_TO_PROCESS
        };
        let handle = lock!(self.state).handle(thread)?;
        let mut next = next;

        loop {
            if next != Some(thread) {
                let flags = self.os.thread_flags_wait(handle, signals, WaitMode::Any)?;
                if !flags.is_single() || !signals.contains(flags) {
                    warn!("thread {thread}: spurious wake {flags:?}");
                    continue;
                }
                if flags == Signals::NO_READY_THREAD {
                    return Ok(());
                }
            }

            self.process_next_thread_event(thread)?;
            next = self.launch_next_event_processing(thread)?;
            if next.is_some() {
                continue;
            }

            if thread == COMMON_THREAD {
                return Ok(());
            }
            let common = lock!(self.state).handle(COMMON_THREAD)?;
            if let Err(e) = self.os.thread_flags_set(common, Signals::NO_READY_THREAD) {
                warn!("thread {thread}: cannot wake the common thread: {e}");
            }
        }
    }

    /// Entry of a worker thread.
    pub(crate) fn specific_thread_function(&self, thread: ThreadIdx) -> Result<()> {
        self.thread_function(thread, None)
    }
}
