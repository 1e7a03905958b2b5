use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
};

use crate::{
    event::Event,
    module::EventHandler,
    os::{Interrupts, Os, Signals, ThreadAttr, ThreadEntry, ThreadHandle, WaitMode},
    thread::Kernel,
    Error, Result,
};

/// A recorded call to [`Os::thread_flags_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitCall {
    pub thread: ThreadHandle,
    pub flags: Signals,
    pub mode: WaitMode,
}

type WaitHook = Box<dyn Fn(ThreadHandle, Signals) + Send + Sync>;

#[derive(Default)]
struct MockOsState {
    threads: Vec<(ThreadAttr, Option<ThreadEntry>)>,
    waits: Vec<WaitCall>,
    sets: Vec<(ThreadHandle, Signals)>,
    wait_script: VecDeque<Result<Signals>>,
    failing_sets: usize,
    started: bool,
}

/// Scripted [`Os`]: handles are assigned in creation order, so the common
/// thread is handle 0. Thread entries are kept but never run.
#[derive(Default)]
pub struct MockOs {
    state: Mutex<MockOsState>,
    hook: Mutex<Option<WaitHook>>,
}

impl MockOs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next unscripted wait. Waits past the end of the
    /// script return [`Error::Halted`].
    pub fn script_wait(&self, result: Result<Signals>) {
        self.state.lock().unwrap().wait_script.push_back(result);
    }

    /// Makes the next `count` flag sets fail.
    pub fn fail_next_sets(&self, count: usize) {
        self.state.lock().unwrap().failing_sets = count;
    }

    /// Runs `hook` at every wait, before the scripted result is returned.
    pub fn on_wait(&self, hook: impl Fn(ThreadHandle, Signals) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn waits(&self) -> Vec<WaitCall> {
        self.state.lock().unwrap().waits.clone()
    }

    pub fn sets(&self) -> Vec<(ThreadHandle, Signals)> {
        self.state.lock().unwrap().sets.clone()
    }

    pub fn thread_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .threads
            .iter()
            .map(|(attr, _)| attr.name.clone())
            .collect()
    }

    pub fn started(&self) -> bool {
        self.state.lock().unwrap().started
    }
}

impl Os for MockOs {
    fn kernel_initialize(&self) -> Result<()> {
        Ok(())
    }

    fn kernel_start(&self) -> Result<()> {
        self.state.lock().unwrap().started = true;
        Ok(())
    }

    fn thread_new(&self, attr: &ThreadAttr, entry: ThreadEntry) -> Result<ThreadHandle> {
        let mut state = self.state.lock().unwrap();
        state.threads.push((attr.clone(), Some(entry)));
        Ok(ThreadHandle::new(state.threads.len() - 1))
    }

    fn thread_flags_wait(
        &self,
        thread: ThreadHandle,
        flags: Signals,
        mode: WaitMode,
    ) -> Result<Signals> {
        self.state
            .lock()
            .unwrap()
            .waits
            .push(WaitCall { thread, flags, mode });

        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(thread, flags);
        }

        self.state
            .lock()
            .unwrap()
            .wait_script
            .pop_front()
            .unwrap_or(Err(Error::Halted))
    }

    fn thread_flags_set(&self, thread: ThreadHandle, flags: Signals) -> Result<Signals> {
        let mut state = self.state.lock().unwrap();
        state.sets.push((thread, flags));
        if state.failing_sets > 0 {
            state.failing_sets -= 1;
            return Err(Error::Os("scripted set failure".to_string()));
        }
        Ok(flags)
    }

    fn thread_flags_clear(&self, _thread: ThreadHandle, _flags: Signals) -> Signals {
        Signals::empty()
    }
}

/// [`Interrupts`] with a test-controlled interrupt context.
#[derive(Default)]
pub struct MockInterrupts {
    depth: AtomicU32,
    disables: AtomicU32,
    current: Mutex<Option<u32>>,
}

impl MockInterrupts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current(&self, irq: Option<u32>) {
        *self.current.lock().unwrap() = irq;
    }

    pub fn mask_depth(&self) -> u32 {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn disable_count(&self) -> u32 {
        self.disables.load(Ordering::SeqCst)
    }
}

impl Interrupts for MockInterrupts {
    fn global_disable(&self) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.disables.fetch_add(1, Ordering::SeqCst);
    }

    fn global_enable(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }

    fn current(&self) -> Option<u32> {
        *self.current.lock().unwrap()
    }
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
    current: Vec<Option<Event>>,
    respond: Option<u32>,
    delay: bool,
    fail: bool,
    follow_up: Option<Event>,
}

/// [`EventHandler`] recording what it handles.
#[derive(Default)]
pub struct RecordingHandler {
    inner: Mutex<Recorder>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events and notifications handled so far.
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().unwrap().events.clone()
    }

    /// [`Kernel::current_event`] as seen from each handler call.
    pub fn current_events(&self) -> Vec<Option<Event>> {
        self.inner.lock().unwrap().current.clone()
    }

    /// Writes `value` at offset 0 of every response.
    pub fn respond_with(&self, value: u32) {
        self.inner.lock().unwrap().respond = Some(value);
    }

    /// Defers every response.
    pub fn delay_responses(&self) {
        self.inner.lock().unwrap().delay = true;
    }

    /// Writes `value` in the response, then reports a failure.
    pub fn fail_with_param_u32(&self, value: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.respond = Some(value);
        inner.fail = true;
    }

    /// Puts `event` from the next handler call.
    pub fn put_on_first_event(&self, event: Event) {
        self.inner.lock().unwrap().follow_up = Some(event);
    }

    fn handle(&self, kernel: &Kernel, event: &Event, response: &mut Event) -> Result<()> {
        let current = kernel.current_event();
        let (follow_up, respond, delay, fail) = {
            let mut inner = self.inner.lock().unwrap();
            inner.events.push(*event);
            inner.current.push(current);
            (inner.follow_up.take(), inner.respond, inner.delay, inner.fail)
        };

        if let Some(mut follow_up) = follow_up {
            kernel.put_event(&mut follow_up)?;
        }
        if let Some(value) = respond {
            response.set_param_u32(0, value);
        }
        response.is_delayed_response = delay;

        if fail {
            return Err(Error::InvalidState("scripted handler failure".to_string()));
        }
        Ok(())
    }
}

impl EventHandler for RecordingHandler {
    fn process_event(&self, kernel: &Kernel, event: &Event, response: &mut Event) -> Result<()> {
        self.handle(kernel, event, response)
    }

    fn process_notification(
        &self,
        kernel: &Kernel,
        event: &Event,
        response: &mut Event,
    ) -> Result<()> {
        self.handle(kernel, event, response)
    }
}
