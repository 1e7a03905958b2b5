//! Hosted platform running kernel threads on `std::thread`.
//!
//! [`HostOs`] gives every kernel thread its own OS thread and
//! [`FlagRegister`]. Threads are parked on a [`StartGate`] until
//! [`Os::kernel_start`] opens it. [`HostOs::halt`] unblocks every wait with
//! [`Error::Halted`] so the dispatch loops return, and [`HostOs::join`] collects
//! the threads afterwards.
//!
//! [`HostInterrupts`] emulates interrupt context. [`HostInterrupts::raise`] runs a
//! closure on the calling thread as if it were the handler of an interrupt line,
//! once no thread holds the global mask. While the closure runs,
//! [`Interrupts::current`] reports the line on that thread only.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use scpfwk::os::host::{HostInterrupts, HostOs};
//! use scpfwk::os::Interrupts;
//!
//! let os = Arc::new(HostOs::new());
//! let interrupts = Arc::new(HostInterrupts::new());
//!
//! assert_eq!(interrupts.current(), None);
//! let line = interrupts.raise(5, || interrupts.current()).unwrap();
//! assert_eq!(line, Some(5));
//!
//! os.halt();
//! os.join().unwrap();
//! ```

use std::{
    cell::Cell,
    sync::{Arc, Condvar, Mutex},
    thread::{self, JoinHandle},
};

use log::{debug, warn};

use crate::{
    os::{Interrupts, Os, Signals, ThreadAttr, ThreadEntry, ThreadHandle, WaitMode},
    utils::synchronization::{FlagRegister, StartGate},
    Error, Result,
};

struct HostThread {
    flags: Arc<FlagRegister>,
    join: Option<JoinHandle<()>>,
}

/// [`Os`] implementation backed by `std::thread`.
///
/// Threads get the requested name and stack size. [`ThreadAttr::priority`] is
/// ignored since `std::thread` has no portable priority control.
pub struct HostOs {
    threads: Mutex<Vec<HostThread>>,
    gate: Arc<StartGate>,
}

impl Default for HostOs {
    fn default() -> Self {
        Self::new()
    }
}

impl HostOs {
    /// Creates a platform with no thread.
    #[must_use]
    pub fn new() -> Self {
        HostOs {
            threads: Mutex::new(Vec::new()),
            gate: Arc::new(StartGate::new()),
        }
    }

    /// Number of threads created so far.
    pub fn thread_count(&self) -> usize {
        match self.threads.lock() {
            Ok(threads) => threads.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Makes every current and future flag wait return [`Error::Halted`].
    pub fn halt(&self) {
        self.gate.halt();
        let threads = match self.threads.lock() {
            Ok(threads) => threads,
            Err(poisoned) => poisoned.into_inner(),
        };
        for thread in threads.iter() {
            thread.flags.halt();
        }
    }

    /// Waits for every created thread to exit.
    ///
    /// # Errors
    /// Returns [`Error::Os`] if a thread panicked.
    pub fn join(&self) -> Result<()> {
        let handles: Vec<JoinHandle<()>> = {
            let mut threads = lock!(self.threads);
            threads.iter_mut().filter_map(|t| t.join.take()).collect()
        };

        let mut panicked = 0usize;
        for handle in handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }

        if panicked > 0 {
            return Err(Error::Os(format!("{panicked} kernel thread(s) panicked")));
        }
        Ok(())
    }

    fn flags(&self, thread: ThreadHandle) -> Result<Arc<FlagRegister>> {
        let threads = lock!(self.threads);
        threads
            .get(thread.raw())
            .map(|t| Arc::clone(&t.flags))
            .ok_or_else(|| Error::Os(format!("unknown thread {}", thread.raw())))
    }
}

impl Os for HostOs {
    fn kernel_initialize(&self) -> Result<()> {
        Ok(())
    }

    fn kernel_start(&self) -> Result<()> {
        debug!("host: opening start gate for {} thread(s)", self.thread_count());
        self.gate.open()
    }

    fn thread_new(&self, attr: &ThreadAttr, entry: ThreadEntry) -> Result<ThreadHandle> {
        let mut threads = lock!(self.threads);
        let handle = ThreadHandle::new(threads.len());
        let gate = Arc::clone(&self.gate);
        if let Some(priority) = attr.priority {
            debug!("host: priority {priority} of {} ignored", attr.name);
        }

        let join = thread::Builder::new()
            .name(attr.name.clone())
            .stack_size(attr.stack_size)
            .spawn(move || {
                if gate.wait().is_ok() {
                    entry();
                }
            })
            .map_err(|e| Error::Os(format!("cannot spawn {}: {e}", attr.name)))?;

        threads.push(HostThread {
            flags: Arc::new(FlagRegister::new()),
            join: Some(join),
        });
        Ok(handle)
    }

    fn thread_flags_wait(
        &self,
        thread: ThreadHandle,
        flags: Signals,
        mode: WaitMode,
    ) -> Result<Signals> {
        self.flags(thread)?.wait(flags, mode)
    }

    fn thread_flags_set(&self, thread: ThreadHandle, flags: Signals) -> Result<Signals> {
        self.flags(thread)?.set(flags)
    }

    fn thread_flags_clear(&self, thread: ThreadHandle, flags: Signals) -> Signals {
        match self.flags(thread) {
            Ok(register) => register.clear(flags),
            Err(e) => {
                warn!("host: clear on {}: {e}", thread.raw());
                Signals::empty()
            }
        }
    }
}

thread_local! {
    static CURRENT_IRQ: Cell<Option<u32>> = const { Cell::new(None) };
}

#[derive(Default)]
struct MaskState {
    depth: u32,
    servicing: bool,
}

/// [`Interrupts`] implementation emulating interrupt context on the calling thread.
///
/// The mask is process wide: while any thread holds it, [`HostInterrupts::raise`]
/// waits, and while an interrupt is serviced, other threads trying to mask wait
/// for the handler to return.
pub struct HostInterrupts {
    mask: Mutex<MaskState>,
    condvar: Condvar,
}

impl Default for HostInterrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl HostInterrupts {
    /// Creates an unmasked interrupt controller.
    #[must_use]
    pub fn new() -> Self {
        HostInterrupts {
            mask: Mutex::new(MaskState::default()),
            condvar: Condvar::new(),
        }
    }

    /// Runs `handler` as the service routine of interrupt `irq`.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the mask lock is poisoned.
    pub fn raise<R>(&self, irq: u32, handler: impl FnOnce() -> R) -> Result<R> {
        {
            let guard = lock!(self.mask);
            let mut state = self
                .condvar
                .wait_while(guard, |s| s.depth > 0 || s.servicing)
                .map_err(|_| Error::LockError)?;
            state.servicing = true;
        }

        let previous = CURRENT_IRQ.with(|c| c.replace(Some(irq)));
        let result = handler();
        CURRENT_IRQ.with(|c| c.set(previous));

        let mut state = lock!(self.mask);
        state.servicing = false;
        self.condvar.notify_all();
        Ok(result)
    }

    /// Returns `true` while some thread holds the global mask.
    pub fn is_masked(&self) -> bool {
        match self.mask.lock() {
            Ok(state) => state.depth > 0,
            Err(poisoned) => poisoned.into_inner().depth > 0,
        }
    }
}

impl Interrupts for HostInterrupts {
    fn global_disable(&self) {
        let in_handler = CURRENT_IRQ.with(Cell::get).is_some();
        let guard = match self.mask.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A handler already excludes other interrupts and may mask without waiting.
        let waited = self
            .condvar
            .wait_while(guard, |s| s.servicing && !in_handler);
        let mut state = match waited {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.depth += 1;
    }

    fn global_enable(&self) {
        let mut state = match self.mask.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            self.condvar.notify_all();
        }
    }

    fn current(&self) -> Option<u32> {
        CURRENT_IRQ.with(Cell::get)
    }
}
