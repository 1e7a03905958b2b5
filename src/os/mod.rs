//! Platform primitives consumed by the kernel.
//!
//! The kernel never creates threads or blocks on its own. It drives an [`Os`]
//! implementation for thread creation and per-thread signal flags, and an
//! [`Interrupts`] implementation for the global interrupt mask and for telling
//! interrupt context apart from thread context.
//!
//! # Signals
//!
//! Every kernel thread owns a flag register. Four bits are used:
//!
//! | Signal | Waited on by | Meaning |
//! |--------|--------------|---------|
//! | [`Signals::ISR_EVENT`] | common thread | an interrupt queued an event |
//! | [`Signals::EVENT_TO_PROCESS`] | all threads | the thread holds the baton |
//! | [`Signals::EVENT_PROCESSED`] | blocked caller | its synchronous request completed |
//! | [`Signals::NO_READY_THREAD`] | common thread | nothing is ready, go back to interrupts |
//!
//! A wait that returns [`crate::Error::Halted`] makes the kernel thread leave its
//! dispatch loop; this is how a platform shuts the kernel down.
//!
//! # Implementations
//!
//! - [`host::HostOs`] and [`host::HostInterrupts`] run the kernel on `std::thread`.

pub mod host;

use bitflags::bitflags;

use crate::Result;

bitflags! {
    /// Signal bits exchanged between kernel threads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Signals: u32 {
        /// An interrupt queued an event for the common thread.
        const ISR_EVENT = 0x01;
        /// The receiving thread has an event to process.
        const EVENT_TO_PROCESS = 0x02;
        /// The synchronous request of the receiving thread completed.
        const EVENT_PROCESSED = 0x04;
        /// No thread is ready, the common thread returns to its interrupt wait.
        const NO_READY_THREAD = 0x08;
    }
}

impl Signals {
    /// Returns `true` when exactly one bit is set.
    #[must_use]
    pub fn is_single(self) -> bool {
        self.bits().is_power_of_two()
    }
}

/// How a flag wait matches the requested bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Return as soon as any requested bit is set.
    Any,
    /// Return once every requested bit is set.
    All,
}

/// Opaque handle of an OS thread created through [`Os::thread_new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle(usize);

impl ThreadHandle {
    /// Wraps a platform specific thread number.
    #[must_use]
    pub const fn new(raw: usize) -> Self {
        ThreadHandle(raw)
    }

    /// Returns the platform specific thread number.
    #[must_use]
    pub const fn raw(self) -> usize {
        self.0
    }
}

/// Attributes of a thread requested from the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadAttr {
    /// Thread name
    pub name: String,
    /// Requested stack size in bytes
    pub stack_size: usize,
    /// Priority hint, `None` for the platform default
    pub priority: Option<u8>,
}

/// Entry function of a kernel thread.
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Thread and signal primitives of the underlying OS.
///
/// Flag waits are always issued by the thread identified by the `thread`
/// argument. Set bits stay set until a wait returns them, so a signal raised
/// before the receiver starts waiting is not lost.
pub trait Os: Send + Sync {
    /// Prepares the OS for thread creation.
    ///
    /// # Errors
    /// Returns [`crate::Error::Os`] when the OS cannot be initialized.
    fn kernel_initialize(&self) -> Result<()>;

    /// Starts scheduling the created threads.
    ///
    /// # Errors
    /// Returns [`crate::Error::Os`] when the OS cannot be started.
    fn kernel_start(&self) -> Result<()>;

    /// Creates a thread that runs `entry` once the OS has been started.
    ///
    /// # Errors
    /// Returns [`crate::Error::Os`] when the thread cannot be created.
    fn thread_new(&self, attr: &ThreadAttr, entry: ThreadEntry) -> Result<ThreadHandle>;

    /// Blocks `thread` until `flags` match according to `mode`.
    ///
    /// The matched bits are cleared and returned.
    ///
    /// # Errors
    /// Returns [`crate::Error::Halted`] once the OS shuts down.
    fn thread_flags_wait(
        &self,
        thread: ThreadHandle,
        flags: Signals,
        mode: WaitMode,
    ) -> Result<Signals>;

    /// Sets `flags` on `thread` and returns the resulting flags.
    ///
    /// # Errors
    /// Returns an error when the thread cannot be signalled.
    fn thread_flags_set(&self, thread: ThreadHandle, flags: Signals) -> Result<Signals>;

    /// Clears `flags` on `thread` and returns the flags before clearing.
    fn thread_flags_clear(&self, thread: ThreadHandle, flags: Signals) -> Signals;
}

/// Interrupt primitives of the underlying platform.
pub trait Interrupts: Send + Sync {
    /// Masks interrupts. Calls nest.
    fn global_disable(&self);

    /// Unmasks interrupts once every [`Interrupts::global_disable`] has been matched.
    fn global_enable(&self);

    /// Returns the number of the interrupt being serviced by the caller, or
    /// `None` in thread context.
    fn current(&self) -> Option<u32>;

    /// Returns `true` when called from interrupt context.
    fn in_interrupt(&self) -> bool {
        self.current().is_some()
    }
}

/// Interrupts are masked for the lifetime of this guard.
pub struct CriticalSection<'a> {
    interrupts: &'a dyn Interrupts,
}

impl<'a> CriticalSection<'a> {
    /// Masks interrupts until the returned guard is dropped.
    pub fn enter(interrupts: &'a dyn Interrupts) -> Self {
        interrupts.global_disable();
        CriticalSection { interrupts }
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        self.interrupts.global_enable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::MockInterrupts;

    #[test]
    fn test_signal_bits() {
        assert_eq!(Signals::ISR_EVENT.bits(), 0x01);
        assert_eq!(Signals::EVENT_TO_PROCESS.bits(), 0x02);
        assert_eq!(Signals::EVENT_PROCESSED.bits(), 0x04);
        assert_eq!(Signals::NO_READY_THREAD.bits(), 0x08);

        assert!(Signals::NO_READY_THREAD.is_single());
        assert!(!(Signals::EVENT_TO_PROCESS | Signals::NO_READY_THREAD).is_single());
        assert!(!Signals::empty().is_single());
    }

    #[test]
    fn test_critical_section_balances_mask() {
        let interrupts = MockInterrupts::new();
        {
            let _outer = CriticalSection::enter(&interrupts);
            assert_eq!(interrupts.mask_depth(), 1);
            {
                let _inner = CriticalSection::enter(&interrupts);
                assert_eq!(interrupts.mask_depth(), 2);
            }
            assert_eq!(interrupts.mask_depth(), 1);
        }
        assert_eq!(interrupts.mask_depth(), 0);
        assert_eq!(interrupts.disable_count(), 2);
    }
}
