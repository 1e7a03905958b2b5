//! Synchronization primitives backing the hosted platform.
//!
//! # Key Components
//!
//! - [`FlagRegister`] - A condition-variable guarded bit register with any/all waits
//! - [`StartGate`] - A one-shot latch that releases threads once the kernel starts
//!
//! Both primitives can be halted. A halted primitive unblocks every waiter with
//! [`crate::Error::Halted`] and refuses further waits, so threads parked on them
//! never hang once the platform shuts down.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Condvar, Mutex,
};

use crate::{
    os::{Signals, WaitMode},
    Error, Result,
};

/// A register of signal bits one thread waits on and any thread sets.
///
/// Bits stay set until a wait consumes them. A wait returns the bits it
/// matched and clears exactly those, leaving unrelated bits pending.
///
/// # Examples
///
/// ```rust
/// use scpfwk::os::{Signals, WaitMode};
/// use scpfwk::utils::synchronization::FlagRegister;
///
/// let flags = FlagRegister::new();
/// flags.set(Signals::EVENT_TO_PROCESS).unwrap();
///
/// let matched = flags
///     .wait(Signals::EVENT_TO_PROCESS | Signals::NO_READY_THREAD, WaitMode::Any)
///     .unwrap();
/// assert_eq!(matched, Signals::EVENT_TO_PROCESS);
/// assert!(flags.peek().is_empty());
/// ```
pub struct FlagRegister {
    /// Currently raised bits
    bits: Mutex<Signals>,
    /// Whether the register has been halted
    halted: AtomicBool,
    /// Condition variable for blocking/waking the owner
    condvar: Condvar,
}

impl Default for FlagRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl FlagRegister {
    /// Creates a register with no bit set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bits: Mutex::new(Signals::empty()),
            halted: AtomicBool::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Raises `flags` and wakes the waiter. Returns the bits now set.
    ///
    /// # Errors
    /// Returns [`Error::Halted`] when the register has been halted.
    pub fn set(&self, flags: Signals) -> Result<Signals> {
        if self.is_halted() {
            return Err(Error::Halted);
        }

        let mut bits = lock!(self.bits);
        bits.insert(flags);
        let current = *bits;
        self.condvar.notify_all();
        Ok(current)
    }

    /// Lowers `flags`. Returns the bits that were set before.
    pub fn clear(&self, flags: Signals) -> Signals {
        let mut bits = match self.bits.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = *bits;
        bits.remove(flags);
        previous
    }

    /// Returns the bits currently set without consuming them.
    pub fn peek(&self) -> Signals {
        match self.bits.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Blocks until `flags` match according to `mode`, then consumes and
    /// returns the matched bits.
    ///
    /// # Errors
    /// Returns [`Error::Halted`] when the register is halted before or while waiting.
    pub fn wait(&self, flags: Signals, mode: WaitMode) -> Result<Signals> {
        let guard = lock!(self.bits);
        let mut bits = self
            .condvar
            .wait_while(guard, |bits| {
                !self.halted.load(Ordering::Acquire) && !Self::matches(*bits, flags, mode)
            })
            .map_err(|_| Error::LockError)?;

        if self.halted.load(Ordering::Acquire) {
            return Err(Error::Halted);
        }

        let matched = bits.intersection(flags);
        bits.remove(matched);
        Ok(matched)
    }

    /// Unblocks the waiter with [`Error::Halted`] and refuses further use.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        // Taking the lock orders the store before a waiter re-checks its predicate.
        let _guard = self.bits.lock();
        self.condvar.notify_all();
    }

    /// Returns `true` once [`FlagRegister::halt`] has been called.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    fn matches(bits: Signals, flags: Signals, mode: WaitMode) -> bool {
        match mode {
            WaitMode::Any => bits.intersects(flags),
            WaitMode::All => bits.contains(flags),
        }
    }
}

/// A latch that keeps threads parked until it is opened or halted.
pub struct StartGate {
    /// Whether the gate has been opened
    open: Mutex<bool>,
    /// Whether the gate has been halted
    halted: AtomicBool,
    /// Condition variable for blocking/waking parked threads
    condvar: Condvar,
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StartGate {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            open: Mutex::new(false),
            halted: AtomicBool::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Releases every current and future waiter.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the gate lock is poisoned.
    pub fn open(&self) -> Result<()> {
        let mut open = lock!(self.open);
        *open = true;
        self.condvar.notify_all();
        Ok(())
    }

    /// Blocks until the gate is opened.
    ///
    /// # Errors
    /// Returns [`Error::Halted`] if the gate is halted first.
    pub fn wait(&self) -> Result<()> {
        let guard = lock!(self.open);
        let _open = self
            .condvar
            .wait_while(guard, |open| {
                !*open && !self.halted.load(Ordering::Acquire)
            })
            .map_err(|_| Error::LockError)?;

        if self.halted.load(Ordering::Acquire) {
            return Err(Error::Halted);
        }
        Ok(())
    }

    /// Unblocks parked threads with [`Error::Halted`].
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        let _guard = self.open.lock();
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_any_consumes_only_matched_bits() {
        let flags = FlagRegister::new();
        flags
            .set(Signals::EVENT_TO_PROCESS | Signals::ISR_EVENT)
            .unwrap();

        let matched = flags
            .wait(
                Signals::EVENT_TO_PROCESS | Signals::NO_READY_THREAD,
                WaitMode::Any,
            )
            .unwrap();
        assert_eq!(matched, Signals::EVENT_TO_PROCESS);
        assert_eq!(flags.peek(), Signals::ISR_EVENT);
    }

    #[test]
    fn test_wait_all_blocks_until_complete() {
        let flags = Arc::new(FlagRegister::new());
        let wanted = Signals::EVENT_TO_PROCESS | Signals::NO_READY_THREAD;
        flags.set(Signals::EVENT_TO_PROCESS).unwrap();

        let flags_clone = Arc::clone(&flags);
        let handle = thread::spawn(move || flags_clone.wait(wanted, WaitMode::All));

        thread::sleep(Duration::from_millis(10));
        assert!(!handle.is_finished());

        flags.set(Signals::NO_READY_THREAD).unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), wanted);
        assert!(flags.peek().is_empty());
    }

    #[test]
    fn test_set_before_wait_is_not_lost() {
        let flags = FlagRegister::new();
        flags.set(Signals::EVENT_PROCESSED).unwrap();
        assert_eq!(
            flags.wait(Signals::EVENT_PROCESSED, WaitMode::All).unwrap(),
            Signals::EVENT_PROCESSED
        );
    }

    #[test]
    fn test_clear_returns_previous_bits() {
        let flags = FlagRegister::new();
        flags.set(Signals::ISR_EVENT).unwrap();
        assert_eq!(flags.clear(Signals::all()), Signals::ISR_EVENT);
        assert!(flags.peek().is_empty());
    }

    #[test]
    fn test_halt_unblocks_waiter() {
        let flags = Arc::new(FlagRegister::new());
        let flags_clone = Arc::clone(&flags);
        let handle =
            thread::spawn(move || flags_clone.wait(Signals::ISR_EVENT, WaitMode::All));

        thread::sleep(Duration::from_millis(10));
        flags.halt();

        assert!(matches!(handle.join().unwrap(), Err(Error::Halted)));
        assert!(matches!(flags.set(Signals::ISR_EVENT), Err(Error::Halted)));
        assert!(flags.is_halted());
    }

    #[test]
    fn test_gate_releases_after_open() {
        let gate = Arc::new(StartGate::new());
        let gate_clone = Arc::clone(&gate);
        let handle = thread::spawn(move || gate_clone.wait());

        thread::sleep(Duration::from_millis(10));
        assert!(!handle.is_finished());

        gate.open().unwrap();
        assert!(handle.join().unwrap().is_ok());
        assert!(gate.wait().is_ok());
    }

    #[test]
    fn test_gate_halt() {
        let gate = StartGate::new();
        gate.halt();
        assert!(matches!(gate.wait(), Err(Error::Halted)));
    }
}
