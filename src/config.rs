//! Kernel configuration.
//!
//! All capacities of the kernel are fixed when it is initialized. Running out
//! of pool events or notification subscriptions at runtime is reported as
//! [`crate::Error::NoMemory`] and treated as a configuration fault.

/// Default number of events in the event pool.
pub const DEFAULT_EVENT_COUNT: usize = 64;
/// Default number of notification subscriptions.
pub const DEFAULT_NOTIFICATION_COUNT: usize = 32;
/// Default stack size requested for every kernel thread.
pub const DEFAULT_THREAD_STACK_SIZE: usize = 64 * 1024;

/// Configuration of a [`crate::Kernel`].
///
/// # Examples
///
/// ```rust
/// use scpfwk::KernelConfig;
///
/// let config = KernelConfig::default()
///     .with_event_count(16)
///     .with_thread_name_prefix("scp");
/// assert_eq!(config.event_count, 16);
/// assert_eq!(config.notification_count, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Capacity of the event pool.
    pub event_count: usize,
    /// Capacity of the notification subscription table.
    pub notification_count: usize,
    /// Stack size passed to the OS for every kernel thread.
    pub thread_stack_size: usize,
    /// Prefix of the OS thread names; threads are named `<prefix>-common` and
    /// `<prefix>-<entity>`.
    pub thread_name_prefix: String,
    /// Priority hint passed to the OS, `None` keeps the platform default.
    /// [`crate::os::host::HostOs`] ignores it.
    pub thread_priority: Option<u8>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            event_count: DEFAULT_EVENT_COUNT,
            notification_count: DEFAULT_NOTIFICATION_COUNT,
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
            thread_name_prefix: "fwk".to_string(),
            thread_priority: None,
        }
    }
}

impl KernelConfig {
    /// Sets the capacity of the event pool.
    #[must_use]
    pub fn with_event_count(mut self, count: usize) -> Self {
        self.event_count = count;
        self
    }

    /// Sets the capacity of the notification subscription table.
    #[must_use]
    pub fn with_notification_count(mut self, count: usize) -> Self {
        self.notification_count = count;
        self
    }

    /// Sets the stack size of kernel threads.
    #[must_use]
    pub fn with_thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = size;
        self
    }

    /// Sets the prefix of kernel thread names.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the priority hint of kernel threads.
    ///
    /// Only honored by platforms that schedule by priority. The host platform
    /// ignores it.
    #[must_use]
    pub fn with_thread_priority(mut self, priority: u8) -> Self {
        self.thread_priority = Some(priority);
        self
    }
}
