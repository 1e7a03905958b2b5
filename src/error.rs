use thiserror::Error;

use crate::id::Id;

macro_rules! param_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvalidParameter {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidParameter {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors the framework can potentially
/// return.
///
/// The variants mirror the status codes a firmware framework reports to its modules: a request
/// is either rejected up-front (bad identifiers, wrong calling context, wrong lifecycle state)
/// or fails because a resource or an OS primitive did.
///
/// # Error Categories
///
/// ## Caller Errors
/// - [`Error::NotInitialized`] - The kernel has not been initialized yet
/// - [`Error::InvalidParameter`] - Identifiers or event flags are inconsistent
/// - [`Error::InvalidState`] - The call is not allowed in the current lifecycle state
/// - [`Error::AccessDenied`] - The call is not allowed from the current thread
/// - [`Error::HandlerContext`] - The call is not allowed from interrupt context
///
/// ## Resource and Platform Errors
/// - [`Error::NoMemory`] - The event pool or subscription table is exhausted
/// - [`Error::Os`] - A thread or flag primitive failed
/// - [`Error::Halted`] - The platform is shutting down and no longer delivers signals
/// - [`Error::LockError`] - The kernel state lock was poisoned
///
/// ## Dispatch Errors
/// - [`Error::DelayedResponseNotFound`] - No deferred response is recorded for a cookie
/// - [`Error::NotSupported`] - A module does not implement the requested handler
///
/// # Examples
///
/// ```rust
/// use scpfwk::{Error, Id};
///
/// let err = Error::DelayedResponseNotFound { id: Id::module(3), cookie: 7 };
/// assert_eq!(err.to_string(), "No delayed response for [MOD 3] with cookie 7");
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The framework component has not been initialized.
    ///
    /// Returned by every public entry point of the kernel before
    /// [`crate::Kernel::init`] completed.
    #[error("The framework has not been initialized")]
    NotInitialized,

    /// One or more parameters were invalid.
    ///
    /// The error includes the source location where the invalid parameter was
    /// detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of the rejected parameter
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Invalid parameter - {file}:{line}: {message}")]
    InvalidParameter {
        /// The message to be printed for the InvalidParameter error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The operation is not allowed in the current state.
    ///
    /// For example creating a thread once the kernel runs, or subscribing twice
    /// to the same notification.
    #[error("Invalid state - {0}")]
    InvalidState(String),

    /// The calling thread is not allowed to perform this operation.
    ///
    /// Blocking calls are refused from interrupt context, from the common thread
    /// and when the caller would wait on itself.
    #[error("Access denied - {0}")]
    AccessDenied(String),

    /// The operation cannot be performed from an interrupt handler.
    #[error("The operation is not allowed from an interrupt handler")]
    HandlerContext,

    /// A fixed-capacity table is exhausted.
    ///
    /// Capacities are sized at initialization time, running out of events or
    /// subscriptions is treated as an unrecoverable configuration fault.
    #[error("Out of memory - the fixed-capacity table is exhausted")]
    NoMemory,

    /// An OS primitive failed.
    #[error("OS primitive failed - {0}")]
    Os(String),

    /// No delayed response matches the requested cookie.
    ///
    /// The entity never deferred a response for this cookie, or the response
    /// has already been completed.
    #[error("No delayed response for {id} with cookie {cookie}")]
    DelayedResponseNotFound {
        /// The module or element that was expected to hold the response
        id: Id,
        /// The cookie of the request the response was deferred for
        cookie: u32,
    },

    /// The platform has been halted.
    ///
    /// Flag waits return this error once the OS layer shuts down, which makes
    /// every kernel thread leave its dispatch loop.
    #[error("The platform has been halted")]
    Halted,

    /// Failed to lock the kernel state.
    ///
    /// This error occurs when a thread panicked while holding the state lock.
    #[error("Failed to lock target")]
    LockError,

    /// The requested handler is not implemented by the module.
    #[error("The operation is not supported")]
    NotSupported,
}
