//! # scpfwk Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the kernel. Import this module to get quick access to everything a module
//! implementation needs.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all scpfwk operations
pub use crate::Error;

/// The result type used throughout scpfwk
pub use crate::Result;

/// Kernel configuration
pub use crate::KernelConfig;

// ================================================================================================
// Kernel
// ================================================================================================

/// The dispatch kernel and its statistics snapshot
pub use crate::{Kernel, KernelStats};

// ================================================================================================
// Modules and Events
// ================================================================================================

/// Identifiers
pub use crate::{Id, IdKind};

/// The event record
pub use crate::{Event, EVENT_PARAMS_SIZE};

/// Module descriptors and handlers
pub use crate::{EventHandler, ModuleDesc, ModuleRegistry};

// ================================================================================================
// Platform
// ================================================================================================

/// Platform traits and their vocabulary
pub use crate::os::{
    CriticalSection, Interrupts, Os, Signals, ThreadAttr, ThreadEntry, ThreadHandle, WaitMode,
};
