//! Synchronization primitives backing the host platform.

pub mod synchronization;
