//! Test helpers shared by the inline unit tests.
//!
//! - [`MockOs`] records every flag wait and set, answers waits from a script
//!   and halts once the script is exhausted, so dispatch loops return.
//! - [`MockInterrupts`] counts masking and fakes interrupt context.
//! - [`RecordingHandler`] records the events it handles and can be told how to
//!   respond.
//! - [`KernelFixture`] wires them into an initialized kernel.

mod mock;

pub use fixture::{two_module_registry, KernelFixture};
pub use mock::{MockInterrupts, MockOs, RecordingHandler, WaitCall};
