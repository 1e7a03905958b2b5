// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # scpfwk
//!
//! A cooperative multi-threaded event-dispatch kernel for system control
//! processor firmware frameworks.
//!
//! Firmware is split into **modules**, each owning a number of **elements**.
//! Modules talk to each other exclusively through fixed-size **events**, and a
//! module may broadcast **notifications** to the entities that subscribed to
//! them. The kernel owns the event records, routes every event to the kernel
//! thread its target is bound to, and guarantees that at most one handler runs
//! at any time.
//!
//! ## Features
//!
//! - **Bounded memory** - Events live in a fixed pool sized at initialization
//! - **Cooperative threads** - A baton is handed from thread to thread, handlers never preempt each other
//! - **Interrupt-safe submission** - Events can be put from interrupt context
//! - **Synchronous requests** - A worker can block on a request with [`Kernel::put_event_and_wait`]
//! - **Delayed responses** - Handlers can defer a response and complete it later
//! - **Portable** - The OS and the interrupt controller are traits, [`os::host`] runs on `std::thread`
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use scpfwk::prelude::*;
//! use scpfwk::os::host::{HostInterrupts, HostOs};
//!
//! struct Timer;
//!
//! impl EventHandler for Timer {
//!     fn process_event(&self, _: &Kernel, _: &Event, response: &mut Event) -> Result<()> {
//!         response.set_param_u32(0, 1000);
//!         Ok(())
//!     }
//! }
//!
//! let mut modules = ModuleRegistry::new();
//! let timer = modules.register(ModuleDesc::new("timer", Arc::new(Timer)).with_events(1));
//!
//! let os = Arc::new(HostOs::new());
//! let interrupts = Arc::new(HostInterrupts::new());
//! let kernel = Kernel::init(KernelConfig::default(), modules, os.clone(), interrupts.clone())?;
//! kernel.run()?;
//!
//! let mut tick = Event::new(Id::event(0, 0), timer, timer);
//! interrupts.raise(7, || kernel.put_event(&mut tick))??;
//!
//! os.halt();
//! os.join()?;
//! # Ok::<(), scpfwk::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`id`] - Identifiers of modules, elements, events and notifications
//! - [`event`] - The event record
//! - [`module`] - Module descriptors and the [`module::EventHandler`] trait
//! - [`thread`] - The dispatch kernel
//! - [`notification`] - Subscriptions and notification fan-out
//! - [`os`] - Platform traits and the host implementation
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result):
//!
//! ```rust
//! use scpfwk::{Error, Id};
//!
//! let err = Error::DelayedResponseNotFound { id: Id::module(1), cookie: 3 };
//! match err {
//!     Error::NotInitialized => println!("kernel not initialized"),
//!     Error::InvalidParameter { message, .. } => println!("bad parameter: {}", message),
//!     e => println!("other error: {}", e),
//! }
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use scpfwk::prelude::*;
///
/// let id = Id::element(2, 1);
/// assert_eq!(id.to_module_id(), Id::module(2));
/// ```
pub mod prelude;

/// Kernel configuration and its defaults.
pub mod config;

/// The event record exchanged between modules.
pub mod event;

/// Identifiers of modules, elements, events and notifications.
pub mod id;

/// Module descriptors, the module registry and the [`module::EventHandler`] trait.
pub mod module;

pub mod notification;

pub mod os;

pub mod thread;

/// Internal helpers shared across the kernel and the host platform.
pub mod utils;

/// `scpfwk` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `scpfwk` Error type
///
/// The error type of every fallible operation of the kernel and of the handlers it runs.
pub use error::Error;

/// The dispatch kernel and its statistics snapshot.
pub use thread::{Kernel, KernelStats};

pub use event::{Event, EVENT_PARAMS_SIZE};

pub use id::{Id, IdKind};

pub use config::KernelConfig;

pub use module::{EventHandler, ModuleDesc, ModuleRegistry};
