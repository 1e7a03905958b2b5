//! Module registry and event handler interface.
//!
//! Modules are registered once, before the kernel is initialized, and the
//! registry is immutable afterwards. Each module declares how many elements,
//! events and notifications it owns; these counts define which identifiers are
//! valid. The kernel resolves the handler of an event from the module index of
//! its target.

use std::{fmt, sync::Arc};

use crate::{event::Event, id::Id, thread::Kernel, Error, Result};

/// Behaviour of a module.
///
/// Handlers run on the kernel thread bound to the target entity, without any
/// kernel lock held, and run to completion. They may call back into the kernel
/// (for example [`Kernel::put_event`]) through the `kernel` argument.
///
/// When the processed event has `response_requested` set, `response` is
/// pre-filled with the response shell (addressing swapped, parameters copied).
/// The handler fills in the parameters, or sets `is_delayed_response` to answer
/// later through [`Kernel::get_delayed_response`]. Otherwise `response` is a
/// scratch value that is discarded.
///
/// The returned status is logged but does not change how the event is dispatched.
pub trait EventHandler: Send + Sync {
    /// Processes an event addressed to the module or one of its elements.
    ///
    /// # Errors
    /// Any error is logged by the dispatcher.
    fn process_event(&self, kernel: &Kernel, event: &Event, response: &mut Event) -> Result<()>;

    /// Processes a notification the module subscribed to.
    ///
    /// # Errors
    /// The default implementation returns [`Error::NotSupported`].
    fn process_notification(
        &self,
        kernel: &Kernel,
        event: &Event,
        response: &mut Event,
    ) -> Result<()> {
        let _ = (kernel, event, response);
        Err(Error::NotSupported)
    }
}

/// Description of a module.
#[derive(Clone)]
pub struct ModuleDesc {
    /// Name used in logs and thread names
    pub name: String,
    /// Number of elements of the module
    pub element_count: u32,
    /// Number of event kinds the module owns
    pub event_count: u32,
    /// Number of notification kinds the module owns
    pub notification_count: u32,
    /// Event handler
    pub handler: Arc<dyn EventHandler>,
}

impl fmt::Debug for ModuleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDesc")
            .field("name", &self.name)
            .field("element_count", &self.element_count)
            .field("event_count", &self.event_count)
            .field("notification_count", &self.notification_count)
            .finish_non_exhaustive()
    }
}

impl ModuleDesc {
    /// Creates a module without elements, events or notifications.
    pub fn new(name: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        ModuleDesc {
            name: name.into(),
            element_count: 0,
            event_count: 0,
            notification_count: 0,
            handler,
        }
    }

    /// Sets the number of elements.
    #[must_use]
    pub fn with_elements(mut self, count: u32) -> Self {
        self.element_count = count;
        self
    }

    /// Sets the number of event kinds.
    #[must_use]
    pub fn with_events(mut self, count: u32) -> Self {
        self.event_count = count;
        self
    }

    /// Sets the number of notification kinds.
    #[must_use]
    pub fn with_notifications(mut self, count: u32) -> Self {
        self.notification_count = count;
        self
    }
}

/// Modules known to the kernel, indexed by module index.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use scpfwk::prelude::*;
///
/// struct Timer;
///
/// impl EventHandler for Timer {
///     fn process_event(&self, _: &Kernel, _: &Event, _: &mut Event) -> Result<()> {
///         Ok(())
///     }
/// }
///
/// let mut registry = ModuleRegistry::new();
/// let timer = registry.register(ModuleDesc::new("timer", Arc::new(Timer)).with_elements(2).with_events(1));
///
/// assert_eq!(timer, Id::module(0));
/// assert!(registry.is_valid_element_id(Id::element(0, 1)));
/// assert!(!registry.is_valid_element_id(Id::element(0, 2)));
/// assert!(registry.is_valid_event_id(Id::event(0, 0)));
/// ```
#[derive(Debug, Default, Clone)]
pub struct ModuleRegistry {
    modules: Vec<ModuleDesc>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module and returns its identifier.
    pub fn register(&mut self, desc: ModuleDesc) -> Id {
        let idx = self.modules.len() as u32;
        self.modules.push(desc);
        Id::module(idx)
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` when no module is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn desc(&self, module: u32) -> Option<&ModuleDesc> {
        self.modules.get(module as usize)
    }

    /// Returns `true` if `id` names a registered module.
    #[must_use]
    pub fn is_valid_module_id(&self, id: Id) -> bool {
        matches!(id, Id::Module { module } if self.desc(module).is_some())
    }

    /// Returns `true` if `id` names an element of a registered module.
    #[must_use]
    pub fn is_valid_element_id(&self, id: Id) -> bool {
        match id {
            Id::Element { module, element } => self
                .desc(module)
                .is_some_and(|desc| element < desc.element_count),
            _ => false,
        }
    }

    /// Returns `true` if `id` names a registered module or one of its elements.
    #[must_use]
    pub fn is_valid_entity_id(&self, id: Id) -> bool {
        self.is_valid_module_id(id) || self.is_valid_element_id(id)
    }

    /// Returns `true` if `id` names an event kind of a registered module.
    #[must_use]
    pub fn is_valid_event_id(&self, id: Id) -> bool {
        match id {
            Id::Event { module, event } => {
                self.desc(module).is_some_and(|desc| event < desc.event_count)
            }
            _ => false,
        }
    }

    /// Returns `true` if `id` names a notification kind of a registered module.
    #[must_use]
    pub fn is_valid_notification_id(&self, id: Id) -> bool {
        match id {
            Id::Notification {
                module,
                notification,
            } => self
                .desc(module)
                .is_some_and(|desc| notification < desc.notification_count),
            _ => false,
        }
    }

    /// Returns the handler of the module `id` belongs to.
    #[must_use]
    pub fn handler(&self, id: Id) -> Option<&dyn EventHandler> {
        self.desc(id.module_idx()?).map(|desc| desc.handler.as_ref())
    }

    /// Returns the name of the module `id` belongs to.
    #[must_use]
    pub fn name(&self, id: Id) -> Option<&str> {
        self.desc(id.module_idx()?).map(|desc| desc.name.as_str())
    }
}
