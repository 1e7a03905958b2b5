//! Framework identifiers.
//!
//! Every addressable thing in the framework is named by an [`Id`]: modules and
//! their elements (collectively *entities*), and the event and notification
//! kinds a module owns. Identifiers are small `Copy` values that are compared,
//! hashed and printed, but carry no reference to the objects they name; the
//! [`crate::module::ModuleRegistry`] decides whether an identifier is valid.
//!
//! # Display Format
//!
//! Identifiers print in a bracketed form that keeps log lines short:
//!
//! | Identifier | Output |
//! |------------|--------|
//! | `Id::module(2)` | `[MOD 2]` |
//! | `Id::element(2, 1)` | `[ELM 2:1]` |
//! | `Id::event(2, 7)` | `[EVT 2:7]` |
//! | `Id::notification(9, 12)` | `[NOT 9:12]` |
//! | `Id::None` | `[NON]` |
//!
//! The same form parses back, which lets tools feed identifiers copied from
//! logs into the kernel:
//!
//! ```rust
//! use scpfwk::Id;
//!
//! let id: Id = "[ELM 2:1]".parse()?;
//! assert_eq!(id, Id::element(2, 1));
//! # Ok::<(), scpfwk::Error>(())
//! ```

use std::{fmt, str::FromStr};

use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::{Error, Result};

/// The category of an [`Id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum IdKind {
    /// The identifier does not name anything.
    None,
    /// A module.
    Module,
    /// An element of a module.
    Element,
    /// An event kind owned by a module.
    Event,
    /// A notification kind owned by a module.
    Notification,
}

impl IdKind {
    /// Returns the three-letter tag used when printing identifiers of this kind.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            IdKind::None => "NON",
            IdKind::Module => "MOD",
            IdKind::Element => "ELM",
            IdKind::Event => "EVT",
            IdKind::Notification => "NOT",
        }
    }
}

/// Identifier of a module, element, event or notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Id {
    /// No identifier.
    #[default]
    None,
    /// A module, by index in the module registry.
    Module {
        /// Module index
        module: u32,
    },
    /// An element of a module.
    Element {
        /// Module index
        module: u32,
        /// Element index within the module
        element: u32,
    },
    /// An event kind owned by a module.
    Event {
        /// Index of the module that owns the event
        module: u32,
        /// Event index within the module
        event: u32,
    },
    /// A notification kind owned by a module.
    Notification {
        /// Index of the module that owns the notification
        module: u32,
        /// Notification index within the module
        notification: u32,
    },
}

impl Id {
    /// Builds a module identifier.
    #[must_use]
    pub const fn module(module: u32) -> Self {
        Id::Module { module }
    }

    /// Builds an element identifier.
    #[must_use]
    pub const fn element(module: u32, element: u32) -> Self {
        Id::Element { module, element }
    }

    /// Builds an event identifier.
    #[must_use]
    pub const fn event(module: u32, event: u32) -> Self {
        Id::Event { module, event }
    }

    /// Builds a notification identifier.
    #[must_use]
    pub const fn notification(module: u32, notification: u32) -> Self {
        Id::Notification {
            module,
            notification,
        }
    }

    /// Returns the category of the identifier.
    #[must_use]
    pub const fn kind(&self) -> IdKind {
        match self {
            Id::None => IdKind::None,
            Id::Module { .. } => IdKind::Module,
            Id::Element { .. } => IdKind::Element,
            Id::Event { .. } => IdKind::Event,
            Id::Notification { .. } => IdKind::Notification,
        }
    }

    /// Returns the index of the module the identifier belongs to, `None` for [`Id::None`].
    #[must_use]
    pub const fn module_idx(&self) -> Option<u32> {
        match *self {
            Id::None => None,
            Id::Module { module }
            | Id::Element { module, .. }
            | Id::Event { module, .. }
            | Id::Notification { module, .. } => Some(module),
        }
    }

    /// Returns the identifier of the module the identifier belongs to.
    #[must_use]
    pub const fn to_module_id(&self) -> Id {
        match self.module_idx() {
            Some(module) => Id::Module { module },
            None => Id::None,
        }
    }

    /// Returns `true` for module and element identifiers.
    #[must_use]
    pub const fn is_entity(&self) -> bool {
        matches!(self, Id::Module { .. } | Id::Element { .. })
    }

    /// Returns `true` when both identifiers belong to the same module.
    #[must_use]
    pub fn same_module(&self, other: &Id) -> bool {
        match (self.module_idx(), other.module_idx()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.kind().tag();
        match *self {
            Id::None => write!(f, "[{tag}]"),
            Id::Module { module } => write!(f, "[{tag} {module}]"),
            Id::Element { module, element } => write!(f, "[{tag} {module}:{element}]"),
            Id::Event { module, event } => write!(f, "[{tag} {module}:{event}]"),
            Id::Notification {
                module,
                notification,
            } => write!(f, "[{tag} {module}:{notification}]"),
        }
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let inner = s
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| param_error!("malformed identifier {}", s))?;
        let (tag, indices) = inner.split_once(' ').unwrap_or((inner, ""));

        let kind = IdKind::iter()
            .find(|kind| kind.tag() == tag)
            .ok_or_else(|| param_error!("unknown identifier kind in {}", s))?;

        let number = |text: &str| {
            text.parse::<u32>()
                .map_err(|_| param_error!("bad index {:?} in {}", text, s))
        };
        let pair = || -> Result<(u32, u32)> {
            let (module, sub) = indices
                .split_once(':')
                .ok_or_else(|| param_error!("{} needs a module:index pair", s))?;
            Ok((number(module)?, number(sub)?))
        };

        match kind {
            IdKind::None if indices.is_empty() => Ok(Id::None),
            IdKind::None => Err(param_error!("{} takes no index", s)),
            IdKind::Module => Ok(Id::module(number(indices)?)),
            IdKind::Element => pair().map(|(m, e)| Id::element(m, e)),
            IdKind::Event => pair().map(|(m, e)| Id::event(m, e)),
            IdKind::Notification => pair().map(|(m, n)| Id::notification(m, n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Id::None.to_string(), "[NON]");
        assert_eq!(Id::module(2).to_string(), "[MOD 2]");
        assert_eq!(Id::element(2, 1).to_string(), "[ELM 2:1]");
        assert_eq!(Id::event(2, 7).to_string(), "[EVT 2:7]");
        assert_eq!(Id::notification(9, 12).to_string(), "[NOT 9:12]");
    }

    #[test]
    fn test_module_resolution() {
        assert_eq!(Id::element(4, 3).to_module_id(), Id::module(4));
        assert_eq!(Id::event(6, 9).module_idx(), Some(6));
        assert_eq!(Id::None.to_module_id(), Id::None);
        assert!(Id::event(6, 9).same_module(&Id::module(6)));
        assert!(!Id::event(6, 9).same_module(&Id::module(5)));
        assert!(!Id::None.same_module(&Id::None));
    }

    #[test]
    fn test_entities() {
        assert!(Id::module(0).is_entity());
        assert!(Id::element(0, 0).is_entity());
        assert!(!Id::event(0, 0).is_entity());
        assert!(!Id::notification(0, 0).is_entity());
        assert!(!Id::None.is_entity());
    }

    #[test]
    fn test_kind_tags_are_unique() {
        let tags: Vec<_> = IdKind::iter().map(IdKind::tag).collect();
        assert_eq!(tags.len(), IdKind::COUNT);
        for (i, tag) in tags.iter().enumerate() {
            assert_eq!(tag.len(), 3);
            assert!(!tags[i + 1..].contains(tag));
        }
    }

    #[test]
    fn test_parse_log_form() {
        let ids = [
            Id::None,
            Id::module(2),
            Id::element(2, 1),
            Id::event(2, 7),
            Id::notification(9, 12),
        ];
        for id in ids {
            assert_eq!(id.to_string().parse::<Id>().unwrap(), id);
        }
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        for text in ["MOD 1", "[MOD 2:1]", "[XYZ 1]", "[ELM 2]", "[EVT a:1]", "[NON 0]", "[MOD]"] {
            assert!(
                matches!(text.parse::<Id>(), Err(Error::InvalidParameter { .. })),
                "{text} should not parse"
            );
        }
    }
}
