//! Event trait and the kind tag used for routing.

use serde::Serialize;
use std::fmt::{self, Debug};

/// Routing tag of an event.
///
/// Each event variant maps to one constant kind; steps declare the kinds they
/// consume and emit, and the engine's dispatch table is keyed by them.
///
/// # Examples
///
/// ```
/// use musubi_core::EventKind;
///
/// const PARSED: EventKind = EventKind::new("Parsed");
/// assert_eq!(PARSED.as_str(), "Parsed");
/// assert_eq!(PARSED.to_string(), "Parsed");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventKind(&'static str);

impl EventKind {
    /// Creates a new EventKind.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the kind as a string slice.
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl From<&'static str> for EventKind {
    fn from(s: &'static str) -> Self {
        Self(s)
    }
}

/// An immutable value routed between steps.
///
/// Usually implemented by a single enum per workflow, one variant per kind.
/// Steps never mutate the events they receive; they build new ones. Events
/// are cloned when several steps consume the same kind.
///
/// # Examples
///
/// ```
/// use musubi_core::{Event, EventKind};
///
/// #[derive(Debug, Clone)]
/// enum OrderEvent {
///     Placed { id: u64 },
///     Shipped { id: u64 },
/// }
///
/// impl OrderEvent {
///     const PLACED: EventKind = EventKind::new("Placed");
///     const SHIPPED: EventKind = EventKind::new("Shipped");
/// }
///
/// impl Event for OrderEvent {
///     fn kind(&self) -> EventKind {
///         match self {
///             OrderEvent::Placed { .. } => Self::PLACED,
///             OrderEvent::Shipped { .. } => Self::SHIPPED,
///         }
///     }
/// }
///
/// assert_eq!(OrderEvent::Placed { id: 1 }.kind(), OrderEvent::PLACED);
/// ```
pub trait Event: Clone + Send + Sync + Debug + 'static {
    /// Returns the routing kind of this event.
    fn kind(&self) -> EventKind;
}
