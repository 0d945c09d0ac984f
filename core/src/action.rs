//! Action identity and erasure.
//!
//! Every state transition is described by an action: an immutable value
//! carrying an arbitrary payload, identified at runtime by its [`ActionKind`]
//! tag. The dispatch engine and the reducer registry never look at payloads;
//! they route purely on the tag, and typed handlers downcast the payload back
//! out at the edge.
//!
//! # Declaring an action
//!
//! Implement [`ActionTag`] with a unique, `const` kind tag; [`Action`] is
//! blanket-implemented from it:
//!
//! ```
//! use uniflow_core::action::{Action, ActionKind, ActionTag};
//!
//! #[derive(Debug, Clone)]
//! struct UpdateFirstName {
//!     name: String,
//! }
//!
//! impl ActionTag for UpdateFirstName {
//!     const KIND: ActionKind = ActionKind::new("person/update-first-name");
//! }
//!
//! let action = UpdateFirstName { name: "Bob".to_string() };
//! assert_eq!(action.kind(), UpdateFirstName::KIND);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Interned identifier for an action type.
///
/// Kinds are compared by tag, never by payload. Two action types must not
/// share a tag; the conventional shape is `"feature/verb"`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ActionKind(&'static str);

impl ActionKind {
    /// Create a kind tag. Usable in `const` contexts.
    #[must_use]
    pub const fn new(tag: &'static str) -> Self {
        Self(tag)
    }

    /// The tag as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Associates a compile-time [`ActionKind`] with an action type.
///
/// This is the only trait applications implement by hand; [`Action`] follows
/// from it.
pub trait ActionTag {
    /// The kind tag shared by every value of this type.
    const KIND: ActionKind;
}

/// An erased, immutable action value.
///
/// Object-safe so actions of different types flow through one dispatch queue
/// and one broadcast channel as [`AnyAction`]. Blanket-implemented for every
/// `ActionTag` type; there is normally no reason to implement it directly.
pub trait Action: Send + Sync + fmt::Debug + 'static {
    /// Runtime kind tag of this value.
    fn kind(&self) -> ActionKind;

    /// Borrow as [`Any`] for payload downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Convert into an [`Any`] for shared-ownership downcasting.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T> Action for T
where
    T: ActionTag + Send + Sync + fmt::Debug + 'static,
{
    fn kind(&self) -> ActionKind {
        T::KIND
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Shared handle to an erased action.
///
/// Cloning is an `Arc` bump; the payload itself is never copied or mutated.
pub type AnyAction = Arc<dyn Action>;

impl dyn Action {
    /// Whether the payload is a `A`.
    #[must_use]
    pub fn is<A: 'static>(&self) -> bool {
        self.as_any().is::<A>()
    }

    /// Borrow the payload as a `A`, if it is one.
    #[must_use]
    pub fn downcast_ref<A: 'static>(&self) -> Option<&A> {
        self.as_any().downcast_ref::<A>()
    }
}

/// Downcast a shared action to a concrete payload type.
///
/// Returns `None` when the payload is not an `A`. Used by typed effect
/// handlers after filtering on [`ActionKind`].
#[must_use]
pub fn downcast_action<A: Send + Sync + 'static>(action: &AnyAction) -> Option<Arc<A>> {
    Arc::clone(action).as_any_arc().downcast::<A>().ok()
}
