//! Feature slices and the immutable state snapshot.
//!
//! The whole of application state is a [`StateSnapshot`]: a mapping from
//! [`FeatureKey`] to an immutable feature value. Snapshots are replaced
//! wholesale on every reduction; a feature value is never mutated in place.
//! Once a feature is registered it stays present in every later snapshot.
//!
//! Reading a feature that was never registered is a
//! [`StateError::FeatureNotRegistered`] — a configuration error surfaced to
//! the caller, not a silent default.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Interned identifier for a feature slice, unique within a store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FeatureKey(&'static str);

impl FeatureKey {
    /// Create a feature key. Usable in `const` contexts.
    #[must_use]
    pub const fn new(key: &'static str) -> Self {
        Self(key)
    }

    /// The key as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by snapshot reads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The feature key has no entry in the snapshot.
    #[error("feature '{0}' is not registered")]
    FeatureNotRegistered(FeatureKey),

    /// The feature entry holds a different state type than requested.
    #[error("feature '{0}' holds a different state type")]
    FeatureTypeMismatch(FeatureKey),
}

/// Associates a compile-time [`FeatureKey`] with a state type.
pub trait Feature {
    /// The key under which this state lives in every snapshot.
    const KEY: FeatureKey;
}

/// An erased, immutable feature value.
///
/// Blanket-implemented for every [`Feature`] type.
pub trait FeatureState: Send + Sync + fmt::Debug {
    /// Borrow as [`Any`] for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Convert into an [`Any`] for shared-ownership downcasting.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T> FeatureState for T
where
    T: Feature + Send + Sync + fmt::Debug + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Shared handle to an erased feature value.
pub type AnyFeatureState = Arc<dyn FeatureState>;

/// Immutable mapping from feature key to feature state.
///
/// Cloning is cheap (one `Arc` bump); [`with_feature`](Self::with_feature)
/// produces a new snapshot rather than mutating.
#[derive(Clone, Debug, Default)]
pub struct StateSnapshot {
    features: Arc<HashMap<FeatureKey, AnyFeatureState>>,
}

impl StateSnapshot {
    /// An empty snapshot with no registered features.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether no features are registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Whether `key` is registered.
    #[must_use]
    pub fn contains(&self, key: FeatureKey) -> bool {
        self.features.contains_key(&key)
    }

    /// Registered feature keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = FeatureKey> + '_ {
        self.features.keys().copied()
    }

    /// The erased state for `key`.
    ///
    /// # Errors
    ///
    /// [`StateError::FeatureNotRegistered`] if `key` has no entry.
    pub fn get(&self, key: FeatureKey) -> Result<&AnyFeatureState, StateError> {
        self.features
            .get(&key)
            .ok_or(StateError::FeatureNotRegistered(key))
    }

    /// The typed state for feature `S`.
    ///
    /// # Errors
    ///
    /// [`StateError::FeatureNotRegistered`] if `S::KEY` has no entry;
    /// [`StateError::FeatureTypeMismatch`] if the entry is not an `S`.
    pub fn feature<S>(&self) -> Result<Arc<S>, StateError>
    where
        S: Feature + FeatureState + 'static,
    {
        let state = self.get(S::KEY)?;
        Arc::clone(state)
            .as_any_arc()
            .downcast::<S>()
            .map_err(|_| StateError::FeatureTypeMismatch(S::KEY))
    }

    /// A new snapshot with `key` replaced (or inserted) wholesale.
    #[must_use]
    pub fn with_feature(&self, key: FeatureKey, state: AnyFeatureState) -> Self {
        let mut features: HashMap<_, _> = (*self.features).clone();
        features.insert(key, state);
        Self {
            features: Arc::new(features),
        }
    }
}
