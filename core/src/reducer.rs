//! The reducer registry: per-feature initial values and pure transitions.
//!
//! A reducer entry pairs a feature key with the set of action kinds it
//! handles and a pure transition over that feature's state. Entries are
//! append-only; registering more reducers never removes earlier ones, and
//! entries for the same feature apply in registration order, each consuming
//! the previous result.
//!
//! Applications build entries through the typed
//! [`FeatureReducerBuilder`], which erases state and action types eagerly so
//! the registry itself routes purely on [`ActionKind`] tags:
//!
//! ```
//! use uniflow_core::action::{ActionKind, ActionTag};
//! use uniflow_core::reducer::{FeatureReducer, FeatureReducerCollection};
//! use uniflow_core::state::{Feature, FeatureKey};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct CounterState { value: i64 }
//!
//! impl Feature for CounterState {
//!     const KEY: FeatureKey = FeatureKey::new("counter");
//! }
//!
//! #[derive(Debug)]
//! struct Add { amount: i64 }
//!
//! impl ActionTag for Add {
//!     const KIND: ActionKind = ActionKind::new("counter/add");
//! }
//!
//! let reducers = FeatureReducerCollection::new(vec![
//!     FeatureReducer::build(CounterState { value: 0 })
//!         .on(|state: &CounterState, action: &Add| CounterState {
//!             value: state.value + action.amount,
//!         })
//!         .finish(),
//! ]);
//! assert_eq!(reducers.len(), 1);
//! ```

use crate::action::{Action, ActionKind, ActionTag};
use crate::state::{AnyFeatureState, Feature, FeatureKey, FeatureState, StateError, StateSnapshot};
use smallvec::SmallVec;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while reducing a single action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    /// A snapshot read failed during reduction.
    #[error(transparent)]
    State(#[from] StateError),

    /// An action carried the registered kind but a different payload type.
    #[error("action kind '{0}' does not match the registered payload type")]
    ActionTypeMismatch(ActionKind),

    /// An application reducer reported a failure.
    #[error("reducer failed: {0}")]
    Failed(String),
}

impl ReduceError {
    /// Application reducer failure with the given message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Erased transition over one feature's state.
pub type TransitionFn = Arc<
    dyn Fn(&dyn FeatureState, &dyn Action) -> Result<AnyFeatureState, ReduceError> + Send + Sync,
>;

/// One registered transition: a feature key, the action kinds it handles,
/// and the erased pure function applied when a matching kind is dispatched.
#[derive(Clone)]
pub struct ActionReducer {
    feature: FeatureKey,
    kinds: SmallVec<[ActionKind; 2]>,
    transition: TransitionFn,
}

impl ActionReducer {
    /// Create an entry from raw parts. Most callers go through
    /// [`FeatureReducer::build`] instead.
    pub fn new(
        feature: FeatureKey,
        kinds: impl IntoIterator<Item = ActionKind>,
        transition: TransitionFn,
    ) -> Self {
        Self {
            feature,
            kinds: kinds.into_iter().collect(),
            transition,
        }
    }

    /// The feature this entry targets.
    #[must_use]
    pub const fn feature(&self) -> FeatureKey {
        self.feature
    }

    /// The action kinds this entry handles.
    #[must_use]
    pub fn kinds(&self) -> &[ActionKind] {
        &self.kinds
    }

    /// Whether this entry handles `kind`.
    #[must_use]
    pub fn handles(&self, kind: ActionKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Apply the transition to one feature value.
    ///
    /// # Errors
    ///
    /// Propagates [`ReduceError`] from the transition, including downcast
    /// mismatches.
    pub fn apply(
        &self,
        state: &dyn FeatureState,
        action: &dyn Action,
    ) -> Result<AnyFeatureState, ReduceError> {
        (self.transition)(state, action)
    }
}

impl fmt::Debug for ActionReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionReducer")
            .field("feature", &self.feature)
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

/// A feature's declared initial value plus its transition entries.
#[derive(Debug, Clone)]
pub struct FeatureReducer {
    key: FeatureKey,
    initial: AnyFeatureState,
    entries: Vec<ActionReducer>,
}

impl FeatureReducer {
    /// Start building reducers for feature `S`, seeded with `initial`.
    pub fn build<S>(initial: S) -> FeatureReducerBuilder<S>
    where
        S: Feature + FeatureState + 'static,
    {
        FeatureReducerBuilder {
            key: S::KEY,
            initial: Arc::new(initial),
            entries: Vec::new(),
            _state: PhantomData,
        }
    }

    /// The feature key.
    #[must_use]
    pub const fn key(&self) -> FeatureKey {
        self.key
    }

    /// The declared initial value.
    #[must_use]
    pub fn initial(&self) -> &AnyFeatureState {
        &self.initial
    }

    /// The transition entries, in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[ActionReducer] {
        &self.entries
    }
}

/// Typed builder for a [`FeatureReducer`].
pub struct FeatureReducerBuilder<S> {
    key: FeatureKey,
    initial: AnyFeatureState,
    entries: Vec<ActionReducer>,
    _state: PhantomData<fn() -> S>,
}

impl<S> FeatureReducerBuilder<S>
where
    S: Feature + FeatureState + 'static,
{
    /// Handle actions of kind `A::KIND` with an infallible pure transition.
    #[must_use]
    pub fn on<A, F>(self, transition: F) -> Self
    where
        A: ActionTag + 'static,
        F: Fn(&S, &A) -> S + Send + Sync + 'static,
    {
        self.try_on(move |state: &S, action: &A| Ok(transition(state, action)))
    }

    /// Handle actions of kind `A::KIND` with a fallible transition.
    ///
    /// An `Err` aborts the whole dispatch that triggered it; the snapshot is
    /// left untouched and the error surfaces to the dispatching caller.
    #[must_use]
    pub fn try_on<A, F>(mut self, transition: F) -> Self
    where
        A: ActionTag + 'static,
        F: Fn(&S, &A) -> Result<S, ReduceError> + Send + Sync + 'static,
    {
        let transition: TransitionFn = Arc::new(move |state, action| {
            let state = state
                .as_any()
                .downcast_ref::<S>()
                .ok_or(StateError::FeatureTypeMismatch(S::KEY))?;
            let action = action
                .downcast_ref::<A>()
                .ok_or(ReduceError::ActionTypeMismatch(A::KIND))?;
            let next = transition(state, action)?;
            Ok(Arc::new(next) as AnyFeatureState)
        });
        self.entries
            .push(ActionReducer::new(self.key, [A::KIND], transition));
        self
    }

    /// Handle several action kinds with one erased transition.
    ///
    /// Useful for transitions that react uniformly to a set of kinds, such
    /// as resetting a feature.
    #[must_use]
    pub fn on_kinds<F>(mut self, kinds: impl IntoIterator<Item = ActionKind>, transition: F) -> Self
    where
        F: Fn(&S, &dyn Action) -> S + Send + Sync + 'static,
    {
        let erased: TransitionFn = Arc::new(move |state, action| {
            let state = state
                .as_any()
                .downcast_ref::<S>()
                .ok_or(StateError::FeatureTypeMismatch(S::KEY))?;
            Ok(Arc::new(transition(state, action)) as AnyFeatureState)
        });
        self.entries.push(ActionReducer::new(self.key, kinds, erased));
        self
    }

    /// Finish building, erasing the state type.
    #[must_use]
    pub fn finish(self) -> FeatureReducer {
        FeatureReducer {
            key: self.key,
            initial: self.initial,
            entries: self.entries,
        }
    }
}

impl<S> From<FeatureReducerBuilder<S>> for FeatureReducer
where
    S: Feature + FeatureState + 'static,
{
    fn from(builder: FeatureReducerBuilder<S>) -> Self {
        builder.finish()
    }
}

/// An ordered group of [`FeatureReducer`]s registered together.
#[derive(Debug, Clone, Default)]
pub struct FeatureReducerCollection {
    features: Vec<FeatureReducer>,
}

impl FeatureReducerCollection {
    /// Create a collection from finished feature reducers.
    #[must_use]
    pub fn new(features: Vec<FeatureReducer>) -> Self {
        Self { features }
    }

    /// Number of feature reducers in the collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Iterate the feature reducers in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &FeatureReducer> {
        self.features.iter()
    }
}

impl From<Vec<FeatureReducer>> for FeatureReducerCollection {
    fn from(features: Vec<FeatureReducer>) -> Self {
        Self { features }
    }
}

impl FromIterator<FeatureReducer> for FeatureReducerCollection {
    fn from_iter<I: IntoIterator<Item = FeatureReducer>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FeatureReducerCollection {
    type Item = FeatureReducer;
    type IntoIter = std::vec::IntoIter<FeatureReducer>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

/// Factory indirection for reducer collections, so wiring layers can hand
/// the store a producer instead of a value.
pub trait ReducerFactory {
    /// Produce the collection to register.
    fn create(&self) -> FeatureReducerCollection;
}

/// The append-only set of registered transitions.
///
/// The registry is pure: [`reduce`](Self::reduce) maps a snapshot and an
/// action to the next snapshot without touching either input.
#[derive(Debug, Clone, Default)]
pub struct ReducerRegistry {
    entries: Vec<ActionReducer>,
}

impl ReducerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a collection's entries and seed any features `snapshot` does
    /// not contain yet with their declared initial values.
    ///
    /// Returns the (possibly extended) snapshot. Already-present features
    /// keep their current value; registration never resets state.
    #[must_use]
    pub fn register(
        &mut self,
        collection: FeatureReducerCollection,
        snapshot: &StateSnapshot,
    ) -> StateSnapshot {
        let mut next = snapshot.clone();
        for feature in collection {
            if !next.contains(feature.key) {
                next = next.with_feature(feature.key, Arc::clone(&feature.initial));
            }
            self.entries.extend(feature.entries);
        }
        next
    }

    /// Compute the next snapshot for one action.
    ///
    /// Every entry whose kind set contains the action's kind applies, in
    /// registration order; entries for the same feature chain on each
    /// other's output. An action with no matching entries yields the input
    /// snapshot unchanged.
    ///
    /// # Errors
    ///
    /// The first failing transition aborts reduction; the input snapshot is
    /// left untouched.
    pub fn reduce(
        &self,
        snapshot: &StateSnapshot,
        action: &dyn Action,
    ) -> Result<StateSnapshot, ReduceError> {
        let kind = action.kind();
        let mut next = snapshot.clone();
        for entry in self.entries.iter().filter(|entry| entry.handles(kind)) {
            let current = Arc::clone(next.get(entry.feature())?);
            let updated = entry.apply(current.as_ref(), action)?;
            next = next.with_feature(entry.feature(), updated);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    struct CounterState {
        value: i64,
    }

    impl Feature for CounterState {
        const KEY: FeatureKey = FeatureKey::new("counter");
    }

    #[derive(Debug, Clone, PartialEq)]
    struct LabelState {
        text: String,
    }

    impl Feature for LabelState {
        const KEY: FeatureKey = FeatureKey::new("label");
    }

    #[derive(Debug)]
    struct Add {
        amount: i64,
    }

    impl ActionTag for Add {
        const KIND: ActionKind = ActionKind::new("counter/add");
    }

    #[derive(Debug)]
    struct Rename {
        text: String,
    }

    impl ActionTag for Rename {
        const KIND: ActionKind = ActionKind::new("label/rename");
    }

    #[derive(Debug)]
    struct Boom;

    impl ActionTag for Boom {
        const KIND: ActionKind = ActionKind::new("counter/boom");
    }

    fn counter_reducers() -> FeatureReducerCollection {
        FeatureReducerCollection::new(vec![
            FeatureReducer::build(CounterState { value: 0 })
                .on(|state: &CounterState, action: &Add| CounterState {
                    value: state.value + action.amount,
                })
                .try_on(|_state: &CounterState, _action: &Boom| {
                    Err(ReduceError::failed("counter exploded"))
                })
                .finish(),
        ])
    }

    #[test]
    fn register_seeds_initial_value_once() {
        let mut registry = ReducerRegistry::new();
        let seeded = registry.register(counter_reducers(), &StateSnapshot::new());
        assert_eq!(seeded.feature::<CounterState>().unwrap().value, 0);

        let bumped = registry
            .reduce(&seeded, &Add { amount: 5 })
            .unwrap();

        // Re-registering appends entries but does not reset the live value.
        let reseeded = registry.register(counter_reducers(), &bumped);
        assert_eq!(reseeded.feature::<CounterState>().unwrap().value, 5);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn unmatched_action_leaves_snapshot_unchanged() {
        let mut registry = ReducerRegistry::new();
        let snapshot = registry.register(counter_reducers(), &StateSnapshot::new());
        let next = registry
            .reduce(
                &snapshot,
                &Rename {
                    text: "x".to_string(),
                },
            )
            .unwrap();
        assert_eq!(next.feature::<CounterState>().unwrap().value, 0);
    }

    #[test]
    fn same_feature_entries_apply_in_registration_order() {
        let mut registry = ReducerRegistry::new();
        let collection = FeatureReducerCollection::new(vec![
            FeatureReducer::build(CounterState { value: 1 })
                .on(|state: &CounterState, action: &Add| CounterState {
                    value: state.value + action.amount,
                })
                .on(|state: &CounterState, _action: &Add| CounterState {
                    value: state.value * 10,
                })
                .finish(),
        ]);
        let snapshot = registry.register(collection, &StateSnapshot::new());

        // (1 + 2) * 10, never 1 * 10 + 2.
        let next = registry.reduce(&snapshot, &Add { amount: 2 }).unwrap();
        assert_eq!(next.feature::<CounterState>().unwrap().value, 30);
    }

    #[test]
    fn independent_features_reduce_independently() {
        let mut registry = ReducerRegistry::new();
        let collection = FeatureReducerCollection::new(vec![
            FeatureReducer::build(CounterState { value: 0 })
                .on(|state: &CounterState, action: &Add| CounterState {
                    value: state.value + action.amount,
                })
                .finish(),
            FeatureReducer::build(LabelState {
                text: String::new(),
            })
            .on(|_state: &LabelState, action: &Rename| LabelState {
                text: action.text.clone(),
            })
            .finish(),
        ]);
        let snapshot = registry.register(collection, &StateSnapshot::new());

        let next = registry.reduce(&snapshot, &Add { amount: 3 }).unwrap();
        let next = registry
            .reduce(
                &next,
                &Rename {
                    text: "named".to_string(),
                },
            )
            .unwrap();

        assert_eq!(next.feature::<CounterState>().unwrap().value, 3);
        assert_eq!(next.feature::<LabelState>().unwrap().text, "named");
    }

    #[test]
    fn failing_transition_aborts_without_partial_update() {
        let mut registry = ReducerRegistry::new();
        let snapshot = registry.register(counter_reducers(), &StateSnapshot::new());
        let snapshot = registry.reduce(&snapshot, &Add { amount: 7 }).unwrap();

        let err = registry.reduce(&snapshot, &Boom).unwrap_err();
        assert_eq!(err, ReduceError::failed("counter exploded"));
        assert_eq!(snapshot.feature::<CounterState>().unwrap().value, 7);
    }

    #[test]
    fn shared_kind_with_wrong_payload_type_is_rejected() {
        // A second action type reusing the "counter/add" tag.
        #[derive(Debug)]
        struct Impostor;

        impl ActionTag for Impostor {
            const KIND: ActionKind = ActionKind::new("counter/add");
        }

        let mut registry = ReducerRegistry::new();
        let snapshot = registry.register(counter_reducers(), &StateSnapshot::new());

        let err = registry.reduce(&snapshot, &Impostor).unwrap_err();
        assert_eq!(err, ReduceError::ActionTypeMismatch(Add::KIND));
    }

    #[test]
    fn on_kinds_handles_every_listed_kind() {
        #[derive(Debug)]
        struct Reset;

        impl ActionTag for Reset {
            const KIND: ActionKind = ActionKind::new("counter/reset");
        }

        let mut registry = ReducerRegistry::new();
        let collection = FeatureReducerCollection::new(vec![
            FeatureReducer::build(CounterState { value: 3 })
                .on_kinds([Reset::KIND, Boom::KIND], |_state, _action| CounterState {
                    value: 0,
                })
                .finish(),
        ]);
        let snapshot = registry.register(collection, &StateSnapshot::new());

        let next = registry.reduce(&snapshot, &Reset).unwrap();
        assert_eq!(next.feature::<CounterState>().unwrap().value, 0);
        let next = registry.reduce(&snapshot, &Boom).unwrap();
        assert_eq!(next.feature::<CounterState>().unwrap().value, 0);
    }

    proptest! {
        /// Reducing an action sequence one at a time equals the sequential
        /// fold of the same deltas, for any sequence.
        #[test]
        fn reduce_matches_sequential_fold(deltas in prop::collection::vec(-100i64..100, 0..32)) {
            let mut registry = ReducerRegistry::new();
            let mut snapshot = registry.register(counter_reducers(), &StateSnapshot::new());

            for delta in &deltas {
                snapshot = registry.reduce(&snapshot, &Add { amount: *delta }).unwrap();
            }

            let expected: i64 = deltas.iter().sum();
            prop_assert_eq!(snapshot.feature::<CounterState>().unwrap().value, expected);
        }
    }
}
