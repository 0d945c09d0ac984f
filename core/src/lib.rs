//! # Uniflow Core
//!
//! Core types for the Uniflow state container.
//!
//! This crate provides the pure half of the system: the data model and the
//! selector graph. The serialized dispatch runtime lives in
//! `uniflow-runtime`.
//!
//! ## Core Concepts
//!
//! - **Action**: an immutable, tagged event describing an intended state
//!   transition, routed by its [`action::ActionKind`]
//! - **Feature**: a named, independently-reducible slice of the overall
//!   state, stored in the immutable [`state::StateSnapshot`]
//! - **Reducer**: a pure transition `(FeatureState, Action) → FeatureState`,
//!   held append-only in the [`reducer::ReducerRegistry`]
//! - **Selector**: a memoized, pure derivation over snapshots, described by
//!   [`selector::Selector`] and evaluated per subscription
//!
//! ## Architecture Principles
//!
//! - Immutable snapshots, replaced wholesale per reduction
//! - Explicit interned tags instead of reflection-based type lookup
//! - Descriptions separated from evaluation state, so selectors are
//!   shareable between stores and subscriptions
//!
//! ## Example
//!
//! ```
//! use uniflow_core::action::{ActionKind, ActionTag};
//! use uniflow_core::reducer::{FeatureReducer, FeatureReducerCollection, ReducerRegistry};
//! use uniflow_core::state::{Feature, FeatureKey, StateSnapshot};
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
//! let mut registry = ReducerRegistry::new();
//! let snapshot = registry.register(
//!     FeatureReducerCollection::new(vec![
//!         FeatureReducer::build(CounterState { value: 0 })
//!             .on(|state: &CounterState, action: &Add| CounterState {
//!                 value: state.value + action.amount,
//!             })
//!             .finish(),
//!     ]),
//!     &StateSnapshot::new(),
//! );
//!
//! let next = registry.reduce(&snapshot, &Add { amount: 2 })?;
//! assert_eq!(next.feature::<CounterState>()?.value, 2);
//! # Ok::<(), uniflow_core::reducer::ReduceError>(())
//! ```

/// Action identity and erasure.
pub mod action;

/// Reducer entries, collections, and the append-only registry.
pub mod reducer;

/// Memoized selector graph and per-subscription evaluation.
pub mod selector;

/// Feature slices and the immutable state snapshot.
pub mod state;

pub use action::{Action, ActionKind, ActionTag, AnyAction, downcast_action};
pub use reducer::{
    ActionReducer, FeatureReducer, FeatureReducerBuilder, FeatureReducerCollection, ReduceError,
    ReducerFactory, ReducerRegistry,
};
pub use selector::{Selector, SelectorInstance, SelectorStream, observe};
pub use state::{AnyFeatureState, Feature, FeatureKey, FeatureState, StateError, StateSnapshot};
