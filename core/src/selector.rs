//! Memoized, dependency-driven projections over the state snapshot.
//!
//! A [`Selector`] is a description of a node in a directed acyclic graph:
//! either a root that reads straight from the [`StateSnapshot`], or a
//! derivation over one or more upstream selectors. Descriptions carry no
//! evaluation state and may be shared freely between stores; each
//! subscription gets its own [`SelectorInstance`] holding the cached
//! last-input/last-output pairs for every node in the chain.
//!
//! Evaluation is pull-based: a snapshot notification walks the chain from
//! the observed node downward. A derived node whose direct upstream inputs
//! are unchanged (judged by each upstream's own comparer) skips its
//! projector entirely and reuses the previous output; a node that did
//! recompute but produced a comparer-equal output does not emit downstream.
//!
//! ```
//! use std::sync::Arc;
//! use uniflow_core::selector::{self, Selector};
//! use uniflow_core::state::{Feature, FeatureKey, StateSnapshot};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct PersonState { first_name: String, last_name: String }
//!
//! impl Feature for PersonState {
//!     const KEY: FeatureKey = FeatureKey::new("person");
//! }
//!
//! let person = selector::feature::<PersonState>();
//! let first_name = Selector::derive(&person, |p: &Arc<PersonState>| p.first_name.clone());
//!
//! let snapshot = StateSnapshot::new().with_feature(
//!     PersonState::KEY,
//!     Arc::new(PersonState { first_name: "Ada".into(), last_name: "L".into() }),
//! );
//! let mut instance = first_name.instantiate();
//! // The first evaluation primes the caches without emitting.
//! assert_eq!(instance.evaluate(&snapshot), Ok(None));
//! ```

use crate::state::{Feature, FeatureState, StateError, StateSnapshot};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

/// Output equality used for memoization and emission suppression.
pub type Comparer<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Deduplicated stream of selector results.
///
/// An `Err` item reports a programmer/configuration error (a read of an
/// unregistered feature) and terminates the stream.
pub type SelectorStream<T> = Pin<Box<dyn Stream<Item = Result<T, StateError>> + Send>>;

type RootProjector<T> = Arc<dyn Fn(&StateSnapshot) -> Result<T, StateError> + Send + Sync>;
type DerivedProjector<U, T> = Arc<dyn Fn(Option<(&T, &U)>, &U) -> T + Send + Sync>;
type CombineProjector<U, T> = Arc<dyn Fn(Option<(&T, &[U])>, &[U]) -> T + Send + Sync>;

/// One evaluation outcome: the node's output plus whether it changed under
/// the node's own comparer.
struct Evaluation<T> {
    value: T,
    changed: bool,
}

/// Per-subscription evaluation state for one node and its upstream chain.
trait SelectorEval<T>: Send {
    fn eval(&mut self, snapshot: &StateSnapshot) -> Result<Evaluation<T>, StateError>;
}

/// A node description: how to build fresh evaluation state.
trait SelectorNode<T>: Send + Sync {
    fn instantiate(&self) -> Box<dyn SelectorEval<T>>;
    fn comparer(&self) -> Comparer<T>;
}

/// A memoized projection over the state snapshot.
///
/// Cheap to clone and safe to share: the description is immutable, and all
/// evaluation state lives in per-subscription [`SelectorInstance`]s.
pub struct Selector<T> {
    node: Arc<dyn SelectorNode<T>>,
}

impl<T> Clone for Selector<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

/// Root selector over the typed state of feature `S`.
///
/// Evaluation fails with [`StateError::FeatureNotRegistered`] while `S` is
/// absent from the snapshot.
#[must_use]
pub fn feature<S>() -> Selector<Arc<S>>
where
    S: Feature + FeatureState + PartialEq + 'static,
{
    Selector::state_with(
        |snapshot: &StateSnapshot| snapshot.feature::<S>(),
        |a: &Arc<S>, b: &Arc<S>| Arc::ptr_eq(a, b) || **a == **b,
    )
}

impl<T> Selector<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Root selector with a custom projector over the raw snapshot.
    ///
    /// Output equality defaults to structural (`PartialEq`).
    pub fn state<F>(project: F) -> Self
    where
        T: PartialEq,
        F: Fn(&StateSnapshot) -> Result<T, StateError> + Send + Sync + 'static,
    {
        Self::state_with(project, |a: &T, b: &T| a == b)
    }

    /// Root selector with an explicit output comparer.
    pub fn state_with<F, C>(project: F, comparer: C) -> Self
    where
        F: Fn(&StateSnapshot) -> Result<T, StateError> + Send + Sync + 'static,
        C: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(RootNode {
                project: Arc::new(project) as RootProjector<T>,
                comparer: Arc::new(comparer) as Comparer<T>,
            }),
        }
    }

    /// Derive from one upstream selector with a pure projector.
    ///
    /// The projector runs only when the upstream output changed under the
    /// upstream's own comparer.
    pub fn derive<U, F>(upstream: &Selector<U>, project: F) -> Self
    where
        T: PartialEq,
        U: Clone + Send + Sync + 'static,
        F: Fn(&U) -> T + Send + Sync + 'static,
    {
        Self::derive_stateful(upstream, move |_prev, input| project(input))
    }

    /// Derive from one upstream with access to the previous `(output,
    /// input)` pair, letting the projector implement incremental
    /// derivation. `None` on the first run.
    pub fn derive_stateful<U, F>(upstream: &Selector<U>, project: F) -> Self
    where
        T: PartialEq,
        U: Clone + Send + Sync + 'static,
        F: Fn(Option<(&T, &U)>, &U) -> T + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(DerivedNode {
                upstream: upstream.clone(),
                project: Arc::new(project) as DerivedProjector<U, T>,
                comparer: Arc::new(|a: &T, b: &T| a == b) as Comparer<T>,
            }),
        }
    }

    /// Combine the latest values of an ordered sequence of upstream
    /// selectors.
    ///
    /// After any single upstream changes, the projector sees the most
    /// recent value of every upstream — combine-latest, not a Cartesian
    /// product. One generic primitive covers any arity.
    pub fn combine<U, F>(upstreams: impl IntoIterator<Item = Selector<U>>, project: F) -> Self
    where
        T: PartialEq,
        U: Clone + Send + Sync + 'static,
        F: Fn(&[U]) -> T + Send + Sync + 'static,
    {
        Self::combine_stateful(upstreams, move |_prev, inputs| project(inputs))
    }

    /// [`combine`](Self::combine) with access to the previous `(output,
    /// inputs)` pair.
    pub fn combine_stateful<U, F>(
        upstreams: impl IntoIterator<Item = Selector<U>>,
        project: F,
    ) -> Self
    where
        T: PartialEq,
        U: Clone + Send + Sync + 'static,
        F: Fn(Option<(&T, &[U])>, &[U]) -> T + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(CombineNode {
                upstreams: upstreams.into_iter().collect(),
                project: Arc::new(project) as CombineProjector<U, T>,
                comparer: Arc::new(|a: &T, b: &T| a == b) as Comparer<T>,
            }),
        }
    }

    /// A selector equal to this one but judged by a custom output comparer.
    ///
    /// Declaring two outputs equal suppresses downstream recomputation and
    /// emission even though the underlying state object changed — e.g.
    /// ignoring churn in fields irrelevant to this projection.
    pub fn with_comparer<C>(&self, comparer: C) -> Self
    where
        C: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(DerivedNode {
                upstream: self.clone(),
                project: Arc::new(|_prev: Option<(&T, &T)>, value: &T| value.clone())
                    as DerivedProjector<T, T>,
                comparer: Arc::new(comparer) as Comparer<T>,
            }),
        }
    }

    /// Fresh per-subscription evaluation state for this selector.
    #[must_use]
    pub fn instantiate(&self) -> SelectorInstance<T> {
        SelectorInstance {
            eval: self.node.instantiate(),
            comparer: self.node.comparer(),
            last_emitted: None,
            primed: false,
        }
    }
}

impl<E> Selector<Vec<E>>
where
    E: Clone + Send + Sync + 'static,
{
    /// A sequence comparer: equal lengths and element-wise equality under
    /// `eq`.
    pub fn with_sequence_comparer<C>(&self, eq: C) -> Self
    where
        C: Fn(&E, &E) -> bool + Send + Sync + 'static,
    {
        self.with_comparer(move |a: &Vec<E>, b: &Vec<E>| {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| eq(x, y))
        })
    }
}

/// Per-subscription evaluation state for a [`Selector`].
///
/// [`evaluate`](Self::evaluate) is the pull step: feed it each new
/// snapshot; it returns `Ok(Some(value))` only when the observer should see
/// a new emission. The first evaluation primes the caches silently, so a
/// fresh subscription emits on the first *change*, not on attach.
pub struct SelectorInstance<T> {
    eval: Box<dyn SelectorEval<T>>,
    comparer: Comparer<T>,
    last_emitted: Option<T>,
    primed: bool,
}

impl<T: Clone> SelectorInstance<T> {
    /// Evaluate against a snapshot, returning the value to emit, if any.
    ///
    /// Applies distinct-until-changed against the last emitted value as a
    /// final backstop on top of the node-level memoization.
    ///
    /// # Errors
    ///
    /// Surfaces [`StateError`] from snapshot reads (unregistered feature);
    /// the subscription should be considered dead after an error.
    pub fn evaluate(&mut self, snapshot: &StateSnapshot) -> Result<Option<T>, StateError> {
        let outcome = self.eval.eval(snapshot)?;
        if !self.primed {
            self.primed = true;
            self.last_emitted = Some(outcome.value);
            return Ok(None);
        }
        if !outcome.changed {
            return Ok(None);
        }
        if let Some(prev) = &self.last_emitted {
            if (self.comparer)(prev, &outcome.value) {
                return Ok(None);
            }
        }
        self.last_emitted = Some(outcome.value.clone());
        Ok(Some(outcome.value))
    }
}

/// Attach a selector to a snapshot stream, yielding deduplicated results.
///
/// Each call creates an independent subscription with its own caches. The
/// stream ends when the snapshot channel closes, or after yielding one
/// `Err` for a failed snapshot read.
pub fn observe<T>(
    selector: &Selector<T>,
    mut snapshots: watch::Receiver<StateSnapshot>,
) -> SelectorStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    let mut instance = selector.instantiate();
    // Prime on the snapshot current at subscription, so emissions reflect
    // changes after attach rather than the value the subscriber walked in
    // on.
    let primed = instance.evaluate(&snapshots.borrow_and_update().clone());
    Box::pin(async_stream::stream! {
        if let Err(error) = primed {
            yield Err(error);
            return;
        }
        loop {
            if snapshots.changed().await.is_err() {
                break;
            }
            let snapshot = snapshots.borrow_and_update().clone();
            match instance.evaluate(&snapshot) {
                Ok(Some(value)) => yield Ok(value),
                Ok(None) => {},
                Err(error) => {
                    yield Err(error);
                    break;
                },
            }
        }
    })
}

struct RootNode<T> {
    project: RootProjector<T>,
    comparer: Comparer<T>,
}

impl<T> SelectorNode<T> for RootNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn instantiate(&self) -> Box<dyn SelectorEval<T>> {
        Box::new(RootEval {
            project: Arc::clone(&self.project),
            comparer: Arc::clone(&self.comparer),
            last: None,
        })
    }

    fn comparer(&self) -> Comparer<T> {
        Arc::clone(&self.comparer)
    }
}

struct RootEval<T> {
    project: RootProjector<T>,
    comparer: Comparer<T>,
    last: Option<T>,
}

impl<T> SelectorEval<T> for RootEval<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn eval(&mut self, snapshot: &StateSnapshot) -> Result<Evaluation<T>, StateError> {
        let mut value = (self.project)(snapshot)?;
        let changed = match &self.last {
            None => true,
            Some(prev) => !(self.comparer)(prev, &value),
        };
        if changed {
            self.last = Some(value.clone());
        } else if let Some(prev) = &self.last {
            // Reuse the previous output verbatim so downstream identity
            // checks stay stable.
            value = prev.clone();
        }
        Ok(Evaluation { value, changed })
    }
}

struct DerivedNode<U, T> {
    upstream: Selector<U>,
    project: DerivedProjector<U, T>,
    comparer: Comparer<T>,
}

impl<U, T> SelectorNode<T> for DerivedNode<U, T>
where
    U: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn instantiate(&self) -> Box<dyn SelectorEval<T>> {
        Box::new(DerivedEval {
            upstream: self.upstream.node.instantiate(),
            project: Arc::clone(&self.project),
            comparer: Arc::clone(&self.comparer),
            last_input: None,
            last_output: None,
        })
    }

    fn comparer(&self) -> Comparer<T> {
        Arc::clone(&self.comparer)
    }
}

struct DerivedEval<U, T> {
    upstream: Box<dyn SelectorEval<U>>,
    project: DerivedProjector<U, T>,
    comparer: Comparer<T>,
    last_input: Option<U>,
    last_output: Option<T>,
}

impl<U, T> SelectorEval<T> for DerivedEval<U, T>
where
    U: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn eval(&mut self, snapshot: &StateSnapshot) -> Result<Evaluation<T>, StateError> {
        let up = self.upstream.eval(snapshot)?;

        // Unchanged input: skip the projector, reuse the cached output.
        if !up.changed {
            if let Some(prev) = &self.last_output {
                return Ok(Evaluation {
                    value: prev.clone(),
                    changed: false,
                });
            }
        }

        let prev_pair = match (&self.last_output, &self.last_input) {
            (Some(output), Some(input)) => Some((output, input)),
            _ => None,
        };
        let computed = (self.project)(prev_pair, &up.value);
        let changed = match &self.last_output {
            None => true,
            Some(prev) => !(self.comparer)(prev, &computed),
        };
        let value = if changed {
            self.last_output = Some(computed.clone());
            computed
        } else if let Some(prev) = &self.last_output {
            prev.clone()
        } else {
            computed
        };
        self.last_input = Some(up.value);
        Ok(Evaluation { value, changed })
    }
}

struct CombineNode<U, T> {
    upstreams: Vec<Selector<U>>,
    project: CombineProjector<U, T>,
    comparer: Comparer<T>,
}

impl<U, T> SelectorNode<T> for CombineNode<U, T>
where
    U: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn instantiate(&self) -> Box<dyn SelectorEval<T>> {
        Box::new(CombineEval {
            upstreams: self
                .upstreams
                .iter()
                .map(|upstream| upstream.node.instantiate())
                .collect(),
            project: Arc::clone(&self.project),
            comparer: Arc::clone(&self.comparer),
            last_inputs: None,
            last_output: None,
        })
    }

    fn comparer(&self) -> Comparer<T> {
        Arc::clone(&self.comparer)
    }
}

struct CombineEval<U, T> {
    upstreams: Vec<Box<dyn SelectorEval<U>>>,
    project: CombineProjector<U, T>,
    comparer: Comparer<T>,
    last_inputs: Option<Vec<U>>,
    last_output: Option<T>,
}

impl<U, T> SelectorEval<T> for CombineEval<U, T>
where
    U: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn eval(&mut self, snapshot: &StateSnapshot) -> Result<Evaluation<T>, StateError> {
        let mut inputs = Vec::with_capacity(self.upstreams.len());
        let mut any_changed = false;
        for upstream in &mut self.upstreams {
            let up = upstream.eval(snapshot)?;
            any_changed |= up.changed;
            inputs.push(up.value);
        }

        if !any_changed {
            if let Some(prev) = &self.last_output {
                return Ok(Evaluation {
                    value: prev.clone(),
                    changed: false,
                });
            }
        }

        let prev_pair = match (&self.last_output, &self.last_inputs) {
            (Some(output), Some(prev_inputs)) => Some((output, prev_inputs.as_slice())),
            _ => None,
        };
        let computed = (self.project)(prev_pair, &inputs);
        let changed = match &self.last_output {
            None => true,
            Some(prev) => !(self.comparer)(prev, &computed),
        };
        let value = if changed {
            self.last_output = Some(computed.clone());
            computed
        } else if let Some(prev) = &self.last_output {
            prev.clone()
        } else {
            computed
        };
        self.last_inputs = Some(inputs);
        Ok(Evaluation { value, changed })
    }
}
