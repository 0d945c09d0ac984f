//! The Store: serialized dispatch, snapshot publication, action broadcast.

use crate::effects::{ActionStream, Effect, EffectsFactory, action_stream, spawn_effect};
use crate::error::StoreError;
use crate::{DispatchMode, StoreConfig};
use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use uniflow_core::action::{Action, ActionTag, AnyAction, downcast_action};
use uniflow_core::reducer::{FeatureReducerCollection, ReducerFactory, ReducerRegistry};
use uniflow_core::selector::{Selector, SelectorStream, observe};
use uniflow_core::state::StateSnapshot;

/// Stream of one concrete action type, filtered out of the action broadcast.
pub type TypedActionStream<A> = Pin<Box<dyn Stream<Item = Arc<A>> + Send>>;

/// The single-owner cell behind the serialization point: the authoritative
/// snapshot, the registry, and both publishers. Mutated only while the lock
/// is held, and never across an await.
pub(crate) struct StoreCore {
    state: StateSnapshot,
    registry: ReducerRegistry,
    state_tx: watch::Sender<StateSnapshot>,
    actions_tx: broadcast::Sender<AnyAction>,
}

impl StoreCore {
    /// Seed new features, append entries, republish the snapshot.
    fn register(&mut self, collection: FeatureReducerCollection) {
        self.state = self.registry.register(collection, &self.state);
        let _ = self.state_tx.send(self.state.clone());
    }

    /// Apply one action: reduce, swap the snapshot, publish snapshot then
    /// action. A reduction failure leaves the snapshot untouched and
    /// publishes nothing.
    pub(crate) fn process(&mut self, action: &AnyAction) -> Result<(), StoreError> {
        metrics::counter!("store.actions.dispatched").increment(1);
        let started = Instant::now();

        let next = match self.registry.reduce(&self.state, action.as_ref()) {
            Ok(next) => next,
            Err(error) => {
                metrics::counter!("store.reduce.failed").increment(1);
                tracing::warn!(
                    kind = %action.kind(),
                    error = %error,
                    "reduction failed; snapshot unchanged"
                );
                return Err(StoreError::Reduce(error));
            },
        };
        metrics::histogram!("store.reduce.duration_seconds")
            .record(started.elapsed().as_secs_f64());

        self.state = next.clone();
        // Snapshot before action: anything reacting to the action must
        // already observe the state it produced.
        let _ = self.state_tx.send(next);
        let _ = self.actions_tx.send(Arc::clone(action));
        Ok(())
    }
}

/// One unit of work on the dispatch queue.
pub(crate) struct DispatchJob {
    action: AnyAction,
    done: oneshot::Sender<Result<(), StoreError>>,
}

/// Weak dispatch handle held by effect supervisors, so a registered effect
/// never keeps a dropped store alive.
pub(crate) enum Feedback {
    Queued(mpsc::WeakUnboundedSender<DispatchJob>),
    Inline(Weak<Mutex<StoreCore>>),
}

impl Feedback {
    /// Re-enter the serialized dispatch path with an effect-produced action.
    pub(crate) async fn dispatch(&self, action: AnyAction) -> Result<(), StoreError> {
        match self {
            Self::Queued(queue) => match queue.upgrade() {
                Some(queue) => dispatch_queued(&queue, action).await,
                None => Err(StoreError::QueueClosed),
            },
            Self::Inline(core) => match core.upgrade() {
                Some(core) => lock_core(&core).process(&action),
                None => Err(StoreError::QueueClosed),
            },
        }
    }
}

async fn dispatch_queued(
    queue: &mpsc::UnboundedSender<DispatchJob>,
    action: AnyAction,
) -> Result<(), StoreError> {
    let (done, completion) = oneshot::channel();
    queue
        .send(DispatchJob { action, done })
        .map_err(|_| StoreError::QueueClosed)?;
    completion.await.map_err(|_| StoreError::QueueClosed)?
}

fn lock_core(core: &Mutex<StoreCore>) -> MutexGuard<'_, StoreCore> {
    // Mutex poisoning is unrecoverable.
    #[allow(clippy::unwrap_used)]
    let guard = core.lock().unwrap();
    guard
}

fn spawn_worker(core: Arc<Mutex<StoreCore>>, mut queue: mpsc::UnboundedReceiver<DispatchJob>) {
    tokio::spawn(async move {
        while let Some(job) = queue.recv().await {
            let result = lock_core(&core).process(&job.action);
            // The caller may have stopped waiting; that is fine.
            let _ = job.done.send(result);
        }
        tracing::debug!("dispatch queue closed; store worker exiting");
    });
}

/// A unidirectional state container.
///
/// The Store holds application state as an immutable [`StateSnapshot`],
/// mutated only by dispatching actions through a single logical
/// serialization point, and observed through deduplicated selector streams.
///
/// # Ordering guarantees
///
/// - All dispatches are linearized into one total order; reducers never see
///   interleaved or partially-applied state.
/// - Per-caller dispatch order is preserved (FIFO queue).
/// - For each action, the new snapshot is published before the action
///   itself, so selectors and effects reacting to an action always observe
///   state that already reflects it.
///
/// # Handles and teardown
///
/// `Store` is a cheap-to-clone handle. Dropping the last handle closes the
/// dispatch queue, which ends the worker task, which in turn closes the
/// action broadcast and winds down every registered effect.
///
/// # Example
///
/// ```ignore
/// let store = Store::new();
/// store.register_reducers(person_reducers());
///
/// store.dispatch(UpdateFirstName { name: "Bob".into() }).await?;
/// assert_eq!(store.state().feature::<PersonState>()?.first_name, "Bob");
/// ```
#[derive(Clone)]
pub struct Store {
    core: Arc<Mutex<StoreCore>>,
    queue: Option<mpsc::UnboundedSender<DispatchJob>>,
    state_rx: watch::Receiver<StateSnapshot>,
    actions_tx: broadcast::Sender<AnyAction>,
}

impl Store {
    /// Create a store with the default configuration (queued dispatch).
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime; the queued mode spawns the
    /// worker task. Use [`DispatchMode::Inline`] for runtime-free contexts.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a store with an explicit configuration.
    ///
    /// `DispatchMode::Inline` replaces the queue-and-worker serialization
    /// with the caller's task holding the store lock — the test-friendly
    /// scheduler override.
    ///
    /// # Panics
    ///
    /// Panics if `DispatchMode::Queued` is requested outside a Tokio
    /// runtime.
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(StateSnapshot::new());
        let (actions_tx, _) = broadcast::channel(config.action_capacity);
        let core = Arc::new(Mutex::new(StoreCore {
            state: StateSnapshot::new(),
            registry: ReducerRegistry::new(),
            state_tx,
            actions_tx: actions_tx.clone(),
        }));

        let queue = match config.dispatch_mode {
            DispatchMode::Queued => {
                let (queue_tx, queue_rx) = mpsc::unbounded_channel();
                spawn_worker(Arc::clone(&core), queue_rx);
                Some(queue_tx)
            },
            DispatchMode::Inline => None,
        };

        Self {
            core,
            queue,
            state_rx,
            actions_tx,
        }
    }

    /// Dispatch a typed action for serialized reduction and broadcast.
    ///
    /// Resolves when this specific unit of work has completed — the
    /// snapshot is swapped and both publications are out — not when the
    /// queue drains further.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Reduce`] if a reducer failed; the snapshot is
    ///   unchanged and the action was not published.
    /// - [`StoreError::QueueClosed`] if every other handle to this store
    ///   was dropped.
    pub async fn dispatch<A: Action + 'static>(&self, action: A) -> Result<(), StoreError> {
        self.dispatch_any(Arc::new(action)).await
    }

    /// Dispatch an erased action. See [`dispatch`](Self::dispatch).
    ///
    /// # Errors
    ///
    /// Same as [`dispatch`](Self::dispatch).
    #[tracing::instrument(skip(self, action), name = "store_dispatch")]
    pub async fn dispatch_any(&self, action: AnyAction) -> Result<(), StoreError> {
        tracing::debug!(kind = %action.kind(), "dispatching action");
        match &self.queue {
            Some(queue) => dispatch_queued(queue, action).await,
            None => lock_core(&self.core).process(&action),
        }
    }

    /// Dispatch an action that may be absent. `None` is a silent no-op.
    ///
    /// # Errors
    ///
    /// Same as [`dispatch`](Self::dispatch) when `Some`.
    pub async fn dispatch_opt(&self, action: Option<AnyAction>) -> Result<(), StoreError> {
        match action {
            Some(action) => self.dispatch_any(action).await,
            None => Ok(()),
        }
    }

    /// The latest snapshot, readable synchronously.
    #[must_use]
    pub fn state(&self) -> StateSnapshot {
        self.state_rx.borrow().clone()
    }

    /// The snapshot stream selectors attach to. Carries the current value
    /// plus every subsequent publication.
    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<StateSnapshot> {
        self.state_rx.clone()
    }

    /// Observe a selector over this store's snapshot stream.
    ///
    /// The returned stream is deduplicated: it emits only when the
    /// selector's output changes under its comparer, starting from the
    /// value observed at subscription time. An unregistered-feature read
    /// yields one `Err` and ends the stream.
    #[must_use]
    pub fn select<T>(&self, selector: &Selector<T>) -> SelectorStream<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        observe(selector, self.state_rx.clone())
    }

    /// Observe an ad-hoc projection over the raw snapshot, deduplicated by
    /// structural equality.
    #[must_use]
    pub fn select_with<T, F>(&self, project: F) -> SelectorStream<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&StateSnapshot) -> T + Send + Sync + 'static,
    {
        let selector = Selector::state(move |snapshot| Ok(project(snapshot)));
        observe(&selector, self.state_rx.clone())
    }

    /// Every completed action, in dispatch order. Late subscribers only see
    /// future actions; nothing is replayed.
    #[must_use]
    pub fn actions(&self) -> ActionStream {
        action_stream(self.actions_tx.subscribe())
    }

    /// Raw broadcast subscription to completed actions, for callers that
    /// want lag visibility.
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<AnyAction> {
        self.actions_tx.subscribe()
    }

    /// Completed actions of one concrete type, filtered by kind tag.
    #[must_use]
    pub fn actions_of<A>(&self) -> TypedActionStream<A>
    where
        A: ActionTag + Send + Sync + 'static,
    {
        let mut receiver = self.actions_tx.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(action) => {
                        if action.kind() != A::KIND {
                            continue;
                        }
                        if let Some(typed) = downcast_action::<A>(&action) {
                            yield typed;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "typed action observer lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Register a reducer collection: seed any new features with their
    /// initial values, append the entries, and republish the snapshot so
    /// existing subscribers see the added features.
    ///
    /// Store setup, not a dispatched transition — this does not go through
    /// the queue. Safe to call repeatedly; entries are append-only.
    pub fn register_reducers(&self, collection: FeatureReducerCollection) {
        lock_core(&self.core).register(collection);
    }

    /// Register reducers produced by a factory.
    pub fn register_reducers_with(&self, factory: &dyn ReducerFactory) {
        self.register_reducers(factory.create());
    }

    /// Register effects: one independent, supervised pipeline per effect,
    /// subscribed to the action broadcast for the lifetime of the store.
    ///
    /// A failing effect stream is resubscribed unconditionally — infinite
    /// retry. That isolates faults but silently swallows the error and can
    /// spin on an effect that fails immediately; see the crate docs for the
    /// tradeoff. Unregistering is not supported.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn register_effects(&self, effects: impl IntoIterator<Item = Effect>) {
        for effect in effects {
            metrics::counter!("store.effects.registered").increment(1);
            spawn_effect(effect, self.actions_tx.subscribe(), self.feedback());
        }
    }

    /// Register effects produced by a factory.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn register_effects_with(&self, factory: &dyn EffectsFactory) {
        self.register_effects(factory.create());
    }

    fn feedback(&self) -> Feedback {
        match &self.queue {
            Some(queue) => Feedback::Queued(queue.downgrade()),
            None => Feedback::Inline(Arc::downgrade(&self.core)),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("features", &self.state_rx.borrow().len())
            .field("queued", &self.queue.is_some())
            .finish_non_exhaustive()
    }
}
