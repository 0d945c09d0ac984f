//! Effects: isolated asynchronous reactions to dispatched actions.
//!
//! An [`Effect`] is a declarative transformation from the stream of
//! completed actions to a stream of results, plus a flag saying whether
//! those results are fed back in as new actions. Registration creates one
//! live pipeline per effect; a failure in one pipeline never touches the
//! others or the store itself.
//!
//! Most effects react to a single action kind and are written with
//! [`Effect::on`]:
//!
//! ```ignore
//! let save_person = Effect::on(|action: Arc<SavePerson>| async move {
//!     person_service.save(&action.person).await?;
//!     Ok(vec![Arc::new(SavePersonComplete) as AnyAction])
//! });
//! store.register_effects([save_person]);
//! ```

use crate::error::StoreError;
use crate::store::Feedback;
use futures::{Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::broadcast;
use uniflow_core::action::{ActionTag, AnyAction, downcast_action};

/// Stream of completed actions, as handed to an effect.
pub type ActionStream = Pin<Box<dyn Stream<Item = AnyAction> + Send>>;

/// Stream produced by an effect.
///
/// An `Err` item fails this subscription instance; the supervisor
/// resubscribes the effect to subsequent actions.
pub type EffectStream = Pin<Box<dyn Stream<Item = Result<AnyAction, anyhow::Error>> + Send>>;

/// Erased effect transformation.
pub type EffectFn = Arc<dyn Fn(ActionStream) -> EffectStream + Send + Sync>;

/// Effect configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectConfig {
    /// Whether emitted values are re-dispatched as new actions. When
    /// `false`, values are observed for side effect only and discarded.
    pub dispatch: bool,
}

/// A declarative action-stream transformation with its configuration.
///
/// Effects are stateless definitions; the live subscription is created at
/// registration and torn down with the store.
#[derive(Clone)]
pub struct Effect {
    run: EffectFn,
    config: EffectConfig,
}

impl Effect {
    /// Create an effect from a raw stream transformation. Does not dispatch
    /// results unless reconfigured with [`with_config`](Self::with_config).
    pub fn new(run: impl Fn(ActionStream) -> EffectStream + Send + Sync + 'static) -> Self {
        Self {
            run: Arc::new(run),
            config: EffectConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EffectConfig) -> Self {
        self.config = config;
        self
    }

    /// The effect's configuration.
    #[must_use]
    pub const fn config(&self) -> EffectConfig {
        self.config
    }

    /// Typed effect reacting to actions of kind `A::KIND`.
    ///
    /// The async handler may transform one triggering action into zero, one,
    /// or many resulting actions; results are dispatched back into the
    /// store by default. A handler error fails the subscription instance
    /// (and trips the supervisor's resubscription).
    pub fn on<A, F, Fut>(handler: F) -> Self
    where
        A: ActionTag + Send + Sync + 'static,
        F: Fn(Arc<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<AnyAction>, anyhow::Error>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            run: Arc::new(move |mut actions: ActionStream| {
                let handler = Arc::clone(&handler);
                Box::pin(async_stream::stream! {
                    while let Some(action) = actions.next().await {
                        if action.kind() != A::KIND {
                            continue;
                        }
                        let Some(typed) = downcast_action::<A>(&action) else {
                            continue;
                        };
                        match handler(typed).await {
                            Ok(produced) => {
                                for result in produced {
                                    yield Ok(result);
                                }
                            },
                            Err(error) => yield Err(error),
                        }
                    }
                }) as EffectStream
            }),
            config: EffectConfig { dispatch: true },
        }
    }

    pub(crate) fn instantiate(&self, actions: ActionStream) -> EffectStream {
        (self.run)(actions)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Factory indirection for effects, so wiring layers can hand the store a
/// producer instead of a value.
pub trait EffectsFactory {
    /// Produce the effects to register.
    fn create(&self) -> Vec<Effect>;
}

/// Adapt a broadcast subscription into a plain action stream. Lagged
/// observers skip old actions with a warning; channel closure ends the
/// stream.
pub(crate) fn action_stream(mut receiver: broadcast::Receiver<AnyAction>) -> ActionStream {
    Box::pin(async_stream::stream! {
        loop {
            match receiver.recv().await {
                Ok(action) => yield action,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "action observer lagged, {} actions skipped", skipped);
                },
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

enum Outcome {
    /// The effect's stream completed on its own.
    Completed,
    /// The effect's stream yielded an error.
    Failed,
    /// The store behind the feedback handle is gone.
    StoreClosed,
}

/// Run one effect under supervision: drive its stream, feed produced
/// actions back when configured to, and resubscribe unconditionally on
/// failure.
///
/// The retry is infinite and immediate. Each retry builds a fresh
/// subscription, so any state internal to the failed instance is lost while
/// subsequent actions keep flowing.
pub(crate) fn spawn_effect(
    effect: Effect,
    mut receiver: broadcast::Receiver<AnyAction>,
    feedback: Feedback,
) {
    tokio::spawn(async move {
        loop {
            // The first instance consumes the registration-time
            // subscription, so actions broadcast before this task first ran
            // are not skipped. A spare handle stays behind to mint fresh
            // subscriptions for restarts.
            let spare = receiver.resubscribe();
            let stream = effect.instantiate(action_stream(receiver));
            match drive(stream, effect.config().dispatch, &feedback).await {
                Outcome::Completed | Outcome::StoreClosed => break,
                Outcome::Failed => {
                    metrics::counter!("store.effects.restarted").increment(1);
                    tokio::task::yield_now().await;
                    // Resubscribe at the tail current at retry time: the
                    // failed instance's state is lost, subsequent actions
                    // keep flowing.
                    receiver = spare.resubscribe();
                },
            }
        }
        tracing::debug!("effect subscription ended");
    });
}

async fn drive(mut stream: EffectStream, dispatch: bool, feedback: &Feedback) -> Outcome {
    while let Some(item) = stream.next().await {
        match item {
            Ok(action) => {
                if dispatch {
                    metrics::counter!("store.effects.actions_fed_back").increment(1);
                    match feedback.dispatch(action).await {
                        Ok(()) => {},
                        Err(StoreError::QueueClosed) => return Outcome::StoreClosed,
                        Err(error) => {
                            // A failed feedback dispatch is this effect's
                            // concern alone.
                            tracing::debug!(error = %error, "effect feedback dispatch failed");
                        },
                    }
                }
            },
            Err(error) => {
                tracing::warn!(error = %error, "effect stream failed; resubscribing");
                return Outcome::Failed;
            },
        }
    }
    Outcome::Completed
}
