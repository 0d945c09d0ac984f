//! # Uniflow Runtime
//!
//! Runtime for the Uniflow state container.
//!
//! This crate provides the [`Store`]: the serialized dispatch engine that
//! owns the state snapshot and the reducer registry, publishes snapshots and
//! completed actions to observers, and supervises the effect pipeline.
//!
//! ## Core Components
//!
//! - **Store**: accepts actions from any task and applies them through a
//!   single logical serialization point
//! - **Selector streams**: [`Store::select`] attaches memoized selectors
//!   from `uniflow-core` to the live snapshot stream
//! - **Effect pipeline**: [`Store::register_effects`] runs one supervised,
//!   fault-isolated reactive pipeline per effect
//!
//! ## Example
//!
//! ```ignore
//! use uniflow_runtime::Store;
//!
//! let store = Store::new();
//! store.register_reducers(my_reducers());
//! store.register_effects(my_effects());
//!
//! store.dispatch(UpdateFirstName { name: "Bob".into() }).await?;
//! let person = store.state().feature::<PersonState>()?;
//! ```

/// Effect definitions, configuration, and supervision.
pub mod effects;

mod store;

/// Error types for the Store runtime.
pub mod error {
    use thiserror::Error;
    use uniflow_core::reducer::ReduceError;

    /// Errors surfaced by Store operations.
    ///
    /// A failed dispatch is observed only by its directly awaiting caller;
    /// it never terminates the store, the queue, or other observers.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// A reducer failed while applying one action.
        ///
        /// The snapshot was not updated and the action was not published;
        /// the next queued action executes normally.
        #[error(transparent)]
        Reduce(#[from] ReduceError),

        /// The store behind this handle has been dropped.
        #[error("store dispatch queue is closed")]
        QueueClosed,
    }
}

pub use effects::{ActionStream, Effect, EffectConfig, EffectStream, EffectsFactory};
pub use error::StoreError;
pub use store::{Store, TypedActionStream};

/// How dispatched actions reach the exclusive executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// FIFO queue drained by a single worker task. The default; requires a
    /// Tokio runtime.
    #[default]
    Queued,

    /// Process on the caller's task, serialized by the store's own lock.
    /// Deterministic and spawn-free, intended for tests and benchmarks.
    Inline,
}

/// Configuration for [`Store`] instances.
///
/// # Example
///
/// ```
/// use uniflow_runtime::{DispatchMode, StoreConfig};
///
/// let config = StoreConfig::default()
///     .with_dispatch_mode(DispatchMode::Inline)
///     .with_action_capacity(256);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Serialization primitive override.
    pub dispatch_mode: DispatchMode,

    /// Action broadcast channel capacity. Observers that fall further behind
    /// than this skip old actions.
    pub action_capacity: usize,
}

impl StoreConfig {
    /// Create a configuration with explicit values.
    #[must_use]
    pub const fn new(dispatch_mode: DispatchMode, action_capacity: usize) -> Self {
        Self {
            dispatch_mode,
            action_capacity,
        }
    }

    /// Set the dispatch mode.
    #[must_use]
    pub const fn with_dispatch_mode(mut self, dispatch_mode: DispatchMode) -> Self {
        self.dispatch_mode = dispatch_mode;
        self
    }

    /// Set the action broadcast capacity.
    #[must_use]
    pub const fn with_action_capacity(mut self, action_capacity: usize) -> Self {
        self.action_capacity = action_capacity;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dispatch_mode: DispatchMode::Queued,
            action_capacity: 64,
        }
    }
}
