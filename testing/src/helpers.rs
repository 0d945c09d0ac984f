//! Async helpers for stream-based assertions.
//!
//! Everything here is timeout-guarded so a broken stream fails a test with
//! an assertion instead of hanging it.

use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::broadcast;
use uniflow_core::action::{ActionKind, AnyAction};

/// Default per-item wait used by the helpers.
pub const WAIT: Duration = Duration::from_secs(1);

/// Initialize a test subscriber for `tracing`, honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Next stream item, or `None` if the stream ends or stays silent for
/// [`WAIT`].
pub async fn next_with_timeout<S>(stream: &mut S) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    tokio::time::timeout(WAIT, stream.next()).await.ok().flatten()
}

/// Collect up to `count` actions from a broadcast subscription, waiting at
/// most [`WAIT`] per action. Returns what arrived in time.
pub async fn recv_actions(
    receiver: &mut broadcast::Receiver<AnyAction>,
    count: usize,
) -> Vec<AnyAction> {
    let mut actions = Vec::with_capacity(count);
    while actions.len() < count {
        match tokio::time::timeout(WAIT, receiver.recv()).await {
            Ok(Ok(action)) => actions.push(action),
            Ok(Err(_)) | Err(_) => break,
        }
    }
    actions
}

/// Collect every action arriving within `window`. Useful for asserting that
/// nothing further shows up.
pub async fn drain_actions(
    receiver: &mut broadcast::Receiver<AnyAction>,
    window: Duration,
) -> Vec<AnyAction> {
    let mut actions = Vec::new();
    loop {
        match tokio::time::timeout(window, receiver.recv()).await {
            Ok(Ok(action)) => actions.push(action),
            Ok(Err(_)) | Err(_) => break,
        }
    }
    actions
}

/// Kind tags of a collected action list, for order assertions.
#[must_use]
pub fn kinds(actions: &[AnyAction]) -> Vec<ActionKind> {
    actions.iter().map(|action| action.kind()).collect()
}
