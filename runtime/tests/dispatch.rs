//! Integration tests for the serialized dispatch engine.
//!
//! Covers linearized state transitions under concurrent callers, the
//! snapshot/action publication contract, reducer registration semantics,
//! and the per-dispatch error policy.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use futures::StreamExt;
use std::time::Duration;
use uniflow_core::action::ActionTag;
use uniflow_core::state::{Feature, StateError};
use uniflow_runtime::{DispatchMode, Store, StoreConfig, StoreError};
use uniflow_testing::fixtures::{
    self, AddressState, CounterState, FailCounter, Increment, PersonReducers, PersonState,
    SavePerson, UpdateFirstName, ZipCodeUpdated,
};
use uniflow_testing::helpers::{self, init_tracing};
use tokio_test::assert_ok;

#[tokio::test]
async fn dispatch_updates_state() {
    init_tracing();
    let store = Store::new();
    store.register_reducers(fixtures::person_reducers());

    store
        .dispatch(UpdateFirstName {
            name: "Bob".to_string(),
        })
        .await
        .unwrap();

    let person = store.state().feature::<PersonState>().unwrap();
    assert_eq!(person.first_name, "Bob");
    assert_eq!(person.last_name, "World");
}

#[tokio::test]
async fn registration_via_factory_matches_direct_registration() {
    let store = Store::new();
    store.register_reducers_with(&PersonReducers);

    let person = store.state().feature::<PersonState>().unwrap();
    assert_eq!(person.first_name, "Hello");
    assert_eq!(
        store.state().feature::<AddressState>().unwrap().zip_code,
        "12345"
    );
}

/// N concurrent dispatches linearize into some total order: the final value
/// equals the sequential sum, and a selector only ever observes
/// monotonically growing totals, never a partial or interleaved snapshot.
#[tokio::test]
async fn concurrent_dispatches_are_atomic() {
    const TASKS: i64 = 8;
    const PER_TASK: i64 = 25;

    let store = Store::new();
    store.register_reducers(fixtures::counter_reducers());

    let observed = {
        let mut stream = store.select_with(|snapshot| {
            snapshot
                .feature::<CounterState>()
                .map_or(-1, |counter| counter.value)
        });
        tokio::spawn(async move {
            let mut values = Vec::new();
            while let Ok(Some(item)) =
                tokio::time::timeout(Duration::from_millis(300), stream.next()).await
            {
                values.push(item.unwrap());
            }
            values
        })
    };

    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..PER_TASK {
                store.dispatch(Increment { amount: 1 }).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = store.state().feature::<CounterState>().unwrap().value;
    assert_eq!(total, TASKS * PER_TASK);

    let values = observed.await.unwrap();
    assert!(
        values.windows(2).all(|pair| pair[0] < pair[1]),
        "selector observed a non-monotonic snapshot: {values:?}"
    );
}

/// Two independent callers interleave arbitrarily, but each caller's own
/// dispatch order survives on the action stream.
#[tokio::test]
async fn per_caller_dispatch_order_is_preserved() {
    let store = Store::new();
    store.register_reducers(fixtures::counter_reducers());
    store.register_reducers(fixtures::person_reducers());

    let mut receiver = store.subscribe_actions();

    let counter_caller = {
        let store = store.clone();
        tokio::spawn(async move {
            for amount in 1..=5 {
                store.dispatch(Increment { amount }).await.unwrap();
            }
        })
    };
    let zip_caller = {
        let store = store.clone();
        tokio::spawn(async move {
            for zip in ["10001", "10002", "10003", "10004", "10005"] {
                store
                    .dispatch(ZipCodeUpdated {
                        zip_code: zip.to_string(),
                    })
                    .await
                    .unwrap();
            }
        })
    };
    counter_caller.await.unwrap();
    zip_caller.await.unwrap();

    let actions = helpers::recv_actions(&mut receiver, 10).await;
    assert_eq!(actions.len(), 10);

    let amounts: Vec<i64> = actions
        .iter()
        .filter_map(|action| action.downcast_ref::<Increment>().map(|a| a.amount))
        .collect();
    let zips: Vec<String> = actions
        .iter()
        .filter_map(|action| {
            action
                .downcast_ref::<ZipCodeUpdated>()
                .map(|a| a.zip_code.clone())
        })
        .collect();

    assert_eq!(amounts, vec![1, 2, 3, 4, 5]);
    assert_eq!(zips, vec!["10001", "10002", "10003", "10004", "10005"]);
}

/// A failing reducer aborts that one dispatch only: the caller sees the
/// error, the snapshot and action stream stay clean, and the next dispatch
/// proceeds normally.
#[tokio::test]
async fn failed_reduction_is_isolated() {
    let store = Store::new();
    store.register_reducers(fixtures::counter_reducers());
    store.dispatch(Increment { amount: 3 }).await.unwrap();

    let mut receiver = store.subscribe_actions();

    let result = store.dispatch(FailCounter).await;
    assert!(matches!(result, Err(StoreError::Reduce(_))));
    assert_eq!(store.state().feature::<CounterState>().unwrap().value, 3);

    // The queue keeps processing.
    store.dispatch(Increment { amount: 1 }).await.unwrap();
    assert_eq!(store.state().feature::<CounterState>().unwrap().value, 4);

    // Only the successful action was published.
    let actions = helpers::recv_actions(&mut receiver, 1).await;
    assert_eq!(helpers::kinds(&actions), vec![Increment::KIND]);
}

/// An action with no matching reducer entries changes nothing but is still
/// published to action observers.
#[tokio::test]
async fn unmatched_action_still_broadcasts() {
    let store = Store::new();
    store.register_reducers(fixtures::counter_reducers());

    let mut receiver = store.subscribe_actions();
    let before = store.state().feature::<CounterState>().unwrap();

    store
        .dispatch(SavePerson {
            person: PersonState::new("A", "B"),
        })
        .await
        .unwrap();

    assert_eq!(store.state().feature::<CounterState>().unwrap(), before);
    let actions = helpers::recv_actions(&mut receiver, 1).await;
    assert_eq!(actions.len(), 1);
    assert!(actions[0].is::<SavePerson>());
}

/// Registering reducers seeds new features immediately and republishes the
/// snapshot, so subscribers attached beforehand observe the added features.
#[tokio::test]
async fn registration_seeds_and_republishes() {
    let store = Store::new();
    let mut feature_count = store.select_with(uniflow_core::state::StateSnapshot::len);

    // Subscribed on the empty snapshot; nothing emits before a change.
    assert!(
        tokio::time::timeout(Duration::from_millis(50), feature_count.next())
            .await
            .is_err()
    );

    store.register_reducers(fixtures::person_reducers());

    let emitted = helpers::next_with_timeout(&mut feature_count).await;
    assert_eq!(emitted, Some(Ok(2)));
}

/// Registering the same collection twice appends a second set of entries;
/// a handled action then applies the transition once per entry.
#[tokio::test]
async fn duplicate_registration_applies_transitions_twice() {
    let store = Store::new();
    store.register_reducers(fixtures::counter_reducers());
    store.register_reducers(fixtures::counter_reducers());

    store.dispatch(Increment { amount: 1 }).await.unwrap();

    assert_eq!(store.state().feature::<CounterState>().unwrap().value, 2);
}

#[tokio::test]
async fn dispatch_opt_none_is_a_silent_noop() {
    let store = Store::new();
    store.register_reducers(fixtures::counter_reducers());

    let mut receiver = store.subscribe_actions();
    store.dispatch_opt(None).await.unwrap();

    let actions = helpers::drain_actions(&mut receiver, Duration::from_millis(100)).await;
    assert!(actions.is_empty());
}

/// Reading a feature that was never registered is an error surfaced through
/// the selector stream, not a silent default.
#[tokio::test]
async fn missing_feature_surfaces_as_stream_error() {
    let store = Store::new();

    let mut stream = store.select(&fixtures::selectors::person());
    let first = helpers::next_with_timeout(&mut stream).await;
    assert_eq!(
        first,
        Some(Err(StateError::FeatureNotRegistered(PersonState::KEY)))
    );

    // The stream terminates after the error.
    assert_eq!(helpers::next_with_timeout(&mut stream).await, None);
}

/// The action stream replays nothing: a late subscriber only sees actions
/// dispatched after it attached.
#[tokio::test]
async fn late_subscribers_see_future_actions_only() {
    let store = Store::new();
    store.register_reducers(fixtures::counter_reducers());

    store.dispatch(Increment { amount: 1 }).await.unwrap();

    let mut actions = store.actions();
    store.dispatch(Increment { amount: 2 }).await.unwrap();

    let first = helpers::next_with_timeout(&mut actions).await.unwrap();
    assert_eq!(first.downcast_ref::<Increment>().unwrap().amount, 2);
}

/// The inline dispatch mode serializes on the store lock instead of the
/// queue — same observable behavior, no worker task.
#[tokio::test]
async fn inline_mode_matches_queued_semantics() {
    let store = Store::with_config(StoreConfig::default().with_dispatch_mode(DispatchMode::Inline));
    store.register_reducers(fixtures::counter_reducers());

    let mut receiver = store.subscribe_actions();

    assert_ok!(store.dispatch(Increment { amount: 2 }).await);
    let result = store.dispatch(FailCounter).await;
    assert!(matches!(result, Err(StoreError::Reduce(_))));
    assert_ok!(store.dispatch(Increment { amount: 5 }).await);

    assert_eq!(store.state().feature::<CounterState>().unwrap().value, 7);
    let actions = helpers::recv_actions(&mut receiver, 2).await;
    assert_eq!(actions.len(), 2);
    assert!(actions.iter().all(|action| action.is::<Increment>()));
}
