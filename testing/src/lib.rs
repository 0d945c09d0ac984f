//! # Uniflow Testing
//!
//! Testing fixtures and helpers for the Uniflow state container.
//!
//! This crate provides:
//! - A small demo domain (person, address, counter) with reducers,
//!   selectors, and an effects factory, shared by the runtime integration
//!   tests
//! - Async helpers for reading streams and broadcasts under a timeout
//!
//! ## Example
//!
//! ```ignore
//! use uniflow_runtime::Store;
//! use uniflow_testing::fixtures::{person_reducers, PersonState, UpdateFirstName};
//!
//! #[tokio::test]
//! async fn updates_first_name() {
//!     let store = Store::new();
//!     store.register_reducers(person_reducers());
//!
//!     store.dispatch(UpdateFirstName { name: "Bob".into() }).await.unwrap();
//!
//!     let person = store.state().feature::<PersonState>().unwrap();
//!     assert_eq!(person.first_name, "Bob");
//! }
//! ```

/// The person/address/counter demo domain.
pub mod fixtures;

/// Async helpers for stream-based assertions.
pub mod helpers;
