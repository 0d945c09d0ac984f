//! A small demo domain: a person, an address, and a counter.
//!
//! Mirrors the shape of a typical application wired onto the store and
//! gives the integration tests concrete features, actions, reducers,
//! selectors, and effects to work with.

use std::sync::Arc;
use std::time::Duration;
use uniflow_core::action::{ActionKind, ActionTag, AnyAction};
use uniflow_core::reducer::{
    FeatureReducer, FeatureReducerCollection, ReduceError, ReducerFactory,
};
use uniflow_core::selector::{self, Selector};
use uniflow_core::state::{Feature, FeatureKey};
use uniflow_runtime::{Effect, EffectsFactory};

/// A person's name, as one feature slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonState {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
}

impl PersonState {
    /// Build a person from name parts.
    #[must_use]
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

impl Feature for PersonState {
    const KEY: FeatureKey = FeatureKey::new("person");
}

/// A postal address, as a second independent feature slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressState {
    /// Postal code.
    pub zip_code: String,
}

impl AddressState {
    /// Build an address from a zip code.
    #[must_use]
    pub fn new(zip_code: impl Into<String>) -> Self {
        Self {
            zip_code: zip_code.into(),
        }
    }
}

impl Feature for AddressState {
    const KEY: FeatureKey = FeatureKey::new("address");
}

/// A counter feature used for concurrency tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    /// Current total.
    pub value: i64,
}

impl Feature for CounterState {
    const KEY: FeatureKey = FeatureKey::new("counter");
}

/// Replace the person's first name.
#[derive(Debug, Clone)]
pub struct UpdateFirstName {
    /// The new given name.
    pub name: String,
}

impl ActionTag for UpdateFirstName {
    const KIND: ActionKind = ActionKind::new("person/update-first-name");
}

/// Replace the person's last name.
#[derive(Debug, Clone)]
pub struct UpdateLastName {
    /// The new family name.
    pub name: String,
}

impl ActionTag for UpdateLastName {
    const KIND: ActionKind = ActionKind::new("person/update-last-name");
}

/// Replace the address zip code.
#[derive(Debug, Clone)]
pub struct ZipCodeUpdated {
    /// The new postal code.
    pub zip_code: String,
}

impl ActionTag for ZipCodeUpdated {
    const KIND: ActionKind = ActionKind::new("address/zip-code-updated");
}

/// Ask the save effect to persist a person.
#[derive(Debug, Clone)]
pub struct SavePerson {
    /// The person to persist.
    pub person: PersonState,
}

impl ActionTag for SavePerson {
    const KIND: ActionKind = ActionKind::new("person/save");
}

/// Emitted by the save effect once the person was persisted.
#[derive(Debug, Clone)]
pub struct SavePersonComplete;

impl ActionTag for SavePersonComplete {
    const KIND: ActionKind = ActionKind::new("person/save-complete");
}

/// Secondary notification emitted alongside [`SavePersonComplete`].
#[derive(Debug, Clone)]
pub struct PersonSavedNotice;

impl ActionTag for PersonSavedNotice {
    const KIND: ActionKind = ActionKind::new("person/saved-notice");
}

/// Add to the counter.
#[derive(Debug, Clone, Copy)]
pub struct Increment {
    /// Signed delta.
    pub amount: i64,
}

impl ActionTag for Increment {
    const KIND: ActionKind = ActionKind::new("counter/increment");
}

/// Always fails in the counter reducer; used for error-policy tests.
#[derive(Debug, Clone, Copy)]
pub struct FailCounter;

impl ActionTag for FailCounter {
    const KIND: ActionKind = ActionKind::new("counter/fail");
}

/// Reducers for the person and address features, seeded with the canonical
/// demo values ("Hello World", zip "12345").
#[must_use]
pub fn person_reducers() -> FeatureReducerCollection {
    FeatureReducerCollection::new(vec![
        FeatureReducer::build(PersonState::new("Hello", "World"))
            .on(|state: &PersonState, action: &UpdateFirstName| PersonState {
                first_name: action.name.clone(),
                ..state.clone()
            })
            .on(|state: &PersonState, action: &UpdateLastName| PersonState {
                last_name: action.name.clone(),
                ..state.clone()
            })
            .finish(),
        FeatureReducer::build(AddressState::new("12345"))
            .on(|_state: &AddressState, action: &ZipCodeUpdated| {
                AddressState::new(action.zip_code.clone())
            })
            .finish(),
    ])
}

/// Reducers for the counter feature, including a deliberately failing
/// transition for [`FailCounter`].
#[must_use]
pub fn counter_reducers() -> FeatureReducerCollection {
    FeatureReducerCollection::new(vec![
        FeatureReducer::build(CounterState { value: 0 })
            .on(|state: &CounterState, action: &Increment| CounterState {
                value: state.value + action.amount,
            })
            .try_on(|_state: &CounterState, _action: &FailCounter| {
                Err(ReduceError::failed("counter reducer failed"))
            })
            .finish(),
    ])
}

/// [`ReducerFactory`] wrapper around [`person_reducers`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PersonReducers;

impl ReducerFactory for PersonReducers {
    fn create(&self) -> FeatureReducerCollection {
        person_reducers()
    }
}

/// Shared selectors over the demo domain.
pub mod selectors {
    use super::{AddressState, Arc, PersonState, Selector, selector};

    /// The person feature.
    #[must_use]
    pub fn person() -> Selector<Arc<PersonState>> {
        selector::feature::<PersonState>()
    }

    /// The person's first name.
    #[must_use]
    pub fn first_name() -> Selector<String> {
        Selector::derive(&person(), |p: &Arc<PersonState>| p.first_name.clone())
    }

    /// The address feature.
    #[must_use]
    pub fn address() -> Selector<Arc<AddressState>> {
        selector::feature::<AddressState>()
    }

    /// The address zip code.
    #[must_use]
    pub fn zip_code() -> Selector<String> {
        Selector::derive(&address(), |a: &Arc<AddressState>| a.zip_code.clone())
    }
}

/// Stand-in persistence service for the save-person effect.
#[derive(Debug, Default, Clone)]
pub struct PersonService;

impl PersonService {
    /// Pretend to persist a person.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches a real service.
    pub async fn save(&self, _person: &PersonState) -> Result<(), anyhow::Error> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(())
    }
}

/// Effects factory for the demo domain: saving a person emits
/// [`SavePersonComplete`] followed by [`PersonSavedNotice`].
pub struct PersonEffects {
    service: Arc<PersonService>,
}

impl PersonEffects {
    /// Build the factory around a service instance.
    #[must_use]
    pub fn new(service: Arc<PersonService>) -> Self {
        Self { service }
    }
}

impl EffectsFactory for PersonEffects {
    fn create(&self) -> Vec<Effect> {
        let service = Arc::clone(&self.service);
        vec![Effect::on(move |action: Arc<SavePerson>| {
            let service = Arc::clone(&service);
            async move {
                service.save(&action.person).await?;
                Ok(vec![
                    Arc::new(SavePersonComplete) as AnyAction,
                    Arc::new(PersonSavedNotice) as AnyAction,
                ])
            }
        })]
    }
}
