//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! State returned by `load`/`update`: a mix of ready values and values still being fetched.

use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::error::StateValueError;
use crate::state::PageState;

/// Cloneable handle on a value that is still being produced.
pub type SharedValue = Shared<BoxFuture<'static, Result<Value, StateValueError>>>;

/// One entry of a [`LoadedState`].
#[derive(Clone)]
pub enum StateValue {
    Ready(Value),
    Pending(SharedValue),
}

impl StateValue {
    pub fn ready(value: impl Into<Value>) -> Self {
        StateValue::Ready(value.into())
    }

    /// Wrap a future producing the value. Errors are stringified so the handle stays cloneable.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let future = async move { future.await.map_err(|err| StateValueError(format!("{err:#}"))) };
        StateValue::Pending(future.boxed().shared())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, StateValue::Ready(_))
    }

    /// Await the value, whichever variant it is.
    pub async fn resolve(self) -> Result<Value, StateValueError> {
        match self {
            StateValue::Ready(value) => Ok(value),
            StateValue::Pending(shared) => shared.await,
        }
    }
}

impl fmt::Debug for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            StateValue::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        StateValue::Ready(value)
    }
}

/// Ordered key to value mapping produced by a controller or extension.
#[derive(Debug, Clone, Default)]
pub struct LoadedState {
    entries: IndexMap<String, StateValue>,
}

impl LoadedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<StateValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder flavour of [`LoadedState::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Layer `other` over `self`. Keys present in both take `other`'s value.
    pub fn merge(&mut self, other: LoadedState) {
        for (key, value) in other.entries {
            self.entries.insert(key, value);
        }
    }

    /// Values that are already available.
    pub fn ready_state(&self) -> PageState {
        self.entries
            .iter()
            .filter_map(|(key, value)| match value {
                StateValue::Ready(value) => Some((key.clone(), value.clone())),
                StateValue::Pending(_) => None,
            })
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        self.entries.values().any(|value| !value.is_ready())
    }

    /// Handles of every pending value, keyed.
    pub fn pending_values(&self) -> Vec<(String, SharedValue)> {
        self.entries
            .iter()
            .filter_map(|(key, value)| match value {
                StateValue::Pending(shared) => Some((key.clone(), shared.clone())),
                StateValue::Ready(_) => None,
            })
            .collect()
    }

    /// Await every pending value. Failed values are logged and left out.
    pub async fn settle(&self) -> PageState {
        let mut state = PageState::new();
        for (key, value) in &self.entries {
            match value.clone().resolve().await {
                Ok(value) => {
                    state.insert(key.clone(), value);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "state value failed to load");
                }
            }
        }
        state
    }
}

impl From<PageState> for LoadedState {
    fn from(state: PageState) -> Self {
        Self {
            entries: state
                .into_iter()
                .map(|(key, value)| (key, StateValue::Ready(value)))
                .collect(),
        }
    }
}

impl FromIterator<(String, StateValue)> for LoadedState {
    fn from_iter<T: IntoIterator<Item = (String, StateValue)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
