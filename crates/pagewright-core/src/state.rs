//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Shared page state with transactional patching and a single change observer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use pagewright_common::config::StateConfig;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::StateError;

/// Flat key/value page state.
pub type PageState = Map<String, Value>;

/// Observer notified with the new state after every committed change.
pub type StateObserver = Arc<dyn Fn(&PageState) + Send + Sync>;

/// Default number of committed states kept as history.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Contract for the store holding the current page's data.
pub trait PageStateManager: Send + Sync + fmt::Debug {
    /// Drop all history and any open transaction.
    fn clear(&self);

    /// Apply a shallow patch, or queue it while a transaction is open.
    fn set_state(&self, patch: PageState) -> Result<(), StateError>;

    /// Newest committed state. Pre-transaction snapshot while a transaction is open.
    fn get_state(&self) -> PageState;

    /// Committed state history, oldest first.
    fn get_all_states(&self) -> Vec<PageState>;

    /// Patches queued by the open transaction.
    fn get_transaction_state_patches(&self) -> Vec<PageState>;

    fn begin_transaction(&self);

    fn commit_transaction(&self);

    fn cancel_transaction(&self);

    /// Install (or remove) the single change observer.
    fn set_on_change(&self, observer: Option<StateObserver>);
}

#[derive(Default)]
struct StateInner {
    states: VecDeque<PageState>,
    pending: Option<Vec<PageState>>,
    on_change: Option<StateObserver>,
}

/// In-memory [`PageStateManager`] keeping a bounded history of committed states.
pub struct InMemoryPageStateManager {
    history_limit: usize,
    inner: Mutex<StateInner>,
}

impl fmt::Debug for InMemoryPageStateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("InMemoryPageStateManager")
            .field("history_limit", &self.history_limit)
            .field("states", &inner.states.len())
            .field("in_transaction", &inner.pending.is_some())
            .field("observed", &inner.on_change.is_some())
            .finish()
    }
}

impl Default for InMemoryPageStateManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl InMemoryPageStateManager {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit: history_limit.max(1),
            inner: Mutex::new(StateInner::default()),
        }
    }

    pub fn from_config(config: &StateConfig) -> Self {
        Self::new(config.history_limit)
    }

    fn push_state(&self, inner: &mut StateInner, state: PageState) {
        inner.states.push_back(state);
        while inner.states.len() > self.history_limit {
            inner.states.pop_front();
        }
    }

    /// Push a new state and hand back what the observer should see.
    /// The observer is called by the caller after the lock is released.
    fn commit_locked(
        &self,
        inner: &mut StateInner,
        patches: Vec<PageState>,
    ) -> Option<(StateObserver, PageState)> {
        let mut next = inner.states.back().cloned().unwrap_or_default();
        for patch in patches {
            next.extend(patch);
        }
        self.push_state(inner, next.clone());
        inner.on_change.clone().map(|observer| (observer, next))
    }
}

impl PageStateManager for InMemoryPageStateManager {
    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.states.clear();
        inner.pending = None;
    }

    fn set_state(&self, patch: PageState) -> Result<(), StateError> {
        let notify = {
            let mut inner = self.inner.lock();
            if let Some(pending) = inner.pending.as_mut() {
                pending.push(patch);
                None
            } else {
                self.commit_locked(&mut inner, vec![patch])
            }
        };
        if let Some((observer, state)) = notify {
            observer(&state);
        }
        Ok(())
    }

    fn get_state(&self) -> PageState {
        self.inner.lock().states.back().cloned().unwrap_or_default()
    }

    fn get_all_states(&self) -> Vec<PageState> {
        self.inner.lock().states.iter().cloned().collect()
    }

    fn get_transaction_state_patches(&self) -> Vec<PageState> {
        self.inner.lock().pending.clone().unwrap_or_default()
    }

    fn begin_transaction(&self) {
        let mut inner = self.inner.lock();
        if let Some(discarded) = inner.pending.replace(Vec::new()) {
            warn!(
                discarded = discarded.len(),
                "state transaction already open; queued patches discarded"
            );
        }
    }

    fn commit_transaction(&self) {
        let notify = {
            let mut inner = self.inner.lock();
            let Some(patches) = inner.pending.take() else {
                warn!("commit requested without an open state transaction");
                return;
            };
            if patches.is_empty() {
                debug!("empty state transaction committed");
                return;
            }
            self.commit_locked(&mut inner, patches)
        };
        if let Some((observer, state)) = notify {
            observer(&state);
        }
    }

    fn cancel_transaction(&self) {
        self.inner.lock().pending = None;
    }

    fn set_on_change(&self, observer: Option<StateObserver>) {
        self.inner.lock().on_change = observer;
    }
}
