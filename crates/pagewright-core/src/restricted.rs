//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Allow-list view over the page state manager handed to extensions.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::error::StateError;
use crate::state::{PageState, PageStateManager, StateObserver};

/// State manager view that only accepts patches within an allow-list of keys.
///
/// A patch carrying any key outside the list is rejected as a whole; nothing
/// from it is applied. Reads and transaction controls are forwarded untouched.
#[derive(Debug, Clone)]
pub struct RestrictedPageStateManager {
    inner: Arc<dyn PageStateManager>,
    allowed: BTreeSet<String>,
}

impl RestrictedPageStateManager {
    pub fn new<I, S>(inner: Arc<dyn PageStateManager>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner,
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allowed_keys(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.allowed.contains(key)
    }
}

impl PageStateManager for RestrictedPageStateManager {
    fn clear(&self) {
        self.inner.clear();
    }

    fn set_state(&self, patch: PageState) -> Result<(), StateError> {
        let rejected: Vec<String> = patch
            .keys()
            .filter(|key| !self.allowed.contains(key.as_str()))
            .cloned()
            .collect();
        if !rejected.is_empty() {
            let allowed: Vec<String> = self.allowed.iter().cloned().collect();
            warn!(
                keys = ?rejected,
                allowed = ?allowed,
                "extension state patch rejected by allow-list"
            );
            return Err(StateError::PolicyViolation {
                keys: rejected,
                allowed,
            });
        }
        self.inner.set_state(patch)
    }

    fn get_state(&self) -> PageState {
        self.inner.get_state()
    }

    fn get_all_states(&self) -> Vec<PageState> {
        self.inner.get_all_states()
    }

    fn get_transaction_state_patches(&self) -> Vec<PageState> {
        self.inner.get_transaction_state_patches()
    }

    fn begin_transaction(&self) {
        self.inner.begin_transaction();
    }

    fn commit_transaction(&self) {
        self.inner.commit_transaction();
    }

    fn cancel_transaction(&self) {
        self.inner.cancel_transaction();
    }

    fn set_on_change(&self, observer: Option<StateObserver>) {
        self.inner.set_on_change(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryPageStateManager;
    use serde_json::{json, Value};

    fn patch(value: Value) -> PageState {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn rejects_whole_patch_with_foreign_key() {
        let shared: Arc<dyn PageStateManager> = Arc::new(InMemoryPageStateManager::default());
        let restricted = RestrictedPageStateManager::new(shared.clone(), ["user"]);

        let err = restricted
            .set_state(patch(json!({"user": 1, "other": 2})))
            .expect_err("foreign key must be rejected");
        assert_eq!(
            err,
            StateError::PolicyViolation {
                keys: vec!["other".to_string()],
                allowed: vec!["user".to_string()],
            }
        );
        assert!(shared.get_state().is_empty(), "no partial patch applied");

        restricted.set_state(patch(json!({"user": 1}))).expect("allowed");
        assert_eq!(shared.get_state(), patch(json!({"user": 1})));
    }

    #[test]
    fn reads_and_transactions_pass_through() {
        let shared: Arc<dyn PageStateManager> = Arc::new(InMemoryPageStateManager::default());
        shared.set_state(patch(json!({"title": "home"}))).unwrap();
        let restricted = RestrictedPageStateManager::new(shared.clone(), ["count"]);

        assert_eq!(restricted.get_state(), patch(json!({"title": "home"})));
        restricted.begin_transaction();
        restricted.set_state(patch(json!({"count": 1}))).unwrap();
        assert_eq!(shared.get_transaction_state_patches().len(), 1);
        restricted.commit_transaction();
        assert_eq!(
            shared.get_state(),
            patch(json!({"title": "home", "count": 1}))
        );
        assert!(restricted.is_allowed("count"));
        assert!(!restricted.is_allowed("title"));
    }
}
