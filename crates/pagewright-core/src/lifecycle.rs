//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Lifecycle contracts implemented by controllers, extensions and views, and the
//! state handles the orchestrator hands them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::StateError;
use crate::events::EventOutcome;
use crate::loaded::LoadedState;
use crate::route::{Action, RouteParams};
use crate::state::{PageState, PageStateManager};

/// Arguments passed to every lifecycle callback.
#[derive(Debug, Clone)]
pub struct LifecycleContext<S> {
    /// Name of the route being managed.
    pub route: Arc<str>,
    pub params: RouteParams,
    pub action: Action,
    /// State access handle for the callee.
    pub state: S,
}

pub type ControllerContext = LifecycleContext<ControllerState>;
pub type ExtensionContext = LifecycleContext<ExtensionState>;

/// Controller access to the shared page state manager.
#[derive(Clone, Default)]
pub struct ControllerState {
    manager: Arc<Mutex<Option<Arc<dyn PageStateManager>>>>,
}

impl fmt::Debug for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerState")
            .field("attached", &self.manager.lock().is_some())
            .finish()
    }
}

impl ControllerState {
    pub fn attached(manager: Arc<dyn PageStateManager>) -> Self {
        Self {
            manager: Arc::new(Mutex::new(Some(manager))),
        }
    }

    fn manager(&self) -> Option<Arc<dyn PageStateManager>> {
        self.manager.lock().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.manager.lock().is_some()
    }

    pub fn set_state(&self, patch: PageState) -> Result<(), StateError> {
        self.manager()
            .ok_or(StateError::Detached)?
            .set_state(patch)
    }

    /// Current page state, empty once detached.
    pub fn state(&self) -> PageState {
        self.manager()
            .map(|manager| manager.get_state())
            .unwrap_or_default()
    }

    pub fn begin_transaction(&self) -> Result<(), StateError> {
        self.manager().ok_or(StateError::Detached)?.begin_transaction();
        Ok(())
    }

    pub fn commit_transaction(&self) -> Result<(), StateError> {
        self.manager().ok_or(StateError::Detached)?.commit_transaction();
        Ok(())
    }

    pub fn cancel_transaction(&self) -> Result<(), StateError> {
        self.manager().ok_or(StateError::Detached)?.cancel_transaction();
        Ok(())
    }

    pub(crate) fn detach(&self) {
        self.manager.lock().take();
    }
}

/// Where an extension's state writes currently land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMode {
    /// Writes are buffered in the extension's partial state.
    Partial,
    /// Writes go through the extension's restricted view of the shared manager.
    Shared,
}

struct ExtensionStateInner {
    mode: StateMode,
    partial: PageState,
    manager: Option<Arc<dyn PageStateManager>>,
}

/// Extension access to page state: a partial buffer during load, the
/// restricted shared manager afterwards.
#[derive(Clone)]
pub struct ExtensionState {
    inner: Arc<Mutex<ExtensionStateInner>>,
}

impl Default for ExtensionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExtensionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ExtensionState")
            .field("mode", &inner.mode)
            .field("partial", &inner.partial)
            .field("attached", &inner.manager.is_some())
            .finish()
    }
}

impl ExtensionState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ExtensionStateInner {
                mode: StateMode::Shared,
                partial: PageState::new(),
                manager: None,
            })),
        }
    }

    pub fn mode(&self) -> StateMode {
        self.inner.lock().mode
    }

    /// Patch page state according to the current mode.
    pub fn set_state(&self, patch: PageState) -> Result<(), StateError> {
        let manager = {
            let mut inner = self.inner.lock();
            if inner.mode == StateMode::Partial {
                inner.partial.extend(patch);
                return Ok(());
            }
            inner.manager.clone()
        };
        manager.ok_or(StateError::Detached)?.set_state(patch)
    }

    /// Partial buffer in partial mode, shared state otherwise.
    pub fn state(&self) -> PageState {
        let manager = {
            let inner = self.inner.lock();
            if inner.mode == StateMode::Partial {
                return inner.partial.clone();
            }
            inner.manager.clone()
        };
        manager
            .map(|manager| manager.get_state())
            .unwrap_or_default()
    }

    pub fn partial_state(&self) -> PageState {
        self.inner.lock().partial.clone()
    }

    pub fn set_partial_state(&self, patch: PageState) {
        self.inner.lock().partial.extend(patch);
    }

    pub fn clear_partial_state(&self) {
        self.inner.lock().partial.clear();
    }

    pub fn switch_to_partial_state(&self) {
        self.inner.lock().mode = StateMode::Partial;
    }

    pub fn switch_to_state_manager(&self) {
        self.inner.lock().mode = StateMode::Shared;
    }

    pub fn set_page_state_manager(&self, manager: Arc<dyn PageStateManager>) {
        self.inner.lock().manager = Some(manager);
    }

    pub(crate) fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.manager = None;
        inner.partial.clear();
        inner.mode = StateMode::Shared;
    }
}

/// Primary owner of a page's data.
#[async_trait]
pub trait Controller: Send + Sync {
    fn name(&self) -> &str;

    /// Extensions attached to this controller, in registration order.
    fn extensions(&self) -> Vec<Arc<dyn Extension>> {
        Vec::new()
    }

    async fn init(&self, _cx: &ControllerContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn load(&self, cx: &ControllerContext) -> anyhow::Result<LoadedState>;

    /// Refresh data in place when the page is reused for new params.
    async fn update(
        &self,
        _cx: &ControllerContext,
        _previous: &RouteParams,
    ) -> anyhow::Result<LoadedState> {
        Ok(LoadedState::new())
    }

    async fn activate(&self, _cx: &ControllerContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn deactivate(&self, _cx: &ControllerContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn destroy(&self, _cx: &ControllerContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Offer a page event under its derived handler name.
    async fn dispatch_event(
        &self,
        _cx: &ControllerContext,
        _method: &str,
        _data: &Value,
    ) -> anyhow::Result<EventOutcome> {
        Ok(EventOutcome::Unhandled)
    }
}

/// Secondary contributor to a page's state, scoped to a set of keys.
#[async_trait]
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    /// Keys this extension may write besides the ones it produces from `load`/`update`.
    fn allowed_state_keys(&self) -> Vec<String> {
        Vec::new()
    }

    async fn init(&self, _cx: &ExtensionContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn load(&self, _cx: &ExtensionContext) -> anyhow::Result<LoadedState> {
        Ok(LoadedState::new())
    }

    async fn update(
        &self,
        _cx: &ExtensionContext,
        _previous: &RouteParams,
    ) -> anyhow::Result<LoadedState> {
        Ok(LoadedState::new())
    }

    async fn activate(&self, _cx: &ExtensionContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn deactivate(&self, _cx: &ExtensionContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn destroy(&self, _cx: &ExtensionContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn dispatch_event(
        &self,
        _cx: &ExtensionContext,
        _method: &str,
        _data: &Value,
    ) -> anyhow::Result<EventOutcome> {
        Ok(EventOutcome::Unhandled)
    }
}

/// Opaque view handed to the renderer.
pub trait View: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryPageStateManager;
    use serde_json::json;

    fn patch(value: Value) -> PageState {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn partial_mode_buffers_writes() {
        let shared: Arc<dyn PageStateManager> = Arc::new(InMemoryPageStateManager::default());
        let state = ExtensionState::new();
        state.set_page_state_manager(shared.clone());
        state.switch_to_partial_state();
        state.set_partial_state(patch(json!({"seed": true})));

        state.set_state(patch(json!({"count": 1}))).unwrap();
        assert_eq!(state.state(), patch(json!({"seed": true, "count": 1})));
        assert!(shared.get_state().is_empty());

        state.switch_to_state_manager();
        state.clear_partial_state();
        state.set_state(patch(json!({"count": 2}))).unwrap();
        assert_eq!(shared.get_state(), patch(json!({"count": 2})));
        assert!(state.partial_state().is_empty());
    }

    #[test]
    fn shared_mode_without_manager_is_detached() {
        let state = ExtensionState::new();
        assert_eq!(
            state.set_state(patch(json!({"a": 1}))),
            Err(StateError::Detached)
        );
    }

    #[test]
    fn controller_state_detaches() {
        let shared: Arc<dyn PageStateManager> = Arc::new(InMemoryPageStateManager::default());
        let state = ControllerState::attached(shared.clone());
        state.set_state(patch(json!({"a": 1}))).unwrap();
        state.begin_transaction().unwrap();
        state.set_state(patch(json!({"a": 2}))).unwrap();
        assert_eq!(state.state(), patch(json!({"a": 1})));
        state.commit_transaction().unwrap();
        assert_eq!(state.state(), patch(json!({"a": 2})));

        let copy = state.clone();
        state.detach();
        assert!(!copy.is_attached());
        assert_eq!(copy.set_state(patch(json!({"a": 3}))), Err(StateError::Detached));
        assert!(copy.state().is_empty());
    }
}
