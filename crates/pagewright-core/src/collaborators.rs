//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Boundaries to the object factory, the renderer and the event bus.

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::lifecycle::{Controller, View};
use crate::loaded::LoadedState;
use crate::restricted::RestrictedPageStateManager;
use crate::route::{ControllerRef, RouteOptions, ViewRef};
use crate::state::{PageState, PageStateManager};

/// Fired on the dispatcher before a lazily resolved route is loaded.
pub const BEFORE_LOADING_ASYNC_ROUTE: &str = "beforeLoadingAsyncRoute";
/// Fired on the dispatcher once a lazily resolved route finished loading.
pub const AFTER_LOADING_ASYNC_ROUTE: &str = "afterLoadingAsyncRoute";
/// Status reported for a superseded transition.
pub const CONFLICT_STATUS: u16 = 409;

/// Builds controllers and views for resolved identities.
pub trait PageFactory: Send + Sync {
    fn create_controller(
        &self,
        controller: &ControllerRef,
        options: &RouteOptions,
    ) -> anyhow::Result<Arc<dyn Controller>>;

    /// Wrap a controller for cross-cutting metadata access. Identity by default.
    fn decorate_controller(&self, controller: Arc<dyn Controller>) -> Arc<dyn Controller> {
        controller
    }

    fn create_view(&self, view: &ViewRef) -> anyhow::Result<Arc<dyn View>>;

    /// State manager view handed to an extension.
    fn decorate_page_state_manager(
        &self,
        manager: Arc<dyn PageStateManager>,
        allowed_keys: Vec<String>,
    ) -> Arc<dyn PageStateManager> {
        Arc::new(RestrictedPageStateManager::new(manager, allowed_keys))
    }
}

type ControllerBuilder =
    Arc<dyn Fn(&RouteOptions) -> anyhow::Result<Arc<dyn Controller>> + Send + Sync>;
type ViewBuilder = Arc<dyn Fn() -> anyhow::Result<Arc<dyn View>> + Send + Sync>;

/// [`PageFactory`] backed by builder closures registered per identity.
#[derive(Default, Clone)]
pub struct RegistryPageFactory {
    controllers: IndexMap<String, ControllerBuilder>,
    views: IndexMap<String, ViewBuilder>,
}

impl fmt::Debug for RegistryPageFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryPageFactory")
            .field("controllers", &self.controllers.keys().collect::<Vec<_>>())
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RegistryPageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_controller<F>(&mut self, id: impl Into<String>, builder: F) -> &mut Self
    where
        F: Fn(&RouteOptions) -> anyhow::Result<Arc<dyn Controller>> + Send + Sync + 'static,
    {
        self.controllers.insert(id.into(), Arc::new(builder));
        self
    }

    pub fn register_view<F>(&mut self, id: impl Into<String>, builder: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn View>> + Send + Sync + 'static,
    {
        self.views.insert(id.into(), Arc::new(builder));
        self
    }
}

impl PageFactory for RegistryPageFactory {
    fn create_controller(
        &self,
        controller: &ControllerRef,
        options: &RouteOptions,
    ) -> anyhow::Result<Arc<dyn Controller>> {
        let builder = self
            .controllers
            .get(controller.as_str())
            .ok_or_else(|| anyhow!("no controller registered as '{}'", controller))?;
        builder(options)
    }

    fn create_view(&self, view: &ViewRef) -> anyhow::Result<Arc<dyn View>> {
        let builder = self
            .views
            .get(view.as_str())
            .ok_or_else(|| anyhow!("no view registered as '{}'", view))?;
        builder()
    }
}

/// What the renderer produced for a transition.
#[derive(Debug, Clone, Serialize)]
pub struct RenderResponse {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub page_state: PageState,
}

impl RenderResponse {
    pub fn ok(page_state: PageState) -> Self {
        Self {
            status: 200,
            content: None,
            page_state,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Turns a loaded page into output. Markup production lives behind this trait.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn mount(
        &self,
        controller: Arc<dyn Controller>,
        view: Arc<dyn View>,
        state: LoadedState,
        options: &RouteOptions,
    ) -> anyhow::Result<RenderResponse>;

    async fn update(
        &self,
        controller: Arc<dyn Controller>,
        view: Arc<dyn View>,
        state: LoadedState,
        options: &RouteOptions,
    ) -> anyhow::Result<RenderResponse>;

    async fn unmount(&self) -> anyhow::Result<()>;

    /// Committed state changes while a page is managed.
    fn set_state(&self, state: &PageState);
}

/// Event bus receiving the async route notifications.
pub trait Dispatcher: Send + Sync {
    fn fire(&self, event: &str, data: &Value);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatcher;

impl Dispatcher for NoopDispatcher {
    fn fire(&self, _event: &str, _data: &Value) {}
}
