//! ---
//! pw_section: "01-core-functionality"
//! pw_subsection: "binary"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Config-declared pages, renderer and handlers wired into the orchestrator."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use pagewright_common::config::{AppConfig, ExtensionConfig, PageConfig};
use pagewright_core::{
    Action, Controller, ControllerContext, ControllerRef, Dispatcher, EventOutcome, Extension,
    ExtensionContext, InMemoryPageStateManager, LazyRoute, LoadedState, ManageRequest,
    ManagedPage, PageHandler, PageHandlerRegistry, PageManager, PageRenderer, PageRoute,
    PageState, RegistryPageFactory, RenderResponse, RouteOptions, RouteParams, StateValue,
    StaticRoute, View, ViewRef,
};
use pagewright_logging::{pw_debug, pw_info, LogContext};
use serde_json::{json, Value};
use tracing::info;

fn ready_state(state: &IndexMap<String, Value>) -> LoadedState {
    state
        .iter()
        .map(|(key, value)| (key.clone(), StateValue::ready(value.clone())))
        .collect()
}

/// Controller serving the state declared for a page.
struct DemoController {
    name: String,
    delay: Duration,
    state: IndexMap<String, Value>,
    extensions: Vec<Arc<dyn Extension>>,
}

impl DemoController {
    async fn produce(&self, params: &RouteParams) -> Result<LoadedState> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut loaded = ready_state(&self.state);
        if !params.is_empty() {
            loaded.insert("params", serde_json::to_value(params)?);
        }
        Ok(loaded)
    }
}

#[async_trait]
impl Controller for DemoController {
    fn name(&self) -> &str {
        &self.name
    }

    fn extensions(&self) -> Vec<Arc<dyn Extension>> {
        self.extensions.clone()
    }

    async fn load(&self, cx: &ControllerContext) -> Result<LoadedState> {
        self.produce(&cx.params).await
    }

    async fn update(&self, cx: &ControllerContext, _previous: &RouteParams) -> Result<LoadedState> {
        self.produce(&cx.params).await
    }

    async fn dispatch_event(
        &self,
        cx: &ControllerContext,
        method: &str,
        data: &Value,
    ) -> Result<EventOutcome> {
        if method != "on_refresh" {
            return Ok(EventOutcome::Unhandled);
        }
        let mut patch = PageState::new();
        patch.insert("refreshed".to_owned(), data.clone());
        cx.state.set_state(patch)?;
        Ok(EventOutcome::Handled)
    }
}

/// Extension contributing its declared state. A non-zero delay makes every value pending.
struct DemoExtension {
    name: String,
    delay: Duration,
    allowed_keys: Vec<String>,
    state: IndexMap<String, Value>,
}

impl DemoExtension {
    fn new(name: &str, config: &ExtensionConfig) -> Self {
        Self {
            name: name.to_owned(),
            delay: config.load_delay,
            allowed_keys: config.allowed_keys.clone(),
            state: config.state.clone(),
        }
    }
}

#[async_trait]
impl Extension for DemoExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn allowed_state_keys(&self) -> Vec<String> {
        self.allowed_keys.clone()
    }

    async fn load(&self, _cx: &ExtensionContext) -> Result<LoadedState> {
        if self.delay.is_zero() {
            return Ok(ready_state(&self.state));
        }
        let delay = self.delay;
        Ok(self
            .state
            .iter()
            .map(|(key, value)| {
                let value = value.clone();
                let pending = StateValue::pending(async move {
                    tokio::time::sleep(delay).await;
                    Ok(value)
                });
                (key.clone(), pending)
            })
            .collect())
    }
}

#[derive(Debug)]
struct DemoView {
    name: String,
}

impl View for DemoView {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Renders a page as its settled state, with the view name as content.
#[derive(Debug, Default)]
pub struct JsonPageRenderer {
    pushes: AtomicUsize,
}

impl JsonPageRenderer {
    /// Number of committed states pushed while a page was managed.
    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::Relaxed)
    }

    async fn render(
        &self,
        phase: &str,
        controller: Arc<dyn Controller>,
        view: Arc<dyn View>,
        state: LoadedState,
        options: &RouteOptions,
    ) -> RenderResponse {
        let page_state = state.settle().await;
        let ctx = LogContext::new()
            .with_controller(controller.name())
            .with_view(view.name());
        pw_debug!(
            context = ctx,
            "{} rendered {} keys (auto_scroll={})",
            phase,
            page_state.len(),
            options.auto_scroll
        );
        RenderResponse::ok(page_state).with_content(view.name())
    }
}

#[async_trait]
impl PageRenderer for JsonPageRenderer {
    async fn mount(
        &self,
        controller: Arc<dyn Controller>,
        view: Arc<dyn View>,
        state: LoadedState,
        options: &RouteOptions,
    ) -> Result<RenderResponse> {
        Ok(self.render("mount", controller, view, state, options).await)
    }

    async fn update(
        &self,
        controller: Arc<dyn Controller>,
        view: Arc<dyn View>,
        state: LoadedState,
        options: &RouteOptions,
    ) -> Result<RenderResponse> {
        Ok(self.render("update", controller, view, state, options).await)
    }

    async fn unmount(&self) -> Result<()> {
        pw_debug!("renderer unmounted");
        Ok(())
    }

    fn set_state(&self, state: &PageState) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
        pw_debug!("state pushed with {} keys", state.len());
    }
}

/// Logs every transition the orchestrator lives through.
struct NavigationLogHandler;

#[async_trait]
impl PageHandler for NavigationLogHandler {
    fn name(&self) -> &str {
        "navigation-log"
    }

    async fn handle_pre_managed_state(
        &self,
        managed: &ManagedPage,
        next: &ManagedPage,
        action: &Action,
    ) -> Result<()> {
        let ctx = LogContext::new().with_route(next.route_name().unwrap_or(""));
        pw_info!(
            context = ctx,
            "leaving '{}' ({:?})",
            managed.route_name().unwrap_or("-"),
            action.kind
        );
        Ok(())
    }

    async fn handle_post_managed_state(
        &self,
        managed: &ManagedPage,
        _previous: &ManagedPage,
        _action: &Action,
    ) -> Result<()> {
        let ctx = LogContext::new()
            .with_route(managed.route_name().unwrap_or(""))
            .with_transition(managed.transition());
        pw_info!(context = ctx, "page settled in phase {:?}", managed.phase());
        Ok(())
    }
}

struct TracingDispatcher;

impl Dispatcher for TracingDispatcher {
    fn fire(&self, event: &str, data: &Value) {
        info!(event, data = %data, "route notification");
    }
}

/// Page name to route and options, as declared in the configuration.
pub struct PageTable {
    routes: IndexMap<String, (Arc<dyn PageRoute>, RouteOptions)>,
}

impl PageTable {
    pub fn from_config(config: &AppConfig) -> Self {
        let routes = config
            .pages
            .iter()
            .map(|(name, page)| {
                let mut options = RouteOptions::from(&config.routes);
                if let Some(only_update) = page.only_update {
                    options.only_update = only_update.into();
                }
                (name.clone(), (route_for(name, page), options))
            })
            .collect();
        Self { routes }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn request(&self, page: &str, params: &RouteParams) -> Result<ManageRequest> {
        let (route, options) = self
            .routes
            .get(page)
            .ok_or_else(|| anyhow!("unknown page '{}'", page))?;
        Ok(ManageRequest::new(route.clone())
            .with_options(options.clone())
            .with_params(params.clone())
            .with_action(Action::default().with_url(format!("/{page}"))))
    }
}

fn route_for(name: &str, page: &PageConfig) -> Arc<dyn PageRoute> {
    if !page.lazy {
        return Arc::new(StaticRoute::new(
            name,
            page.controller.as_str(),
            page.view.as_str(),
        ));
    }
    let controller = page.controller.clone();
    let view = page.view.clone();
    Arc::new(LazyRoute::new(
        name,
        move || {
            let controller = controller.clone();
            async move { Ok(ControllerRef::new(controller)) }
        },
        move || {
            let view = view.clone();
            async move { Ok(ViewRef::new(view)) }
        },
    ))
}

fn factory_from_config(config: &AppConfig) -> RegistryPageFactory {
    let mut factory = RegistryPageFactory::new();
    for page in config.pages.values() {
        let extensions: Vec<(String, ExtensionConfig)> = page
            .extensions
            .iter()
            .filter_map(|name| {
                config
                    .extensions
                    .get(name)
                    .map(|extension| (name.clone(), extension.clone()))
            })
            .collect();
        let name = page.controller.clone();
        let delay = page.load_delay;
        let state = page.state.clone();
        factory.register_controller(page.controller.clone(), move |_options| {
            let extensions = extensions
                .iter()
                .map(|(name, config)| {
                    Arc::new(DemoExtension::new(name, config)) as Arc<dyn Extension>
                })
                .collect();
            Ok(Arc::new(DemoController {
                name: name.clone(),
                delay,
                state: state.clone(),
                extensions,
            }) as Arc<dyn Controller>)
        });
        let view = page.view.clone();
        factory.register_view(page.view.clone(), move || {
            Ok(Arc::new(DemoView { name: view.clone() }) as Arc<dyn View>)
        });
    }
    factory
}

/// Build an orchestrator over the pages declared in `config`.
pub fn build_manager(config: &AppConfig) -> (Arc<PageManager>, Arc<JsonPageRenderer>) {
    let renderer = Arc::new(JsonPageRenderer::default());
    let handlers = PageHandlerRegistry::new(vec![Arc::new(NavigationLogHandler)]);
    let manager = PageManager::new(
        Arc::new(factory_from_config(config)),
        renderer.clone(),
        Arc::new(InMemoryPageStateManager::from_config(&config.state)),
    )
    .with_handlers(Arc::new(handlers))
    .with_dispatcher(Arc::new(TracingDispatcher));
    (Arc::new(manager), renderer)
}

/// JSON document printed for one managed page.
pub fn outcome_document(page: &str, status: u16, response: Option<&RenderResponse>) -> Value {
    json!({
        "page": page,
        "status": status,
        "response": response,
    })
}
