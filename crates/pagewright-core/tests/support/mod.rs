//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "tests"
//! pw_type: "source"
//! pw_scope: "test"
//! pw_description: "Recording fakes shared by the page lifecycle integration suites."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use pagewright_core::{
    Action, Controller, ControllerContext, ControllerRef, ControllerState, Dispatcher,
    EventOutcome, EventSink, Extension, ExtensionContext, ExtensionState, InMemoryPageStateManager,
    LoadedState, ManageRequest, ManagedPage, OnlyUpdate, PageEvent, PageFactory, PageHandler,
    PageHandlerRegistry, PageManager, PageRenderer, PageRoute, PageState, PageStateManager,
    RegistryPageFactory, RenderResponse, RouteOptions, RouteParams, StaticRoute, StateValue, View,
    ViewRef,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Ordered record of every callback the fakes observed.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().iter().any(|candidate| candidate == entry)
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|candidate| candidate == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|candidate| *candidate == entry).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

pub fn object(value: Value) -> PageState {
    value.as_object().cloned().expect("object literal")
}

fn loaded(state: &PageState) -> LoadedState {
    LoadedState::from(state.clone())
}

pub struct ScriptedExtension {
    pub name: String,
    pub log: CallLog,
    pub allowed: Vec<String>,
    pub load_state: PageState,
    pub update_state: PageState,
    pub handles: Vec<String>,
    pub pending: Mutex<Option<tokio::sync::oneshot::Receiver<Value>>>,
    pub load_delay: Option<Duration>,
    pub captured: Mutex<Option<ExtensionState>>,
}

impl ScriptedExtension {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            allowed: Vec::new(),
            load_state: PageState::new(),
            update_state: PageState::new(),
            handles: Vec::new(),
            pending: Mutex::new(None),
            load_delay: None,
            captured: Mutex::new(None),
        }
    }

    pub fn slow_load(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn allowing(mut self, keys: &[&str]) -> Self {
        self.allowed = keys.iter().map(|key| key.to_string()).collect();
        self
    }

    pub fn loading(mut self, state: Value) -> Self {
        self.load_state = object(state);
        self
    }

    pub fn updating(mut self, state: Value) -> Self {
        self.update_state = object(state);
        self
    }

    pub fn handling(mut self, method: &str) -> Self {
        self.handles.push(method.to_string());
        self
    }

    /// Produce `key` from a channel the test resolves later.
    pub fn with_pending(self, receiver: tokio::sync::oneshot::Receiver<Value>) -> Self {
        *self.pending.lock() = Some(receiver);
        self
    }

    pub fn state(&self) -> ExtensionState {
        self.captured.lock().clone().expect("extension was initialized")
    }

    fn record(&self, stage: &str) {
        self.log.push(format!("{}:{}", self.name, stage));
    }
}

#[async_trait]
impl Extension for ScriptedExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn allowed_state_keys(&self) -> Vec<String> {
        self.allowed.clone()
    }

    async fn init(&self, cx: &ExtensionContext) -> anyhow::Result<()> {
        self.record("init");
        *self.captured.lock() = Some(cx.state.clone());
        Ok(())
    }

    async fn load(&self, _cx: &ExtensionContext) -> anyhow::Result<LoadedState> {
        self.record("load");
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
            self.record("load-done");
        }
        let mut state = loaded(&self.load_state);
        if let Some(receiver) = self.pending.lock().take() {
            state.insert(
                "deferred",
                StateValue::pending(async move {
                    receiver.await.map_err(|_| anyhow!("sender dropped"))
                }),
            );
        }
        Ok(state)
    }

    async fn update(
        &self,
        _cx: &ExtensionContext,
        _previous: &RouteParams,
    ) -> anyhow::Result<LoadedState> {
        self.record("update");
        Ok(loaded(&self.update_state))
    }

    async fn activate(&self, _cx: &ExtensionContext) -> anyhow::Result<()> {
        self.record("activate");
        Ok(())
    }

    async fn deactivate(&self, _cx: &ExtensionContext) -> anyhow::Result<()> {
        self.record("deactivate");
        Ok(())
    }

    async fn destroy(&self, _cx: &ExtensionContext) -> anyhow::Result<()> {
        self.record("destroy");
        Ok(())
    }

    async fn dispatch_event(
        &self,
        _cx: &ExtensionContext,
        method: &str,
        _data: &Value,
    ) -> anyhow::Result<EventOutcome> {
        if self.handles.iter().any(|handled| handled == method) {
            self.record(method);
            return Ok(EventOutcome::Handled);
        }
        Ok(EventOutcome::Unhandled)
    }
}

pub struct ScriptedController {
    pub name: String,
    pub log: CallLog,
    pub extensions: Vec<Arc<dyn Extension>>,
    pub load_state: PageState,
    pub update_state: PageState,
    pub init_delay: Option<Duration>,
    pub load_delay: Option<Duration>,
    pub fail_load: bool,
    pub fail_activate: bool,
    pub handles: Vec<String>,
    pub captured: Mutex<Option<ControllerState>>,
    pub seen_previous: Mutex<Option<RouteParams>>,
}

impl ScriptedController {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            extensions: Vec::new(),
            load_state: PageState::new(),
            update_state: PageState::new(),
            init_delay: None,
            load_delay: None,
            fail_load: false,
            fail_activate: false,
            handles: Vec::new(),
            captured: Mutex::new(None),
            seen_previous: Mutex::new(None),
        }
    }

    pub fn loading(mut self, state: Value) -> Self {
        self.load_state = object(state);
        self
    }

    pub fn updating(mut self, state: Value) -> Self {
        self.update_state = object(state);
        self
    }

    pub fn with_extension(mut self, extension: Arc<dyn Extension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn slow_init(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    pub fn slow_load(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn failing_activate(mut self) -> Self {
        self.fail_activate = true;
        self
    }

    pub fn handling(mut self, method: &str) -> Self {
        self.handles.push(method.to_string());
        self
    }

    pub fn state(&self) -> ControllerState {
        self.captured.lock().clone().expect("controller was initialized")
    }

    fn record(&self, stage: &str) {
        self.log.push(format!("{}:{}", self.name, stage));
    }
}

#[async_trait]
impl Controller for ScriptedController {
    fn name(&self) -> &str {
        &self.name
    }

    fn extensions(&self) -> Vec<Arc<dyn Extension>> {
        self.extensions.clone()
    }

    async fn init(&self, cx: &ControllerContext) -> anyhow::Result<()> {
        self.record("init");
        *self.captured.lock() = Some(cx.state.clone());
        if let Some(delay) = self.init_delay {
            tokio::time::sleep(delay).await;
            self.record("init-done");
        }
        Ok(())
    }

    async fn load(&self, _cx: &ControllerContext) -> anyhow::Result<LoadedState> {
        self.record("load");
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_load {
            return Err(anyhow!("{} could not load", self.name));
        }
        Ok(loaded(&self.load_state))
    }

    async fn update(
        &self,
        _cx: &ControllerContext,
        previous: &RouteParams,
    ) -> anyhow::Result<LoadedState> {
        self.record("update");
        *self.seen_previous.lock() = Some(previous.clone());
        Ok(loaded(&self.update_state))
    }

    async fn activate(&self, _cx: &ControllerContext) -> anyhow::Result<()> {
        self.record("activate");
        if self.fail_activate {
            return Err(anyhow!("{} could not activate", self.name));
        }
        Ok(())
    }

    async fn deactivate(&self, _cx: &ControllerContext) -> anyhow::Result<()> {
        self.record("deactivate");
        Ok(())
    }

    async fn destroy(&self, _cx: &ControllerContext) -> anyhow::Result<()> {
        self.record("destroy");
        Ok(())
    }

    async fn dispatch_event(
        &self,
        _cx: &ControllerContext,
        method: &str,
        _data: &Value,
    ) -> anyhow::Result<EventOutcome> {
        if self.handles.iter().any(|handled| handled == method) {
            self.record(method);
            return Ok(EventOutcome::Handled);
        }
        Ok(EventOutcome::Unhandled)
    }
}

#[derive(Debug)]
pub struct NamedView(pub String);

impl View for NamedView {
    fn name(&self) -> &str {
        &self.0
    }
}

/// Factory counting how many controllers it built.
pub struct CountingFactory {
    inner: RegistryPageFactory,
    constructions: AtomicUsize,
}

impl CountingFactory {
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

impl PageFactory for CountingFactory {
    fn create_controller(
        &self,
        controller: &ControllerRef,
        options: &RouteOptions,
    ) -> anyhow::Result<Arc<dyn Controller>> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        self.inner.create_controller(controller, options)
    }

    fn create_view(&self, view: &ViewRef) -> anyhow::Result<Arc<dyn View>> {
        self.inner.create_view(view)
    }
}

/// Renderer that records mounts and reports the ready part of the loaded state.
pub struct RecordingRenderer {
    log: CallLog,
    update_delay: Option<Duration>,
    pub pushed: Mutex<Vec<PageState>>,
}

impl RecordingRenderer {
    pub fn pushed_states(&self) -> Vec<PageState> {
        self.pushed.lock().clone()
    }
}

#[async_trait]
impl PageRenderer for RecordingRenderer {
    async fn mount(
        &self,
        controller: Arc<dyn Controller>,
        view: Arc<dyn View>,
        state: LoadedState,
        _options: &RouteOptions,
    ) -> anyhow::Result<RenderResponse> {
        self.log.push(format!("render:mount:{}", controller.name()));
        Ok(RenderResponse::ok(state.ready_state()).with_content(view.name().to_string()))
    }

    async fn update(
        &self,
        controller: Arc<dyn Controller>,
        view: Arc<dyn View>,
        state: LoadedState,
        _options: &RouteOptions,
    ) -> anyhow::Result<RenderResponse> {
        self.log.push(format!("render:update:{}", controller.name()));
        if let Some(delay) = self.update_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(RenderResponse::ok(state.ready_state()).with_content(view.name().to_string()))
    }

    async fn unmount(&self) -> anyhow::Result<()> {
        self.log.push("render:unmount");
        Ok(())
    }

    fn set_state(&self, state: &PageState) {
        self.pushed.lock().push(state.clone());
    }
}

pub struct RecordingHandler {
    log: CallLog,
}

#[async_trait]
impl PageHandler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    async fn handle_pre_managed_state(
        &self,
        _managed: &ManagedPage,
        next: &ManagedPage,
        _action: &Action,
    ) -> anyhow::Result<()> {
        let target = next.controller_ref().map(|c| c.to_string()).unwrap_or_default();
        self.log.push(format!("handler:pre:{target}"));
        Ok(())
    }

    async fn handle_post_managed_state(
        &self,
        managed: &ManagedPage,
        _previous: &ManagedPage,
        _action: &Action,
    ) -> anyhow::Result<()> {
        let target = managed.controller_ref().map(|c| c.to_string()).unwrap_or_default();
        self.log.push(format!("handler:post:{target}"));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub fired: Mutex<Vec<String>>,
}

impl Dispatcher for RecordingDispatcher {
    fn fire(&self, event: &str, _data: &Value) {
        self.fired.lock().push(event.to_string());
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub unhandled: Mutex<Vec<String>>,
}

impl EventSink for RecordingSink {
    fn unhandled(&self, _event: &PageEvent, method: &str) {
        self.unhandled.lock().push(method.to_string());
    }
}

/// Page manager wired to recording fakes.
pub struct Harness {
    pub log: CallLog,
    pub manager: Arc<PageManager>,
    pub factory: Arc<CountingFactory>,
    pub renderer: Arc<RecordingRenderer>,
    pub state: Arc<InMemoryPageStateManager>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub struct HarnessBuilder {
    log: CallLog,
    factory: RegistryPageFactory,
    update_delay: Option<Duration>,
}

impl HarnessBuilder {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            factory: RegistryPageFactory::new(),
            update_delay: None,
        }
    }

    /// Make in-place renders take `delay` after they are logged.
    pub fn slow_update_render(mut self, delay: Duration) -> Self {
        self.update_delay = Some(delay);
        self
    }

    /// Register a controller id, built afresh by `build` on every construction.
    pub fn controller<F>(mut self, id: &str, build: F) -> Self
    where
        F: Fn() -> Arc<dyn Controller> + Send + Sync + 'static,
    {
        self.factory
            .register_controller(id, move |_options| Ok(build()));
        let view = format!("{id}View");
        let name = view.clone();
        self.factory.register_view(view, move || {
            Ok(Arc::new(NamedView(name.clone())) as Arc<dyn View>)
        });
        self
    }

    pub async fn build(self) -> Harness {
        let state = Arc::new(InMemoryPageStateManager::default());
        let renderer = Arc::new(RecordingRenderer {
            log: self.log.clone(),
            update_delay: self.update_delay,
            pushed: Mutex::new(Vec::new()),
        });
        let factory = Arc::new(CountingFactory {
            inner: self.factory,
            constructions: AtomicUsize::new(0),
        });
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let handlers = Arc::new(PageHandlerRegistry::new(vec![Arc::new(RecordingHandler {
            log: self.log.clone(),
        }) as Arc<dyn PageHandler>]));
        let manager = Arc::new(
            PageManager::new(
                factory.clone(),
                renderer.clone(),
                state.clone() as Arc<dyn PageStateManager>,
            )
            .with_handlers(handlers)
            .with_dispatcher(dispatcher.clone()),
        );
        manager.init().await.expect("manager init");
        Harness {
            log: self.log,
            manager,
            factory,
            renderer,
            state,
            dispatcher,
        }
    }
}

/// Request for the controller registered as `id`, using its `<id>View`.
pub fn request(id: &str) -> ManageRequest {
    let route: Arc<dyn PageRoute> = Arc::new(StaticRoute::new(
        id.to_lowercase(),
        id,
        format!("{id}View").as_str(),
    ));
    ManageRequest::new(route)
}

pub fn reuse_request(id: &str, page: &str) -> ManageRequest {
    request(id)
        .with_param("page", page)
        .with_options(RouteOptions {
            only_update: OnlyUpdate::Always,
            ..RouteOptions::default()
        })
}

/// Yield until `check` holds, bounded so a broken expectation fails instead of hanging.
pub async fn wait_until<F>(check: F)
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(check(), "condition not reached in time");
}

pub fn patch(value: Value) -> PageState {
    object(value)
}

pub fn empty_json() -> Value {
    json!({})
}
