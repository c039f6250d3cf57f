//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! The page lifecycle orchestrator.
//!
//! [`PageManager`] owns two occupancy slots, *current* and *previous*. Every
//! [`PageManager::manage`] call first folds current into previous
//! synchronously, then resolves the route, decides between reusing the mounted
//! page and replacing it, runs the pre-handlers, tears the old page down,
//! initializes and loads the new one, renders it and runs the post-handlers.
//!
//! Every suspension point before rendering is raced against the previous
//! slot's abort signal, which only [`PageManager::pre_manage`] rejects. A
//! transition that loses the race reports [`ManageOutcome::Conflict`].
//! Lifecycle callbacks run as their own tasks, so losing a race never
//! interrupts a callback body; teardown waits for such abandoned callbacks
//! before destroying what they initialized.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use pagewright_logging::{
    log_lifecycle_event, pw_debug, pw_error, pw_warn, LifecycleOutcome, LogContext,
};
use parking_lot::Mutex;
use serde_json::json;
use tracing::debug;

use crate::collaborators::{
    Dispatcher, NoopDispatcher, PageFactory, PageRenderer, RenderResponse,
    AFTER_LOADING_ASYNC_ROUTE, BEFORE_LOADING_ASYNC_ROUTE, CONFLICT_STATUS,
};
use crate::deferred::Deferred;
use crate::error::{LifecycleStage, PageError, Result};
use crate::events::{self, EventOutcome, EventSink, PageEvent};
use crate::handlers::PageHandlerRegistry;
use crate::lifecycle::{ControllerState, ExtensionState};
use crate::loaded::LoadedState;
use crate::managed::{
    CallbackLedger, ManagedPage, Member, MountedExtension, PageInstances, PagePhase, SlotState,
};
use crate::route::{Action, ControllerRef, PageRoute, RouteOptions, RouteParams, ViewRef};
use crate::state::{PageState, PageStateManager};

/// Destination of a transition, resolved by the caller's route matcher.
#[derive(Debug, Clone)]
pub struct ManageRequest {
    pub route: Arc<dyn PageRoute>,
    pub options: RouteOptions,
    pub params: RouteParams,
    pub action: Action,
}

impl ManageRequest {
    pub fn new(route: Arc<dyn PageRoute>) -> Self {
        Self {
            route,
            options: RouteOptions::default(),
            params: RouteParams::new(),
            action: Action::default(),
        }
    }

    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_params(mut self, params: RouteParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }
}

/// Result of a transition.
#[derive(Debug, Clone)]
pub enum ManageOutcome {
    Rendered(RenderResponse),
    /// Superseded by a newer transition.
    Conflict,
}

impl ManageOutcome {
    pub fn status(&self) -> u16 {
        match self {
            ManageOutcome::Rendered(response) => response.status,
            ManageOutcome::Conflict => CONFLICT_STATUS,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ManageOutcome::Conflict)
    }

    pub fn response(&self) -> Option<&RenderResponse> {
        match self {
            ManageOutcome::Rendered(response) => Some(response),
            ManageOutcome::Conflict => None,
        }
    }
}

#[derive(Default)]
struct Slots {
    current: ManagedPage,
    previous: ManagedPage,
}

/// Bookkeeping owned by one `manage` call.
struct Transition {
    id: u64,
    /// Abort signal of the previous slot, consulted by every raced stage.
    abort: Deferred,
    /// Settlement signal of the occupancy this transition fills.
    page_signal: Deferred,
    /// Snapshot of the slot being replaced or updated.
    previous: ManagedPage,
    /// The occupancy being built, once instances exist.
    page: Option<ManagedPage>,
}

#[derive(Clone)]
enum LoadKind {
    Load,
    Update(RouteParams),
}

impl LoadKind {
    fn stage(&self) -> LifecycleStage {
        match self {
            LoadKind::Load => LifecycleStage::Load,
            LoadKind::Update(_) => LifecycleStage::Update,
        }
    }
}

/// Race `stage` against `abort`; a rejected abort wins ties.
async fn race<T, F>(abort: &Deferred, stage: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let rejected = abort.rejected();
    tokio::select! {
        biased;
        _ = rejected => Err(PageError::Cancelled),
        outcome = stage => outcome,
    }
}

/// Run a lifecycle callback on its own task, raced against `abort`.
///
/// A lost race leaves the task running. `ledger` keeps counting it until it
/// finishes, so teardown can wait for it and see whether it succeeded.
async fn raced_callback<T, F>(
    abort: &Deferred,
    ledger: &Arc<CallbackLedger>,
    member: Member,
    stage: LifecycleStage,
    target: String,
    callback: F,
) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let in_flight = ledger.track(member, stage);
    let task = tokio::spawn(async move {
        let outcome = callback.await;
        in_flight.finish(outcome.is_ok());
        outcome
    });
    let rejected = abort.rejected();
    let joined = tokio::select! {
        biased;
        _ = rejected => return Err(PageError::Cancelled),
        joined = task => joined,
    };
    match joined {
        Ok(outcome) => outcome.map_err(|source| PageError::lifecycle(stage, target, source)),
        Err(join) => Err(PageError::lifecycle(stage, target, anyhow::Error::new(join))),
    }
}

fn log_context<'a>(route: &'a str, page: Option<&'a ManagedPage>, id: u64) -> LogContext<'a> {
    let mut ctx = LogContext::new().with_route(route).with_transition(id);
    if let Some(controller) = page.and_then(|page| page.controller_ref()) {
        ctx = ctx.with_controller(controller.as_str());
    }
    if let Some(view) = page.and_then(|page| page.view_ref()) {
        ctx = ctx.with_view(view.as_str());
    }
    ctx
}

/// Drives page transitions over the shared state manager.
pub struct PageManager {
    factory: Arc<dyn PageFactory>,
    renderer: Arc<dyn PageRenderer>,
    state_manager: Arc<dyn PageStateManager>,
    handlers: Arc<PageHandlerRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    slots: Mutex<Slots>,
    next_transition: AtomicU64,
}

impl PageManager {
    pub fn new(
        factory: Arc<dyn PageFactory>,
        renderer: Arc<dyn PageRenderer>,
        state_manager: Arc<dyn PageStateManager>,
    ) -> Self {
        Self {
            factory,
            renderer,
            state_manager,
            handlers: Arc::new(PageHandlerRegistry::default()),
            dispatcher: Arc::new(NoopDispatcher),
            slots: Mutex::new(Slots::default()),
            next_transition: AtomicU64::new(0),
        }
    }

    pub fn with_handlers(mut self, handlers: Arc<PageHandlerRegistry>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn state_manager(&self) -> &Arc<dyn PageStateManager> {
        &self.state_manager
    }

    pub fn renderer(&self) -> &Arc<dyn PageRenderer> {
        &self.renderer
    }

    pub fn handlers(&self) -> &Arc<PageHandlerRegistry> {
        &self.handlers
    }

    /// Snapshot of the current slot.
    pub fn current(&self) -> ManagedPage {
        self.slots.lock().current.clone()
    }

    /// Snapshot of the previous slot.
    pub fn previous(&self) -> ManagedPage {
        self.slots.lock().previous.clone()
    }

    /// Become the state manager's observer and initialize the handlers.
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        self.state_manager
            .set_on_change(Some(Arc::new(move |state: &PageState| {
                if let Some(manager) = weak.upgrade() {
                    manager.on_state_change(state);
                }
            })));
        self.handlers.init().await
    }

    fn on_state_change(&self, state: &PageState) {
        let managed = self.slots.lock().current.instances().is_some();
        if managed {
            self.renderer.set_state(state);
        }
    }

    /// Live through a transition to the destination in `request`.
    ///
    /// The slot snapshot happens when this is called, before the returned
    /// future is first polled.
    pub fn manage(
        &self,
        request: ManageRequest,
    ) -> impl Future<Output = Result<ManageOutcome>> + Send + '_ {
        let transition = self.begin_transition();
        async move { self.run_transition(transition, request).await }
    }

    fn begin_transition(&self) -> Transition {
        let id = self.next_transition.fetch_add(1, Ordering::SeqCst) + 1;
        let page_signal = Deferred::new();
        let mut slots = self.slots.lock();

        let mut previous = slots.current.clone();
        previous.state.abort = Deferred::new();
        let abort = previous.state.abort.clone();
        slots.previous = previous.clone();

        // A new occupancy of the current slot starts here.
        let current = &mut slots.current;
        current.transition = id;
        current.state.page = page_signal.clone();
        current.state.cancelled = false;
        current.state.executed = false;

        Transition {
            id,
            abort,
            page_signal,
            previous,
            page: None,
        }
    }

    async fn run_transition(
        &self,
        mut tx: Transition,
        request: ManageRequest,
    ) -> Result<ManageOutcome> {
        let route_name = request.route.name().to_string();
        let result = self.transition(&mut tx, request).await;

        let ctx = log_context(&route_name, tx.page.as_ref(), tx.id);
        match result {
            Ok(response) => {
                self.finish(&tx).await?;
                log_lifecycle_event(
                    Some(&ctx),
                    "page.manage",
                    "page rendered",
                    LifecycleOutcome::Success,
                );
                Ok(ManageOutcome::Rendered(response))
            }
            Err(PageError::Cancelled) => {
                self.finish(&tx).await?;
                log_lifecycle_event(
                    Some(&ctx),
                    "page.manage",
                    "transition superseded",
                    LifecycleOutcome::Conflict,
                );
                Ok(ManageOutcome::Conflict)
            }
            Err(err) => {
                log_lifecycle_event(
                    Some(&ctx),
                    "page.manage",
                    &format!("transition failed: {err:#}"),
                    LifecycleOutcome::Fault,
                );
                Err(err)
            }
        }
    }

    async fn transition(&self, tx: &mut Transition, request: ManageRequest) -> Result<RenderResponse> {
        let ManageRequest {
            route,
            options,
            params,
            action,
        } = request;

        let (controller_ref, view_ref) = race(&tx.abort, self.resolve_identities(&route)).await?;
        self.ensure_current(tx.id, &tx.abort)?;

        if tx.previous.reusable_for(&controller_ref, &view_ref, &options) {
            pw_debug!(
                context = log_context(route.name(), Some(&tx.previous), tx.id),
                "reusing mounted page"
            );
            self.update_page(tx, route, options, params, action).await
        } else {
            self.replace_page(tx, route, controller_ref, view_ref, options, params, action)
                .await
        }
    }

    async fn resolve_identities(
        &self,
        route: &Arc<dyn PageRoute>,
    ) -> Result<(ControllerRef, ViewRef)> {
        let lazy = !route.is_controller_resolved() || !route.is_view_resolved();
        if lazy {
            self.dispatcher
                .fire(BEFORE_LOADING_ASYNC_ROUTE, &json!({ "route": route.name() }));
        }
        let resolved = async {
            let controller = route.controller().await?;
            let view = route.view().await?;
            Ok::<_, anyhow::Error>((controller, view))
        }
        .await;
        if lazy {
            self.dispatcher.fire(
                AFTER_LOADING_ASYNC_ROUTE,
                &json!({ "route": route.name(), "resolved": resolved.is_ok() }),
            );
        }
        resolved.map_err(|source| PageError::RouteResolution {
            route: route.name().to_string(),
            source,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn replace_page(
        &self,
        tx: &mut Transition,
        route: Arc<dyn PageRoute>,
        controller_ref: ControllerRef,
        view_ref: ViewRef,
        options: RouteOptions,
        params: RouteParams,
        action: Action,
    ) -> Result<RenderResponse> {
        let instances = self
            .construct(&route, &controller_ref, &view_ref, &options, &params, &action)
            .map_err(|source| PageError::Construction {
                route: route.name().to_string(),
                source,
            })?;

        let mut state = SlotState {
            page: tx.page_signal.clone(),
            executed: true,
            ..SlotState::default()
        };
        state.advance(PagePhase::Constructed)?;
        let page = tx.page.insert(ManagedPage {
            transition: tx.id,
            controller_ref: Some(controller_ref),
            view_ref: Some(view_ref),
            instances: Some(instances.clone()),
            route: Some(route),
            options,
            params,
            action,
            state,
        });

        race(
            &tx.abort,
            self.handlers
                .handle_pre_managed_state(&tx.previous, page, &page.action),
        )
        .await?;
        self.ensure_current(tx.id, &tx.abort)?;

        self.commit(tx.id, page)?;
        self.tear_down(&tx.previous).await?;
        self.mark_destroyed(tx.id, &mut tx.previous);
        self.ensure_current(tx.id, &tx.abort)?;
        self.state_manager.clear();

        self.init_page(&tx.abort, &instances).await?;
        self.advance(tx.id, page, PagePhase::Initialized)?;

        let loaded = self.load_page(&tx.abort, &instances, LoadKind::Load).await?;
        self.advance(tx.id, page, PagePhase::Loaded)?;

        self.ensure_current(tx.id, &tx.abort)?;
        let response = self
            .renderer
            .mount(
                instances.decorated.clone(),
                instances.view.clone(),
                loaded,
                &page.options,
            )
            .await
            .map_err(PageError::Render)?;
        self.advance(tx.id, page, PagePhase::Mounted)?;
        Ok(response)
    }

    async fn update_page(
        &self,
        tx: &mut Transition,
        route: Arc<dyn PageRoute>,
        options: RouteOptions,
        params: RouteParams,
        action: Action,
    ) -> Result<RenderResponse> {
        let mut page = tx.previous.clone();
        let previous_params = std::mem::replace(&mut page.params, params.clone());
        let instances = page
            .instances()
            .map(|instances| instances.with_params(params, action.clone()))
            .ok_or_else(|| PageError::Construction {
                route: route.name().to_string(),
                source: anyhow!("reused slot has no instances"),
            })?;
        page.transition = tx.id;
        page.instances = Some(instances.clone());
        page.route = Some(route);
        page.options = options;
        page.action = action;
        page.state.page = tx.page_signal.clone();
        page.state.abort = Deferred::resolved();
        page.state.cancelled = false;
        page.state.executed = true;
        let page = tx.page.insert(page);

        race(
            &tx.abort,
            self.handlers
                .handle_pre_managed_state(&tx.previous, page, &page.action),
        )
        .await?;
        self.ensure_current(tx.id, &tx.abort)?;
        self.commit(tx.id, page)?;

        let loaded = self
            .load_page(&tx.abort, &instances, LoadKind::Update(previous_params))
            .await?;

        self.ensure_current(tx.id, &tx.abort)?;
        let response = self
            .renderer
            .update(
                instances.decorated.clone(),
                instances.view.clone(),
                loaded,
                &page.options,
            )
            .await
            .map_err(PageError::Render)?;
        Ok(response)
    }

    fn construct(
        &self,
        route: &Arc<dyn PageRoute>,
        controller_ref: &ControllerRef,
        view_ref: &ViewRef,
        options: &RouteOptions,
        params: &RouteParams,
        action: &Action,
    ) -> anyhow::Result<PageInstances> {
        let controller = self.factory.create_controller(controller_ref, options)?;
        let extensions = controller
            .extensions()
            .into_iter()
            .map(|extension| {
                let state = ExtensionState::new();
                state.set_page_state_manager(self.factory.decorate_page_state_manager(
                    self.state_manager.clone(),
                    extension.allowed_state_keys(),
                ));
                MountedExtension { extension, state }
            })
            .collect();
        let decorated = self.factory.decorate_controller(controller.clone());
        let view = self.factory.create_view(view_ref)?;
        Ok(PageInstances {
            controller,
            decorated,
            view,
            extensions,
            controller_state: ControllerState::attached(self.state_manager.clone()),
            route: Arc::from(route.name()),
            params: params.clone(),
            action: action.clone(),
            ledger: Arc::default(),
        })
    }

    async fn init_page(&self, abort: &Deferred, instances: &PageInstances) -> Result<()> {
        let ledger = &instances.ledger;
        let cx = instances.controller_context();
        let controller = instances.controller.clone();
        raced_callback(
            abort,
            ledger,
            Member::Controller,
            LifecycleStage::Init,
            controller.name().to_string(),
            async move { controller.init(&cx).await },
        )
        .await?;

        for (index, mounted) in instances.extensions.iter().enumerate() {
            let cx = instances.extension_context(mounted);
            let extension = mounted.extension.clone();
            raced_callback(
                abort,
                ledger,
                Member::Extension(index),
                LifecycleStage::Init,
                extension.name().to_string(),
                async move { extension.init(&cx).await },
            )
            .await?;
        }
        Ok(())
    }

    /// Load or update the controller, then each extension, layering extension state on top.
    async fn load_page(
        &self,
        abort: &Deferred,
        instances: &PageInstances,
        kind: LoadKind,
    ) -> Result<LoadedState> {
        let ledger = &instances.ledger;
        let cx = instances.controller_context();
        let controller = instances.controller.clone();
        let controller_kind = kind.clone();
        let mut merged = raced_callback(
            abort,
            ledger,
            Member::Controller,
            kind.stage(),
            controller.name().to_string(),
            async move {
                match controller_kind {
                    LoadKind::Load => controller.load(&cx).await,
                    LoadKind::Update(previous) => controller.update(&cx, &previous).await,
                }
            },
        )
        .await?;

        for (index, mounted) in instances.extensions.iter().enumerate() {
            mounted.state.switch_to_partial_state();
            mounted.state.clear_partial_state();
            mounted.state.set_partial_state(merged.ready_state());

            let cx = instances.extension_context(mounted);
            let extension = mounted.extension.clone();
            let extension_kind = kind.clone();
            let produced = raced_callback(
                abort,
                ledger,
                Member::Extension(index),
                kind.stage(),
                extension.name().to_string(),
                async move {
                    match extension_kind {
                        LoadKind::Load => extension.load(&cx).await,
                        LoadKind::Update(previous) => extension.update(&cx, &previous).await,
                    }
                },
            )
            .await?;

            let mut allowed: Vec<String> = produced.keys().map(str::to_string).collect();
            allowed.extend(mounted.extension.allowed_state_keys());
            mounted.state.set_page_state_manager(
                self.factory
                    .decorate_page_state_manager(self.state_manager.clone(), allowed),
            );
            switch_to_shared_state_when_settled(mounted, &produced);
            merged.merge(produced);
        }
        Ok(merged)
    }

    /// Deactivate then destroy `page`, extensions before the controller.
    ///
    /// Callbacks abandoned by a lost race are awaited first; each member is
    /// deactivated only if it activated and destroyed only if it initialized.
    async fn tear_down(&self, page: &ManagedPage) -> Result<()> {
        let Some(instances) = page.instances() else {
            return Ok(());
        };
        let ledger = &instances.ledger;
        ledger.settle().await;
        let controller_cx = instances.controller_context();

        for (index, mounted) in instances.extensions.iter().enumerate() {
            if ledger.is_activated(Member::Extension(index)) {
                let cx = instances.extension_context(mounted);
                mounted.extension.deactivate(&cx).await.map_err(|source| {
                    PageError::lifecycle(
                        LifecycleStage::Deactivate,
                        mounted.extension.name(),
                        source,
                    )
                })?;
            }
        }
        if ledger.is_activated(Member::Controller) {
            instances
                .controller
                .deactivate(&controller_cx)
                .await
                .map_err(|source| {
                    PageError::lifecycle(
                        LifecycleStage::Deactivate,
                        instances.controller.name(),
                        source,
                    )
                })?;
        }

        for (index, mounted) in instances.extensions.iter().enumerate() {
            if ledger.is_initialized(Member::Extension(index)) {
                let cx = instances.extension_context(mounted);
                mounted.extension.destroy(&cx).await.map_err(|source| {
                    PageError::lifecycle(LifecycleStage::Destroy, mounted.extension.name(), source)
                })?;
            }
        }
        if ledger.is_initialized(Member::Controller) {
            instances
                .controller
                .destroy(&controller_cx)
                .await
                .map_err(|source| {
                    PageError::lifecycle(
                        LifecycleStage::Destroy,
                        instances.controller.name(),
                        source,
                    )
                })?;
        }

        instances.detach();
        Ok(())
    }

    /// Record that the replaced slot was torn down.
    fn mark_destroyed(&self, id: u64, previous: &mut ManagedPage) {
        if previous.instances().is_none() {
            return;
        }
        if let Ok(phase) = previous.state.phase.advance(PagePhase::Destroyed) {
            previous.state.phase = phase;
            let mut slots = self.slots.lock();
            if slots.current.transition == id && slots.previous.transition == previous.transition {
                slots.previous.state.phase = phase;
            }
        }
    }

    /// Run the post-handlers owed by this transition and release the previous slot.
    async fn finish(&self, tx: &Transition) -> Result<()> {
        if let Some(page) = tx.page.as_ref().filter(|page| page.state.executed) {
            self.handlers
                .handle_post_managed_state(page, &tx.previous, &page.action)
                .await?;
        }
        let mut slots = self.slots.lock();
        if slots.current.transition == tx.id {
            slots.previous = ManagedPage::empty();
        }
        Ok(())
    }

    fn ensure_current(&self, id: u64, abort: &Deferred) -> Result<()> {
        if abort.is_cancelled() {
            return Err(PageError::Cancelled);
        }
        let slots = self.slots.lock();
        if slots.current.transition != id || slots.current.state.cancelled {
            return Err(PageError::Cancelled);
        }
        Ok(())
    }

    /// Install `page` as the current slot, keeping a cancellation that arrived meanwhile.
    fn commit(&self, id: u64, page: &mut ManagedPage) -> Result<()> {
        let mut slots = self.slots.lock();
        if slots.current.transition != id {
            return Err(PageError::Cancelled);
        }
        page.state.cancelled |= slots.current.state.cancelled;
        slots.current = page.clone();
        Ok(())
    }

    fn advance(&self, id: u64, page: &mut ManagedPage, to: PagePhase) -> Result<()> {
        let mut slots = self.slots.lock();
        if slots.current.transition != id {
            return Err(PageError::Cancelled);
        }
        page.state.advance(to)?;
        slots.current.state.phase = page.state.phase;
        Ok(())
    }

    /// Mark the in-flight transition superseded and wait for it to settle.
    ///
    /// The cancellation happens when this is called; the returned future only waits.
    pub fn pre_manage(&self) -> impl Future<Output = ()> + Send + 'static {
        let page = {
            let mut slots = self.slots.lock();
            slots.current.state.cancel();
            slots.previous.state.abort.reject();
            slots.current.state.page.clone()
        };
        let settled = page.settled();
        async move {
            settled.await;
        }
    }

    /// Settle the current occupancy on the next scheduling turn.
    pub fn post_manage(&self) {
        let page = self.slots.lock().current.state.page.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            page.resolve();
        });
    }

    /// Activate the mounted page: controller first, then each extension.
    ///
    /// The slot reads `Activated` only once every callback succeeded. Repeat
    /// calls are no-ops; a retry after a failure skips members already active.
    pub async fn activate(&self) -> Result<()> {
        let instances = {
            let slots = self.slots.lock();
            let current = &slots.current;
            if current.state.cancelled || current.state.phase != PagePhase::Mounted {
                return Ok(());
            }
            let Some(instances) = current.instances.clone() else {
                return Ok(());
            };
            if !instances.ledger.begin_activation() {
                return Ok(());
            }
            instances
        };

        let outcome = activate_members(&instances).await;
        instances.ledger.end_activation();
        outcome?;

        let mut slots = self.slots.lock();
        let current = &mut slots.current;
        let same_page = current
            .instances()
            .is_some_and(|mounted| Arc::ptr_eq(&mounted.ledger, &instances.ledger));
        if same_page && current.state.phase == PagePhase::Mounted {
            current.state.advance(PagePhase::Activated)?;
        }
        debug!(controller = instances.controller.name(), "page activated");
        Ok(())
    }

    /// Offer a page event to the managed controller and its extensions.
    pub async fn dispatch_event(
        &self,
        event: &PageEvent,
        sink: &dyn EventSink,
    ) -> Result<EventOutcome> {
        let instances = self.slots.lock().current.instances().cloned();
        match instances {
            Some(instances) => events::dispatch(&instances, event, sink).await,
            None => {
                sink.unhandled(event, &event.handler_name());
                Ok(EventOutcome::Unhandled)
            }
        }
    }

    /// Tear down the managed page, clear the state and reset both slots. Not raced.
    pub async fn destroy(&self) -> Result<()> {
        let current = {
            let mut slots = self.slots.lock();
            let current = std::mem::take(&mut slots.current);
            slots.previous.state.page.resolve();
            slots.previous = ManagedPage::empty();
            // In-flight transitions no longer own the current slot.
            slots.current.transition = self.next_transition.fetch_add(1, Ordering::SeqCst) + 1;
            current
        };
        current.state.page.resolve();

        let outcome = self.tear_down(&current).await;
        self.state_manager.clear();
        self.handlers.destroy().await;
        self.state_manager.set_on_change(None);
        if let Err(err) = &outcome {
            pw_error!(
                context = log_context(current.route_name().unwrap_or(""), Some(&current), current.transition),
                "page teardown failed during destroy: {err:#}"
            );
        }
        outcome
    }
}

async fn activate_members(instances: &PageInstances) -> Result<()> {
    let ledger = &instances.ledger;
    if !ledger.is_activated(Member::Controller) {
        let cx = instances.controller_context();
        instances.controller.activate(&cx).await.map_err(|source| {
            PageError::lifecycle(LifecycleStage::Activate, instances.controller.name(), source)
        })?;
        ledger.record(Member::Controller, LifecycleStage::Activate);
    }
    for (index, mounted) in instances.extensions.iter().enumerate() {
        let member = Member::Extension(index);
        if ledger.is_activated(member) {
            continue;
        }
        let cx = instances.extension_context(mounted);
        mounted.extension.activate(&cx).await.map_err(|source| {
            PageError::lifecycle(LifecycleStage::Activate, mounted.extension.name(), source)
        })?;
        ledger.record(member, LifecycleStage::Activate);
    }
    Ok(())
}

/// Hand the extension over to the shared manager once everything it produced has settled.
fn switch_to_shared_state_when_settled(mounted: &MountedExtension, produced: &LoadedState) {
    let pending = produced.pending_values();
    let state = mounted.state.clone();
    if pending.is_empty() {
        state.switch_to_state_manager();
        state.clear_partial_state();
        return;
    }

    let extension = mounted.extension.name().to_string();
    tokio::spawn(async move {
        for (key, value) in pending {
            if let Err(err) = value.await {
                pw_warn!(
                    "extension '{}' failed to produce state key '{}': {}",
                    extension,
                    key,
                    err
                );
            }
        }
        state.switch_to_state_manager();
        state.clear_partial_state();
    });
}
