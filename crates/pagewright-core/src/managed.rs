//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Occupancy slots tracked by the page manager.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::deferred::Deferred;
use crate::error::{LifecycleStage, PageError, Result};
use crate::lifecycle::{
    Controller, ControllerContext, ControllerState, Extension, ExtensionContext, ExtensionState,
    LifecycleContext, View,
};
use crate::route::{Action, ControllerRef, PageRoute, RouteOptions, RouteParams, ViewRef};

/// Lifecycle phase reached by a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PagePhase {
    #[default]
    Empty,
    Constructed,
    Initialized,
    Loaded,
    Mounted,
    Activated,
    Destroyed,
}

impl PagePhase {
    /// Move to `to`, rejecting anything but the forward chain or teardown of a live slot.
    pub fn advance(self, to: PagePhase) -> Result<PagePhase> {
        use PagePhase::*;
        let legal = match (self, to) {
            (Empty, Constructed)
            | (Constructed, Initialized)
            | (Initialized, Loaded)
            | (Loaded, Mounted)
            | (Mounted, Activated) => true,
            (from, Destroyed) => !matches!(from, Empty | Destroyed),
            _ => false,
        };
        if legal {
            Ok(to)
        } else {
            Err(PageError::InvalidPhase { from: self, to })
        }
    }

    pub fn is_initialized(self) -> bool {
        matches!(
            self,
            PagePhase::Initialized | PagePhase::Loaded | PagePhase::Mounted | PagePhase::Activated
        )
    }

    pub fn is_mounted(self) -> bool {
        matches!(self, PagePhase::Mounted | PagePhase::Activated)
    }

    pub fn is_activated(self) -> bool {
        self == PagePhase::Activated
    }
}

/// Bookkeeping carried by a slot next to its phase.
#[derive(Debug, Clone)]
pub struct SlotState {
    pub phase: PagePhase,
    /// Set by `pre_manage`. Never cleared for the same occupancy.
    pub cancelled: bool,
    /// Pre-handlers ran, so post-handlers are owed.
    pub executed: bool,
    pub abort: Deferred,
    pub page: Deferred,
}

impl Default for SlotState {
    fn default() -> Self {
        Self {
            phase: PagePhase::Empty,
            cancelled: false,
            executed: false,
            abort: Deferred::resolved(),
            page: Deferred::resolved(),
        }
    }
}

impl SlotState {
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub(crate) fn advance(&mut self, to: PagePhase) -> Result<()> {
        self.phase = self.phase.advance(to)?;
        Ok(())
    }
}

/// An extension attached to a managed controller with its state handle.
#[derive(Clone)]
pub struct MountedExtension {
    pub extension: Arc<dyn Extension>,
    pub state: ExtensionState,
}

impl fmt::Debug for MountedExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedExtension")
            .field("name", &self.extension.name())
            .field("state", &self.state)
            .finish()
    }
}

/// Part of a page whose callbacks are tracked individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Member {
    Controller,
    Extension(usize),
}

/// Which members completed `init` and `activate`, shared by every snapshot of one page.
pub(crate) struct CallbackLedger {
    initialized: Mutex<BTreeSet<Member>>,
    activated: Mutex<BTreeSet<Member>>,
    in_flight: watch::Sender<usize>,
    activating: AtomicBool,
}

impl Default for CallbackLedger {
    fn default() -> Self {
        Self {
            initialized: Mutex::new(BTreeSet::new()),
            activated: Mutex::new(BTreeSet::new()),
            in_flight: watch::channel(0).0,
            activating: AtomicBool::new(false),
        }
    }
}

impl CallbackLedger {
    /// Note that `member` completed `stage`. Only init and activate are remembered.
    pub(crate) fn record(&self, member: Member, stage: LifecycleStage) {
        match stage {
            LifecycleStage::Init => {
                self.initialized.lock().insert(member);
            }
            LifecycleStage::Activate => {
                self.activated.lock().insert(member);
            }
            _ => {}
        }
    }

    pub(crate) fn is_initialized(&self, member: Member) -> bool {
        self.initialized.lock().contains(&member)
    }

    pub(crate) fn is_activated(&self, member: Member) -> bool {
        self.activated.lock().contains(&member)
    }

    /// Count a callback as running until the returned guard is finished or dropped.
    pub(crate) fn track(self: &Arc<Self>, member: Member, stage: LifecycleStage) -> InFlight {
        self.in_flight.send_modify(|count| *count += 1);
        InFlight {
            ledger: self.clone(),
            member,
            stage,
            succeeded: false,
        }
    }

    /// Wait until no tracked callback is running.
    pub(crate) async fn settle(&self) {
        let mut idle = self.in_flight.subscribe();
        let _ = idle.wait_for(|count| *count == 0).await;
    }

    /// Claim the right to run activation. `false` while another call holds it.
    pub(crate) fn begin_activation(&self) -> bool {
        self.activating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_activation(&self) {
        self.activating.store(false, Ordering::Release);
    }
}

/// A running lifecycle callback. Dropping it without [`InFlight::finish`] counts as failure.
pub(crate) struct InFlight {
    ledger: Arc<CallbackLedger>,
    member: Member,
    stage: LifecycleStage,
    succeeded: bool,
}

impl InFlight {
    pub(crate) fn finish(mut self, succeeded: bool) {
        self.succeeded = succeeded;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.succeeded {
            self.ledger.record(self.member, self.stage);
        }
        self.ledger.in_flight.send_modify(|count| *count -= 1);
    }
}

/// Objects constructed for one occupancy, plus what their callbacks receive.
#[derive(Clone)]
pub struct PageInstances {
    pub controller: Arc<dyn Controller>,
    pub decorated: Arc<dyn Controller>,
    pub view: Arc<dyn View>,
    pub extensions: Vec<MountedExtension>,
    pub controller_state: ControllerState,
    pub(crate) route: Arc<str>,
    pub(crate) params: RouteParams,
    pub(crate) action: Action,
    pub(crate) ledger: Arc<CallbackLedger>,
}

impl fmt::Debug for PageInstances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageInstances")
            .field("controller", &self.controller.name())
            .field("view", &self.view.name())
            .field("extensions", &self.extensions)
            .field("route", &self.route)
            .finish()
    }
}

impl PageInstances {
    fn context<S>(&self, state: S) -> LifecycleContext<S> {
        LifecycleContext {
            route: self.route.clone(),
            params: self.params.clone(),
            action: self.action.clone(),
            state,
        }
    }

    pub fn controller_context(&self) -> ControllerContext {
        self.context(self.controller_state.clone())
    }

    pub fn extension_context(&self, mounted: &MountedExtension) -> ExtensionContext {
        self.context(mounted.state.clone())
    }

    /// Same instances, seen with a new set of params.
    pub(crate) fn with_params(&self, params: RouteParams, action: Action) -> Self {
        Self {
            params,
            action,
            ..self.clone()
        }
    }

    /// Cut every state handle off from the shared manager.
    pub(crate) fn detach(&self) {
        self.controller_state.detach();
        for mounted in &self.extensions {
            mounted.state.detach();
        }
    }
}

/// One occupancy slot: the current page or the one being replaced.
#[derive(Clone, Default)]
pub struct ManagedPage {
    pub(crate) transition: u64,
    pub(crate) controller_ref: Option<ControllerRef>,
    pub(crate) view_ref: Option<ViewRef>,
    pub(crate) instances: Option<PageInstances>,
    pub(crate) route: Option<Arc<dyn PageRoute>>,
    pub(crate) options: RouteOptions,
    pub(crate) params: RouteParams,
    pub(crate) action: Action,
    pub(crate) state: SlotState,
}

impl fmt::Debug for ManagedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedPage")
            .field("transition", &self.transition)
            .field("controller_ref", &self.controller_ref)
            .field("view_ref", &self.view_ref)
            .field("route", &self.route_name())
            .field("params", &self.params)
            .field("phase", &self.state.phase)
            .field("cancelled", &self.state.cancelled)
            .field("executed", &self.state.executed)
            .finish()
    }
}

impl ManagedPage {
    pub fn empty() -> Self {
        Self::default()
    }

    /// True for a slot that never held a page or was reset.
    pub fn is_empty(&self) -> bool {
        self.instances.is_none() && self.state.phase == PagePhase::Empty && !self.state.executed
    }

    pub fn transition(&self) -> u64 {
        self.transition
    }

    pub fn controller_ref(&self) -> Option<&ControllerRef> {
        self.controller_ref.as_ref()
    }

    pub fn view_ref(&self) -> Option<&ViewRef> {
        self.view_ref.as_ref()
    }

    pub fn controller(&self) -> Option<&Arc<dyn Controller>> {
        self.instances.as_ref().map(|instances| &instances.controller)
    }

    pub fn decorated_controller(&self) -> Option<&Arc<dyn Controller>> {
        self.instances.as_ref().map(|instances| &instances.decorated)
    }

    pub fn view(&self) -> Option<&Arc<dyn View>> {
        self.instances.as_ref().map(|instances| &instances.view)
    }

    pub fn extension_names(&self) -> Vec<String> {
        self.instances
            .as_ref()
            .map(|instances| {
                instances
                    .extensions
                    .iter()
                    .map(|mounted| mounted.extension.name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn route(&self) -> Option<&Arc<dyn PageRoute>> {
        self.route.as_ref()
    }

    pub fn route_name(&self) -> Option<&str> {
        self.route.as_ref().map(|route| route.name())
    }

    pub fn options(&self) -> &RouteOptions {
        &self.options
    }

    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn phase(&self) -> PagePhase {
        self.state.phase
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled
    }

    pub fn is_executed(&self) -> bool {
        self.state.executed
    }

    pub(crate) fn instances(&self) -> Option<&PageInstances> {
        self.instances.as_ref()
    }

    /// Whether the mounted page may be reused for `controller`/`view` under `options`.
    pub(crate) fn reusable_for(
        &self,
        controller: &ControllerRef,
        view: &ViewRef,
        options: &RouteOptions,
    ) -> bool {
        let (Some(mounted_controller), Some(mounted_view)) = (&self.controller_ref, &self.view_ref)
        else {
            return false;
        };
        self.instances.is_some()
            && self.state.phase.is_mounted()
            && mounted_controller == controller
            && mounted_view == view
            && options.only_update.allows(mounted_controller, mounted_view)
    }
}
