//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Page lifecycle orchestration: transitions between pages, cooperative
//! cancellation of superseded transitions, extension state policy and
//! cross-cutting handler batches.

pub mod client;
pub mod collaborators;
pub mod deferred;
pub mod error;
pub mod events;
pub mod handlers;
pub mod lifecycle;
pub mod loaded;
pub mod managed;
pub mod manager;
pub mod restricted;
pub mod route;
pub mod server;
pub mod state;

pub use client::ClientPageManager;
pub use collaborators::{
    Dispatcher, NoopDispatcher, PageFactory, PageRenderer, RegistryPageFactory, RenderResponse,
    AFTER_LOADING_ASYNC_ROUTE, BEFORE_LOADING_ASYNC_ROUTE, CONFLICT_STATUS,
};
pub use deferred::{Deferred, Settlement};
pub use error::{HandlerPhase, LifecycleStage, PageError, Result, StateError, StateValueError};
pub use events::{handler_method_name, EventOutcome, EventSink, PageEvent, TracingEventSink};
pub use handlers::{PageHandler, PageHandlerRegistry, SerialBatch};
pub use lifecycle::{
    Controller, ControllerContext, ControllerState, Extension, ExtensionContext, ExtensionState,
    LifecycleContext, StateMode, View,
};
pub use loaded::{LoadedState, SharedValue, StateValue};
pub use managed::{ManagedPage, MountedExtension, PageInstances, PagePhase, SlotState};
pub use manager::{ManageOutcome, ManageRequest, PageManager};
pub use restricted::RestrictedPageStateManager;
pub use route::{
    Action, ActionKind, ControllerRef, LazyRoute, OnlyUpdate, PageRoute, RouteOptions,
    RouteParams, StaticRoute, ViewRef,
};
pub use server::ServerPageManager;
pub use state::{InMemoryPageStateManager, PageState, PageStateManager, StateObserver};
