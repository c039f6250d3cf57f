//! ---
//! pw_section: "03-logging"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Structured logging adapters and sinks."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
#![warn(missing_docs)]

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

#[doc(hidden)]
pub use tracing;

/// Initialize a baseline tracing subscriber suitable for development and tests.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Route name of the page being managed.
    pub route: Option<&'a str>,
    /// Controller identity associated with the log event.
    pub controller: Option<&'a str>,
    /// View identity associated with the log event.
    pub view: Option<&'a str>,
    /// Transition sequence number.
    pub transition: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a route name.
    pub fn with_route(mut self, route: &'a str) -> Self {
        self.route = Some(route);
        self
    }

    /// Attach a controller identity.
    pub fn with_controller(mut self, controller: &'a str) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Attach a view identity.
    pub fn with_view(mut self, view: &'a str) -> Self {
        self.view = Some(view);
        self
    }

    /// Attach a transition sequence number.
    pub fn with_transition(mut self, transition: u64) -> Self {
        self.transition = Some(transition);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// The transition completed and produced a page.
    Success,
    /// The transition was superseded by a newer one.
    Conflict,
    /// The transition failed.
    Fault,
}

impl LifecycleOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            LifecycleOutcome::Success => "success",
            LifecycleOutcome::Conflict => "conflict",
            LifecycleOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized lifecycle event with a success/conflict/fault outcome.
pub fn log_lifecycle_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: LifecycleOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    // `tracing::event!` needs a constant level, so each outcome gets its own arm.
    match outcome {
        LifecycleOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            route = ctx.route.unwrap_or(""),
            controller = ctx.controller.unwrap_or(""),
            view = ctx.view.unwrap_or(""),
            transition = ctx.transition.unwrap_or_default(),
            message = %message
        ),
        LifecycleOutcome::Conflict => tracing::event!(
            Level::DEBUG,
            event,
            outcome = outcome.as_str(),
            route = ctx.route.unwrap_or(""),
            controller = ctx.controller.unwrap_or(""),
            view = ctx.view.unwrap_or(""),
            transition = ctx.transition.unwrap_or_default(),
            message = %message
        ),
        LifecycleOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            route = ctx.route.unwrap_or(""),
            controller = ctx.controller.unwrap_or(""),
            view = ctx.view.unwrap_or(""),
            transition = ctx.transition.unwrap_or_default(),
            message = %message
        ),
    }
}
