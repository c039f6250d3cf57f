//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Named page events offered to the controller first, then to each extension.

use serde_json::Value;
use tracing::warn;

use crate::error::{LifecycleStage, PageError, Result};
use crate::managed::PageInstances;

/// Event raised by the view layer and routed to the managed page.
#[derive(Debug, Clone)]
pub struct PageEvent {
    pub name: String,
    /// Explicit handler name, overriding the derived one.
    pub method: Option<String>,
    pub data: Value,
}

impl PageEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            method: None,
            data,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Handler name the event is offered under.
    pub fn handler_name(&self) -> String {
        match &self.method {
            Some(method) => method.clone(),
            None => handler_method_name(&self.name),
        }
    }
}

/// Whether a target accepted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Handled,
    Unhandled,
}

/// Derive `on_<snake_case>` from an event name such as `itemSelected` or `item-selected`.
pub fn handler_method_name(event: &str) -> String {
    let mut name = String::from("on");
    let mut boundary = true;
    for ch in event.chars() {
        if ch == '-' || ch == '_' || ch == ' ' || ch == '.' {
            boundary = true;
            continue;
        }
        if ch.is_uppercase() || boundary {
            name.push('_');
        }
        boundary = false;
        name.extend(ch.to_lowercase());
    }
    name
}

/// Receives events nobody handled.
pub trait EventSink: Send + Sync {
    fn unhandled(&self, event: &PageEvent, method: &str);
}

/// Default sink: a warning per unhandled event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn unhandled(&self, event: &PageEvent, method: &str) {
        warn!(
            event = %event.name,
            method = %method,
            "page event has no handler on the controller or its extensions"
        );
    }
}

/// Offer `event` to the controller, then each extension in registration order.
pub(crate) async fn dispatch(
    instances: &PageInstances,
    event: &PageEvent,
    sink: &dyn EventSink,
) -> Result<EventOutcome> {
    let method = event.handler_name();
    let controller_cx = instances.controller_context();
    let outcome = instances
        .controller
        .dispatch_event(&controller_cx, &method, &event.data)
        .await
        .map_err(|err| PageError::lifecycle(LifecycleStage::Event, instances.controller.name(), err))?;
    if outcome == EventOutcome::Handled {
        return Ok(outcome);
    }

    for mounted in &instances.extensions {
        let cx = instances.extension_context(mounted);
        let outcome = mounted
            .extension
            .dispatch_event(&cx, &method, &event.data)
            .await
            .map_err(|err| {
                PageError::lifecycle(LifecycleStage::Event, mounted.extension.name(), err)
            })?;
        if outcome == EventOutcome::Handled {
            return Ok(outcome);
        }
    }

    sink.unhandled(event, &method);
    Ok(EventOutcome::Unhandled)
}
