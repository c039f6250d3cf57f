//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
use std::fmt;

use thiserror::Error;

use crate::managed::PagePhase;

/// Shared result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, PageError>;

/// Errors raised by page state managers and state access handles.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    /// An extension tried to patch keys outside its allow-list.
    #[error("state patch touches keys outside the allow-list: {keys:?} (allowed: {allowed:?})")]
    PolicyViolation {
        keys: Vec<String>,
        allowed: Vec<String>,
    },
    /// The handle was detached from the state manager, usually because its page was destroyed.
    #[error("state access is not attached to a page state manager")]
    Detached,
}

/// Failure of a deferred state value produced by `load`/`update`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct StateValueError(pub String);

/// Lifecycle callback that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Init,
    Load,
    Update,
    Activate,
    Deactivate,
    Destroy,
    Event,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Init => "init",
            LifecycleStage::Load => "load",
            LifecycleStage::Update => "update",
            LifecycleStage::Activate => "activate",
            LifecycleStage::Deactivate => "deactivate",
            LifecycleStage::Destroy => "destroy",
            LifecycleStage::Event => "event",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which handler batch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerPhase {
    Pre,
    Post,
}

impl fmt::Display for HandlerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerPhase::Pre => f.write_str("pre-manage"),
            HandlerPhase::Post => f.write_str("post-manage"),
        }
    }
}

/// Errors surfaced by the page lifecycle orchestrator.
#[derive(Debug, Error)]
pub enum PageError {
    /// A newer transition superseded this one. `manage` converts it into a conflict.
    #[error("transition cancelled by a newer transition")]
    Cancelled,
    #[error(transparent)]
    State(#[from] StateError),
    #[error("{stage} failed for {target}")]
    Lifecycle {
        stage: LifecycleStage,
        target: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("route '{route}' could not be resolved")]
    RouteResolution {
        route: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("page instances for route '{route}' could not be constructed")]
    Construction {
        route: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("page renderer failed")]
    Render(#[source] anyhow::Error),
    #[error("{phase} handler '{handler}' failed")]
    Handler {
        phase: HandlerPhase,
        handler: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("illegal page phase transition {from:?} -> {to:?}")]
    InvalidPhase { from: PagePhase, to: PagePhase },
    #[error("page handler registry used before init")]
    HandlersNotInitialized,
}

impl PageError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PageError::Cancelled)
    }

    pub(crate) fn lifecycle(
        stage: LifecycleStage,
        target: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        PageError::Lifecycle {
            stage,
            target: target.into(),
            source,
        }
    }
}
