//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Cross-cutting handlers run around every transition.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{HandlerPhase, PageError, Result};
use crate::managed::ManagedPage;
use crate::route::Action;

/// Observer of page transitions.
#[async_trait]
pub trait PageHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs before the page in `managed` is replaced or updated into `next`.
    async fn handle_pre_managed_state(
        &self,
        _managed: &ManagedPage,
        _next: &ManagedPage,
        _action: &Action,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after `managed` was rendered in place of `previous`.
    async fn handle_post_managed_state(
        &self,
        _managed: &ManagedPage,
        _previous: &ManagedPage,
        _action: &Action,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Handlers of one phase, awaited one after another. The first failure stops the batch.
pub struct SerialBatch {
    phase: HandlerPhase,
    handlers: Vec<Arc<dyn PageHandler>>,
}

impl SerialBatch {
    fn new(phase: HandlerPhase, handlers: Vec<Arc<dyn PageHandler>>) -> Self {
        Self { phase, handlers }
    }

    pub fn phase(&self) -> HandlerPhase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn run(
        &self,
        managed: &ManagedPage,
        other: &ManagedPage,
        action: &Action,
    ) -> Result<()> {
        for handler in &self.handlers {
            let outcome = match self.phase {
                HandlerPhase::Pre => {
                    handler
                        .handle_pre_managed_state(managed, other, action)
                        .await
                }
                HandlerPhase::Post => {
                    handler
                        .handle_post_managed_state(managed, other, action)
                        .await
                }
            };
            outcome.map_err(|source| PageError::Handler {
                phase: self.phase,
                handler: handler.name().to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

struct Batches {
    pre: Arc<SerialBatch>,
    post: Arc<SerialBatch>,
}

/// Ordered set of [`PageHandler`]s driven by the page manager.
pub struct PageHandlerRegistry {
    handlers: Vec<Arc<dyn PageHandler>>,
    batches: Mutex<Option<Batches>>,
}

impl Default for PageHandlerRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PageHandlerRegistry {
    pub fn new(handlers: Vec<Arc<dyn PageHandler>>) -> Self {
        Self {
            handlers,
            batches: Mutex::new(None),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.batches.lock().is_some()
    }

    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }

    /// Initialize every handler and build both batches.
    pub async fn init(&self) -> Result<()> {
        for handler in &self.handlers {
            handler.init().await.map_err(|source| PageError::Handler {
                phase: HandlerPhase::Pre,
                handler: handler.name().to_string(),
                source,
            })?;
        }
        *self.batches.lock() = Some(Batches {
            pre: Arc::new(SerialBatch::new(HandlerPhase::Pre, self.handlers.clone())),
            post: Arc::new(SerialBatch::new(HandlerPhase::Post, self.handlers.clone())),
        });
        debug!(handlers = self.handlers.len(), "page handlers initialized");
        Ok(())
    }

    fn batch(&self, phase: HandlerPhase) -> Result<Arc<SerialBatch>> {
        let batches = self.batches.lock();
        let batches = batches.as_ref().ok_or(PageError::HandlersNotInitialized)?;
        Ok(match phase {
            HandlerPhase::Pre => batches.pre.clone(),
            HandlerPhase::Post => batches.post.clone(),
        })
    }

    pub async fn handle_pre_managed_state(
        &self,
        managed: &ManagedPage,
        next: &ManagedPage,
        action: &Action,
    ) -> Result<()> {
        let batch = self.batch(HandlerPhase::Pre)?;
        batch.run(managed, next, action).await
    }

    pub async fn handle_post_managed_state(
        &self,
        managed: &ManagedPage,
        previous: &ManagedPage,
        action: &Action,
    ) -> Result<()> {
        let batch = self.batch(HandlerPhase::Post)?;
        batch.run(managed, previous, action).await
    }

    /// Tear down every handler and drop both batches. Failures are logged.
    pub async fn destroy(&self) {
        self.batches.lock().take();
        for handler in &self.handlers {
            if let Err(err) = handler.destroy().await {
                warn!(handler = handler.name(), error = %err, "page handler failed to tear down");
            }
        }
    }
}
