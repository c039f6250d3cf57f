//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Long-lived session driver: many sequential transitions, activation, and events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{PageError, Result};
use crate::events::{EventOutcome, EventSink, PageEvent, TracingEventSink};
use crate::manager::{ManageOutcome, ManageRequest, PageManager};

pub struct ClientPageManager {
    manager: Arc<PageManager>,
    sink: Arc<dyn EventSink>,
    navigation: AtomicU64,
}

impl ClientPageManager {
    pub fn new(manager: Arc<PageManager>) -> Self {
        Self {
            manager,
            sink: Arc::new(TracingEventSink),
            navigation: AtomicU64::new(0),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn manager(&self) -> &Arc<PageManager> {
        &self.manager
    }

    pub async fn init(&self) -> Result<()> {
        self.manager.init().await?;
        info!("client page manager ready");
        Ok(())
    }

    /// Supersede whatever is in flight, then manage `request` and activate the result.
    ///
    /// A navigation overtaken by a newer one while waiting returns a conflict
    /// without touching the slots.
    pub async fn navigate(&self, request: ManageRequest) -> Result<ManageOutcome> {
        let ticket = self.navigation.fetch_add(1, Ordering::SeqCst) + 1;
        self.manager.pre_manage().await;
        if self.navigation.load(Ordering::SeqCst) != ticket {
            debug!(route = request.route.name(), "navigation overtaken before it started");
            return Ok(ManageOutcome::Conflict);
        }

        let outcome = match self.manager.manage(request).await {
            Ok(ManageOutcome::Rendered(response)) => self
                .manager
                .activate()
                .await
                .map(|()| ManageOutcome::Rendered(response)),
            other => other,
        };
        self.manager.post_manage();
        outcome
    }

    pub async fn handle_event(&self, event: PageEvent) -> Result<EventOutcome> {
        self.manager.dispatch_event(&event, self.sink.as_ref()).await
    }

    /// Destroy the managed page and unmount whatever the renderer shows.
    pub async fn destroy(&self) -> Result<()> {
        self.manager.destroy().await?;
        self.manager
            .renderer()
            .unmount()
            .await
            .map_err(PageError::Render)
    }
}
