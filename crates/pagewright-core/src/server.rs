//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Server flavor: one rendered transition per request, never activated.

use std::sync::Arc;

use crate::error::Result;
use crate::manager::{ManageOutcome, ManageRequest, PageManager};

/// One-shot driver: a single transition rendered to a snapshot, never activated.
pub struct ServerPageManager {
    manager: Arc<PageManager>,
}

impl ServerPageManager {
    pub fn new(manager: Arc<PageManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<PageManager> {
        &self.manager
    }

    pub async fn init(&self) -> Result<()> {
        self.manager.init().await
    }

    pub async fn render(&self, request: ManageRequest) -> Result<ManageOutcome> {
        let outcome = self.manager.manage(request).await;
        self.manager.post_manage();
        outcome
    }

    pub async fn destroy(&self) -> Result<()> {
        self.manager.destroy().await
    }
}
