//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Resolved route descriptors and the options a transition is managed with.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use pagewright_common::config::RouteDefaults;
use serde_json::Value;
use tokio::sync::OnceCell;

/// Identity of a controller, compared to decide reuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerRef(Arc<str>);

/// Identity of a view, compared to decide reuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewRef(Arc<str>);

macro_rules! identity_impls {
    ($ty:ident) => {
        impl $ty {
            pub fn new(id: impl Into<Arc<str>>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

identity_impls!(ControllerRef);
identity_impls!(ViewRef);

/// Route parameters extracted by the external path matcher.
pub type RouteParams = IndexMap<String, String>;

type OnlyUpdateFn = dyn Fn(&ControllerRef, &ViewRef) -> bool + Send + Sync;

/// Whether a transition may reuse the mounted controller and view.
///
/// Reuse also requires the mounted identities to match the new ones; the
/// predicate only narrows that further.
#[derive(Clone, Default)]
pub enum OnlyUpdate {
    #[default]
    Never,
    Always,
    Predicate(Arc<OnlyUpdateFn>),
}

impl OnlyUpdate {
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&ControllerRef, &ViewRef) -> bool + Send + Sync + 'static,
    {
        OnlyUpdate::Predicate(Arc::new(predicate))
    }

    /// Evaluate against the mounted identities.
    pub fn allows(&self, controller: &ControllerRef, view: &ViewRef) -> bool {
        match self {
            OnlyUpdate::Never => false,
            OnlyUpdate::Always => true,
            OnlyUpdate::Predicate(predicate) => predicate(controller, view),
        }
    }
}

impl fmt::Debug for OnlyUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnlyUpdate::Never => f.write_str("Never"),
            OnlyUpdate::Always => f.write_str("Always"),
            OnlyUpdate::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<bool> for OnlyUpdate {
    fn from(value: bool) -> Self {
        if value {
            OnlyUpdate::Always
        } else {
            OnlyUpdate::Never
        }
    }
}

/// Options a transition is managed with. Everything but `only_update` is a
/// hint forwarded to the renderer.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    pub only_update: OnlyUpdate,
    pub auto_scroll: bool,
    pub allow_spa: bool,
    pub document_view: Option<String>,
    pub managed_root_view: Option<String>,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            only_update: OnlyUpdate::Never,
            auto_scroll: true,
            allow_spa: true,
            document_view: None,
            managed_root_view: None,
        }
    }
}

impl From<&RouteDefaults> for RouteOptions {
    fn from(defaults: &RouteDefaults) -> Self {
        Self {
            only_update: defaults.only_update.into(),
            auto_scroll: defaults.auto_scroll,
            allow_spa: defaults.allow_spa,
            document_view: defaults.document_view.clone(),
            managed_root_view: defaults.managed_root_view.clone(),
        }
    }
}

/// What triggered a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActionKind {
    #[default]
    Direct,
    Redirect,
    PopState,
    Click,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct Action {
    pub kind: ActionKind,
    pub url: Option<String>,
    pub payload: Option<Value>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Destination resolved by the external path matcher.
#[async_trait]
pub trait PageRoute: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn is_controller_resolved(&self) -> bool;

    fn is_view_resolved(&self) -> bool;

    async fn controller(&self) -> anyhow::Result<ControllerRef>;

    async fn view(&self) -> anyhow::Result<ViewRef>;
}

/// Route whose identities are known up front.
#[derive(Debug, Clone)]
pub struct StaticRoute {
    name: String,
    controller: ControllerRef,
    view: ViewRef,
}

impl StaticRoute {
    pub fn new(
        name: impl Into<String>,
        controller: impl Into<ControllerRef>,
        view: impl Into<ViewRef>,
    ) -> Self {
        Self {
            name: name.into(),
            controller: controller.into(),
            view: view.into(),
        }
    }
}

#[async_trait]
impl PageRoute for StaticRoute {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_controller_resolved(&self) -> bool {
        true
    }

    fn is_view_resolved(&self) -> bool {
        true
    }

    async fn controller(&self) -> anyhow::Result<ControllerRef> {
        Ok(self.controller.clone())
    }

    async fn view(&self) -> anyhow::Result<ViewRef> {
        Ok(self.view.clone())
    }
}

type Loader<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Route whose identities come from loaders run once, on first use.
pub struct LazyRoute {
    name: String,
    controller_loader: Loader<ControllerRef>,
    view_loader: Loader<ViewRef>,
    controller: OnceCell<ControllerRef>,
    view: OnceCell<ViewRef>,
}

impl fmt::Debug for LazyRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRoute")
            .field("name", &self.name)
            .field("controller", &self.controller.get())
            .field("view", &self.view.get())
            .finish()
    }
}

impl LazyRoute {
    pub fn new<C, CF, V, VF>(name: impl Into<String>, controller: C, view: V) -> Self
    where
        C: Fn() -> CF + Send + Sync + 'static,
        CF: Future<Output = anyhow::Result<ControllerRef>> + Send + 'static,
        V: Fn() -> VF + Send + Sync + 'static,
        VF: Future<Output = anyhow::Result<ViewRef>> + Send + 'static,
    {
        Self {
            name: name.into(),
            controller_loader: Arc::new(move || controller().boxed()),
            view_loader: Arc::new(move || view().boxed()),
            controller: OnceCell::new(),
            view: OnceCell::new(),
        }
    }
}

#[async_trait]
impl PageRoute for LazyRoute {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_controller_resolved(&self) -> bool {
        self.controller.initialized()
    }

    fn is_view_resolved(&self) -> bool {
        self.view.initialized()
    }

    async fn controller(&self) -> anyhow::Result<ControllerRef> {
        let loader = self.controller_loader.clone();
        self.controller
            .get_or_try_init(|| loader())
            .await
            .cloned()
    }

    async fn view(&self) -> anyhow::Result<ViewRef> {
        let loader = self.view_loader.clone();
        self.view.get_or_try_init(|| loader()).await.cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn lazy_route_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let route = LazyRoute::new(
            "detail",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(ControllerRef::new("DetailController"))
                }
            },
            || async { Ok(ViewRef::new("DetailView")) },
        );

        assert!(!route.is_controller_resolved());
        assert_eq!(route.controller().await.unwrap().as_str(), "DetailController");
        assert_eq!(route.controller().await.unwrap().as_str(), "DetailController");
        assert!(route.is_controller_resolved());
        assert!(!route.is_view_resolved());
        assert_eq!(route.view().await.unwrap(), ViewRef::new("DetailView"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn only_update_variants() {
        let controller = ControllerRef::new("List");
        let view = ViewRef::new("ListView");
        assert!(!OnlyUpdate::Never.allows(&controller, &view));
        assert!(OnlyUpdate::Always.allows(&controller, &view));
        let predicate = OnlyUpdate::predicate(|controller, _view| controller.as_str() == "List");
        assert!(predicate.allows(&controller, &view));
        assert!(!predicate.allows(&ControllerRef::new("Detail"), &view));
    }

    #[test]
    fn options_follow_configured_defaults() {
        let defaults = RouteDefaults {
            only_update: true,
            auto_scroll: false,
            allow_spa: true,
            document_view: Some("Document".into()),
            managed_root_view: None,
        };
        let options = RouteOptions::from(&defaults);
        assert!(matches!(options.only_update, OnlyUpdate::Always));
        assert!(!options.auto_scroll);
        assert_eq!(options.document_view.as_deref(), Some("Document"));
    }
}
