//! ---
//! pw_section: "01-page-lifecycle"
//! pw_subsection: "module"
//! pw_type: "source"
//! pw_scope: "code"
//! pw_description: "Page lifecycle orchestration and collaborator contracts."
//! pw_version: "v0.0.0-prealpha"
//! pw_owner: "tbd"
//! ---
//! Externally settled signal used for cooperative cancellation points.
//!
//! A [`Deferred`] starts pending and settles exactly once, either resolved or
//! rejected. Clones share the same underlying signal, so a slot can hand one
//! copy to a racing stage and keep another to settle it later.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Settlement state of a [`Deferred`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Not yet settled.
    Pending,
    /// Settled successfully.
    Resolved,
    /// Settled by cancellation.
    Rejected,
}

/// Cancellation token and completion signal shared between a slot and the stages racing it.
#[derive(Debug, Clone)]
pub struct Deferred {
    tx: Arc<watch::Sender<Settlement>>,
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl Deferred {
    /// Create a pending signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Settlement::Pending);
        Self { tx: Arc::new(tx) }
    }

    /// Create a signal that is already resolved.
    pub fn resolved() -> Self {
        let (tx, _rx) = watch::channel(Settlement::Resolved);
        Self { tx: Arc::new(tx) }
    }

    /// Resolve the signal. Returns `false` when it had already settled.
    pub fn resolve(&self) -> bool {
        self.settle(Settlement::Resolved)
    }

    /// Reject the signal. Returns `false` when it had already settled.
    pub fn reject(&self) -> bool {
        self.settle(Settlement::Rejected)
    }

    /// Alias of [`Deferred::reject`] for call sites that read as cancellation.
    pub fn cancel(&self) -> bool {
        self.reject()
    }

    fn settle(&self, outcome: Settlement) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == Settlement::Pending {
                *state = outcome;
                true
            } else {
                false
            }
        })
    }

    /// Current settlement.
    pub fn settlement(&self) -> Settlement {
        *self.tx.borrow()
    }

    pub fn is_settled(&self) -> bool {
        self.settlement() != Settlement::Pending
    }

    pub fn is_cancelled(&self) -> bool {
        self.settlement() == Settlement::Rejected
    }

    /// Whether both handles observe the same underlying signal.
    pub fn same_signal(&self, other: &Deferred) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }

    /// Wait until the signal settles either way.
    pub fn settled(&self) -> impl Future<Output = Settlement> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            match rx.wait_for(|state| *state != Settlement::Pending).await {
                Ok(state) => *state,
                // The sender lives as long as any `Deferred` handle; a closed
                // channel means every handle is gone and nobody can settle it.
                Err(_) => Settlement::Rejected,
            }
        }
    }

    /// Wait until the signal is rejected. Never completes for a resolved signal.
    pub fn rejected(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            if rx
                .wait_for(|state| *state == Settlement::Rejected)
                .await
                .is_err()
            {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run `callback` once the signal settles. Runs inline when already settled.
    pub fn on_settle<F>(&self, callback: F)
    where
        F: FnOnce(Settlement) + Send + 'static,
    {
        let current = self.settlement();
        if current != Settlement::Pending {
            callback(current);
            return;
        }
        let settled = self.settled();
        tokio::spawn(async move {
            callback(settled.await);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn settles_only_once() {
        let deferred = Deferred::new();
        assert_eq!(deferred.settlement(), Settlement::Pending);
        assert!(deferred.resolve());
        assert!(!deferred.reject());
        assert_eq!(deferred.settled().await, Settlement::Resolved);
        assert!(!deferred.is_cancelled());
    }

    #[tokio::test]
    async fn clones_share_settlement() {
        let deferred = Deferred::new();
        let observer = deferred.clone();
        let waiter = tokio::spawn(observer.settled());
        assert!(deferred.cancel());
        assert_eq!(waiter.await.expect("join"), Settlement::Rejected);
        assert!(observer.is_cancelled());
        assert!(observer.same_signal(&deferred));
        assert!(!observer.same_signal(&Deferred::new()));
    }

    #[tokio::test]
    async fn rejected_never_fires_for_resolved_signal() {
        let deferred = Deferred::resolved();
        let outcome = tokio::time::timeout(Duration::from_millis(20), deferred.rejected()).await;
        assert!(outcome.is_err(), "resolved signal must not look cancelled");
    }

    #[tokio::test]
    async fn on_settle_runs_after_rejection() {
        let deferred = Deferred::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        deferred.on_settle(move |settlement| {
            flag.store(settlement == Settlement::Rejected, Ordering::SeqCst);
        });
        deferred.reject();
        for _ in 0..10 {
            if fired.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn on_settle_runs_inline_when_settled() {
        let deferred = Deferred::resolved();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        deferred.on_settle(move |_| flag.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }
}
