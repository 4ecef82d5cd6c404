//! Placeholder for a page that is still loading

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::collection::PageRef;
use crate::error::CrudError;

/// Outcome of one page load
pub type PageOutcome = std::result::Result<PageRef, CrudError>;

/// Cloneable handle to an in-flight page load
///
/// Handed out through the data-loading event before the load starts. Every
/// clone observes the same single outcome. If the load is dropped without
/// finishing, waiters see [`CrudError::LoadCancelled`].
#[derive(Clone)]
pub struct PendingPage {
    outcome: Shared<BoxFuture<'static, PageOutcome>>,
    resolved: Arc<AtomicBool>,
}

/// Write side of a [`PendingPage`]; consumed by its single resolution
pub(crate) struct PageResolver {
    tx: oneshot::Sender<PageOutcome>,
    resolved: Arc<AtomicBool>,
}

/// Create a linked resolver / placeholder pair
pub(crate) fn pending_page() -> (PageResolver, PendingPage) {
    let (tx, rx) = oneshot::channel();
    let resolved = Arc::new(AtomicBool::new(false));

    let outcome = rx
        .map(|received| received.unwrap_or(Err(CrudError::LoadCancelled)))
        .boxed()
        .shared();

    (
        PageResolver {
            tx,
            resolved: resolved.clone(),
        },
        PendingPage { outcome, resolved },
    )
}

impl PageResolver {
    pub(crate) fn resolve(self, outcome: PageOutcome) {
        self.resolved.store(true, Ordering::SeqCst);
        // Nobody waiting is fine; the outcome is also returned to the caller
        let _ = self.tx.send(outcome);
    }
}

impl PendingPage {
    /// Wait for the load to finish
    pub async fn wait(&self) -> PageOutcome {
        self.outcome.clone().await
    }

    /// Whether the load has finished, successfully or not
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for PendingPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingPage")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
