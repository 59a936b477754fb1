//! Lifecycle registry shared by every group in one hierarchy.
//!
//! The [`Context`] holds the ordered list of enrolled bundles and a one-shot
//! cancellation token. Bundles are appended during composition only; the
//! first phase call seals the registry and later enrollments are rejected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::error::RegistrationError;
use crate::lifecycle::{BundleState, Lifecycle};
use crate::resolver::Resolver;

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// One enrolled component and its position in the lifecycle state machine.
pub(crate) struct Bundle {
    pub(crate) hooks: Arc<dyn Lifecycle>,
    state: Mutex<BundleState>,
}

impl Bundle {
    pub(crate) fn name(&self) -> &str {
        self.hooks.name()
    }

    pub(crate) fn state(&self) -> BundleState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: BundleState) {
        *self.state.lock() = state;
    }
}

// ---------------------------------------------------------------------------
// ShutdownToken
// ---------------------------------------------------------------------------

/// Owned handle for observing a [`Context`]'s cancellation.
///
/// Each long-running task takes its own token via [`Context::token`].
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Completes once the context has been shut down.
    pub async fn cancelled(&mut self) {
        // An error means the context itself was dropped, which also ends
        // every task bound to it.
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Returns `true` if the context has been shut down.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Ordered lifecycle registry plus the hierarchy's cancellation token.
///
/// Created by a root [`Group`](crate::Group) and shared by `Arc` with every
/// descendant group. The root also binds it in its resolver so components
/// can enroll from [`Provide::provide`](crate::Provide::provide).
pub struct Context {
    bundles: RwLock<Vec<Arc<Bundle>>>,
    sealed: AtomicBool,
    shutdown: watch::Sender<bool>,
    /// Resolver scopes of the hierarchy in creation order, root first.
    scopes: Mutex<Vec<Weak<Resolver>>>,
}

impl Context {
    /// Creates an empty, unsealed context.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            bundles: RwLock::new(Vec::new()),
            sealed: AtomicBool::new(false),
            shutdown: tx,
            scopes: Mutex::new(Vec::new()),
        }
    }

    /// Appends a bundle to the registry. Duplicates are kept and fire twice.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Sealed`] once any phase has run.
    pub fn add_lifecycle(&self, bundle: Arc<dyn Lifecycle>) -> Result<(), RegistrationError> {
        let mut bundles = self.bundles.write();
        if self.is_sealed() {
            return Err(RegistrationError::Sealed);
        }
        tracing::debug!(
            component = bundle.name(),
            position = bundles.len(),
            "lifecycle enrolled"
        );
        bundles.push(Arc::new(Bundle {
            hooks: bundle,
            state: Mutex::new(BundleState::Unconfigured),
        }));
        Ok(())
    }

    /// Cancels the context. Idempotent; every [`ShutdownToken`] observes it.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            tracing::info!("context shutdown requested");
        }
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Returns a token that completes when the context is shut down.
    #[must_use]
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.shutdown.subscribe(),
        }
    }

    /// Returns the number of enrolled bundles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.read().len()
    }

    /// Returns `true` if no bundle has been enrolled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bundles.read().is_empty()
    }

    /// Returns `true` once the registry no longer accepts enrollments.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Returns `true` if every enrolled bundle reports healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.bundles.read().iter().all(|bundle| bundle.hooks.health())
    }

    /// Snapshot of `(component name, state)` in enrollment order.
    #[must_use]
    pub fn states(&self) -> Vec<(String, BundleState)> {
        self.bundles
            .read()
            .iter()
            .map(|bundle| (bundle.name().to_string(), bundle.state()))
            .collect()
    }

    pub(crate) fn seal(&self) {
        // Taking the write lock orders sealing after any in-progress enrollment.
        let _bundles = self.bundles.write();
        self.sealed.store(true, Ordering::Release);
    }

    /// Drops bundles enrolled at or after position `len`. No-op once sealed.
    pub(crate) fn withdraw_from(&self, len: usize) {
        let mut bundles = self.bundles.write();
        if self.is_sealed() || bundles.len() <= len {
            return;
        }
        tracing::debug!(
            withdrawn = bundles.len() - len,
            "lifecycle enrollment withdrawn"
        );
        bundles.truncate(len);
    }

    /// Cloned snapshot of the bundle list for phase iteration.
    pub(crate) fn bundles(&self) -> Vec<Arc<Bundle>> {
        self.bundles.read().clone()
    }

    pub(crate) fn register_scope(&self, resolver: &Arc<Resolver>) {
        self.scopes.lock().push(Arc::downgrade(resolver));
    }

    /// Live resolver scopes in creation order.
    pub(crate) fn scopes(&self) -> Vec<Arc<Resolver>> {
        self.scopes.lock().iter().filter_map(Weak::upgrade).collect()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
