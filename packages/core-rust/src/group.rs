//! Composition scopes that drive lifecycle phases.
//!
//! A [`Group`] pairs a [`Resolver`] scope with the hierarchy's shared
//! [`Context`]. Groups form a tree that controls dependency visibility only:
//! every phase call iterates the shared Context, so all groups of one
//! hierarchy run on a single lifecycle timeline.
//!
//! Phase ordering:
//! 1. `configure()` -- enrollment order, first error aborts, no rollback
//! 2. `start()` -- enrollment order; a failure at index *k* stops `[0, k)` in
//!    reverse (errors swallowed) and returns the start error
//! 3. `stop()` -- reverse enrollment order, first error aborts

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{ConfigStore, EmptyConfigStore};
use crate::context::{Bundle, Context};
use crate::error::{LifecycleError, RegistrationError};
use crate::lifecycle::{BundleState, ConfigureContext};
use crate::resolver::{Provide, Resolver};

/// A named composition scope bound to a shared lifecycle [`Context`].
pub struct Group {
    name: String,
    parent: Option<String>,
    resolver: Arc<Resolver>,
    ctx: Arc<Context>,
    config: Arc<dyn ConfigStore>,
}

impl Group {
    /// Creates a group. With no parent this is a root group owning a fresh
    /// resolver and Context (bound in the resolver as `Arc<Context>`). With a
    /// parent, the group gets a child resolver scope and reuses the parent's
    /// Context and configuration store.
    #[must_use]
    pub fn new(name: impl Into<String>, parent: Option<&Group>) -> Self {
        match parent {
            Some(parent) => Self::child(name, parent),
            None => Self::root(name),
        }
    }

    /// Creates a root group with an empty configuration store.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self::root_with_config(name, Arc::new(EmptyConfigStore))
    }

    /// Creates a root group reading configuration from `config`.
    #[must_use]
    pub fn root_with_config(name: impl Into<String>, config: Arc<dyn ConfigStore>) -> Self {
        let ctx = Arc::new(Context::new());
        let resolver = Arc::new(Resolver::new());
        // A fresh resolver has no bindings, so this cannot collide.
        let _ = resolver.provide_value(Arc::clone(&ctx));
        ctx.register_scope(&resolver);
        Self {
            name: name.into(),
            parent: None,
            resolver,
            ctx,
            config,
        }
    }

    /// Creates a group scoped beneath `parent`.
    #[must_use]
    pub fn child(name: impl Into<String>, parent: &Group) -> Self {
        let resolver = Arc::new(Resolver::child(&parent.resolver));
        parent.ctx.register_scope(&resolver);
        Self {
            name: name.into(),
            parent: Some(parent.name.clone()),
            resolver,
            ctx: Arc::clone(&parent.ctx),
            config: Arc::clone(&parent.config),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parent group's name, or `None` for a root group.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Returns the lifecycle registry shared by this hierarchy.
    #[must_use]
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    #[must_use]
    pub fn config(&self) -> &Arc<dyn ConfigStore> {
        &self.config
    }

    /// Registers the provider for `T` in this group's scope.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Sealed`] after composition, otherwise any
    /// error from [`Resolver::provide`].
    pub fn add_service<T: Provide>(&self) -> Result<(), RegistrationError> {
        if self.ctx.is_sealed() {
            return Err(RegistrationError::Sealed);
        }
        self.resolver.provide::<T>()?;
        debug!(group = %self.name, service = std::any::type_name::<T>(), "service registered");
        Ok(())
    }

    /// Binds a ready-made instance in this group's scope.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Duplicate`] if `T` is already bound here.
    pub fn add_value<T: Send + Sync + 'static>(&self, value: Arc<T>) -> Result<(), RegistrationError> {
        self.resolver.provide_value(value)
    }

    /// Resolves a binding visible from this group.
    ///
    /// # Errors
    ///
    /// See [`Resolver::resolve`].
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistrationError> {
        self.resolver.resolve::<T>()
    }

    /// Constructs every registered service of the hierarchy and seals the
    /// Context. Idempotent; called implicitly by `configure()` and `start()`.
    ///
    /// Scopes are built root first, then children in creation order.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistrationError`]; the Context stays unsealed so
    /// the failure can be corrected and composition retried.
    pub fn compose(&self) -> Result<(), RegistrationError> {
        if self.ctx.is_sealed() {
            return Ok(());
        }
        for scope in self.ctx.scopes() {
            scope.construct_all()?;
        }
        self.ctx.seal();
        info!(
            group = %self.name,
            components = self.ctx.len(),
            "composition complete"
        );
        Ok(())
    }

    /// Runs every bundle's configure hook in enrollment order.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Registration`] if composition fails and
    /// [`LifecycleError::Configure`] for the first failing hook; remaining
    /// hooks are not called.
    pub async fn configure(&self) -> Result<(), LifecycleError> {
        self.compose()?;
        debug!(group = %self.name, "configure phase");

        let cx = ConfigureContext::new(self.config.as_ref(), &self.resolver);
        for bundle in self.ctx.bundles() {
            debug!(component = bundle.name(), "configuring");
            bundle
                .hooks
                .configure(&cx)
                .await
                .map_err(|source| LifecycleError::Configure {
                    component: bundle.name().to_string(),
                    source,
                })?;
            bundle.set_state(BundleState::Configured);
        }
        Ok(())
    }

    /// Runs every bundle's start hook in enrollment order.
    ///
    /// If the hook at index *k* fails, the bundles `[0, k)` are stopped in
    /// reverse order and marked `RolledBack`; errors from those stop hooks are
    /// logged and swallowed so the rollback drains fully.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Registration`] if composition fails and
    /// [`LifecycleError::Start`] carrying the failing hook's error.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.compose()?;
        debug!(group = %self.name, "start phase");

        let bundles = self.ctx.bundles();
        for (index, bundle) in bundles.iter().enumerate() {
            debug!(component = bundle.name(), "starting");
            if let Err(source) = bundle.hooks.start().await {
                warn!(
                    component = bundle.name(),
                    error = %source,
                    started = index,
                    "start failed, rolling back started components"
                );
                rollback(&bundles[..index]).await;
                return Err(LifecycleError::Start {
                    component: bundle.name().to_string(),
                    source,
                });
            }
            bundle.set_state(BundleState::Started);
        }

        info!(group = %self.name, components = bundles.len(), "all components started");
        Ok(())
    }

    /// Runs every bundle's stop hook in reverse enrollment order, skipping
    /// bundles already rolled back by a failed `start()`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Stop`] for the first failing hook; bundles
    /// earlier in enrollment order are not stopped.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        debug!(group = %self.name, "stop phase");

        for bundle in self.ctx.bundles().iter().rev() {
            if bundle.state() == BundleState::RolledBack {
                debug!(component = bundle.name(), "skipping rolled back component");
                continue;
            }
            debug!(component = bundle.name(), "stopping");
            bundle
                .hooks
                .stop()
                .await
                .map_err(|source| LifecycleError::Stop {
                    component: bundle.name().to_string(),
                    source,
                })?;
            bundle.set_state(BundleState::Stopped);
        }

        info!(group = %self.name, "all components stopped");
        Ok(())
    }

    /// Returns `true` if every enrolled bundle reports healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.ctx.is_healthy()
    }
}

/// Stops `started` in reverse order, swallowing errors.
async fn rollback(started: &[Arc<Bundle>]) {
    for bundle in started.iter().rev() {
        debug!(component = bundle.name(), "rolling back");
        if let Err(e) = bundle.hooks.stop().await {
            warn!(component = bundle.name(), error = %e, "rollback stop failed");
        }
        bundle.set_state(BundleState::RolledBack);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
