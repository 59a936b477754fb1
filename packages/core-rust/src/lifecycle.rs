//! The four-phase lifecycle contract implemented by every managed component.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::config::{ConfigError, ConfigStore};
use crate::error::RegistrationError;
use crate::resolver::Resolver;

// ---------------------------------------------------------------------------
// Lifecycle trait
// ---------------------------------------------------------------------------

/// Lifecycle contract for a component enrolled in a [`Context`](crate::Context).
///
/// Every hook has a neutral default: `configure`, `start` and `stop` do
/// nothing and `health` reports `true`. A component that does not override a
/// hook therefore takes no part in that phase and never affects the health
/// aggregate.
///
/// Hooks are invoked one at a time by the owning [`Group`](crate::Group):
/// configure and start in enrollment order, stop in reverse order.
#[async_trait]
pub trait Lifecycle: Send + Sync + 'static {
    /// Returns the component name used in logs and errors.
    fn name(&self) -> &str;

    /// Reads configuration and prepares the component. Called once per
    /// `Group::configure()`.
    async fn configure(&self, _cx: &ConfigureContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Starts the component. Long-running work must be spawned, not awaited.
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Stops the component.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Reports whether the component is currently healthy.
    fn health(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// ConfigureContext
// ---------------------------------------------------------------------------

/// Dependencies handed to [`Lifecycle::configure`].
///
/// Exposes the hierarchy's configuration store and the resolver of the group
/// driving the phase.
pub struct ConfigureContext<'a> {
    store: &'a dyn ConfigStore,
    resolver: &'a Resolver,
}

impl<'a> ConfigureContext<'a> {
    /// Creates a configure context over the given store and resolver.
    #[must_use]
    pub fn new(store: &'a dyn ConfigStore, resolver: &'a Resolver) -> Self {
        Self { store, resolver }
    }

    /// Decodes the configuration stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the key is absent and
    /// [`ConfigError::Decode`] if the stored value does not match `T`.
    pub fn config<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigError> {
        let value = self.store.get_value(name)?;
        serde_json::from_value(value).map_err(|source| ConfigError::Decode {
            key: name.to_string(),
            source,
        })
    }

    /// Like [`config`](Self::config), but yields `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the key exists with a value that
    /// does not match `T`.
    pub fn optional_config<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Option<T>, ConfigError> {
        match self.config(name) {
            Ok(value) => Ok(Some(value)),
            Err(ConfigError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns the underlying configuration store.
    #[must_use]
    pub fn store(&self) -> &dyn ConfigStore {
        self.store
    }

    /// Resolves a binding visible from the group driving this phase.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] if no provider for `T` is visible or
    /// its construction fails.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistrationError> {
        self.resolver.resolve::<T>()
    }
}

// ---------------------------------------------------------------------------
// BundleState
// ---------------------------------------------------------------------------

/// Per-bundle position in the lifecycle state machine.
///
/// `Unconfigured -> Configured -> Started -> Stopped`. A start failure moves
/// the already-started prefix to `RolledBack`, which is terminal: later
/// `Group::stop()` calls skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    Unconfigured,
    Configured,
    Started,
    Stopped,
    RolledBack,
}

impl BundleState {
    /// Returns the lowercase string representation used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::RolledBack => "rolled_back",
        }
    }
}
