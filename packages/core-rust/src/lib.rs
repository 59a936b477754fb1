//! Conductor Core -- component registry, dependency resolution, and ordered
//! lifecycle phases with start rollback.
//!
//! A root [`Group`] owns a [`Context`]; child groups add resolver scopes that
//! see their ancestors' bindings. Components enroll a [`Lifecycle`] in the
//! Context while they are constructed, and the hierarchy then runs
//! `configure -> start -> stop` over every enrolled component in order.

pub mod config;
pub mod context;
pub mod error;
pub mod group;
pub mod lifecycle;
pub mod resolver;
pub mod service;

pub use config::{ConfigError, ConfigStore, EmptyConfigStore, JsonConfigStore};
pub use context::{Context, ShutdownToken};
pub use error::{LifecycleError, RegistrationError};
pub use group::Group;
pub use lifecycle::{BundleState, ConfigureContext, Lifecycle};
pub use resolver::{Dependency, Provide, Resolver};
pub use service::{ServiceId, ServiceInfo};
