//! Error taxonomy for composition and lifecycle phases.
//!
//! Composition failures surface as [`RegistrationError`]; phase failures
//! surface as [`LifecycleError`], which carries the failing component's name
//! and the hook's own error as its source.

/// Errors raised while registering or constructing components.
///
/// All variants are fatal at composition time: a hierarchy that fails to
/// compose never runs any lifecycle phase.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("a provider for {type_name} is already registered in this scope")]
    Duplicate { type_name: &'static str },
    #[error("{type_name} cannot depend on itself")]
    SelfDependency { type_name: &'static str },
    #[error("no provider for {type_name}{}", dependent_suffix(.required_by))]
    Missing {
        type_name: &'static str,
        required_by: Option<&'static str>,
    },
    #[error("dependency cycle detected while constructing {type_name}")]
    Cycle { type_name: &'static str },
    #[error("constructor for {type_name} failed: {source}")]
    Constructor {
        type_name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("lifecycle registry is sealed; components must enroll before any phase runs")]
    Sealed,
}

fn dependent_suffix(required_by: &Option<&'static str>) -> String {
    required_by
        .map(|dependent| format!(" (required by {dependent})"))
        .unwrap_or_default()
}

/// Errors returned by [`Group`](crate::Group) phase calls.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error("configure failed for {component}")]
    Configure {
        component: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("start failed for {component}")]
    Start {
        component: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("stop failed for {component}")]
    Stop {
        component: String,
        #[source]
        source: anyhow::Error,
    },
}

impl LifecycleError {
    /// Returns the name of the component whose hook failed, if any.
    #[must_use]
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::Registration(_) => None,
            Self::Configure { component, .. }
            | Self::Start { component, .. }
            | Self::Stop { component, .. } => Some(component),
        }
    }

    /// Returns the error produced by the failing hook, if any.
    #[must_use]
    pub fn hook_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Registration(_) => None,
            Self::Configure { source, .. }
            | Self::Start { source, .. }
            | Self::Stop { source, .. } => Some(source),
        }
    }
}
