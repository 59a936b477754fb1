//! Service identity shared by managed components.

use std::fmt;

use uuid::Uuid;

/// Unique identifier assigned to a service instance at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(pub Uuid);

impl ServiceId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ServiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Name and identity of a service instance.
///
/// Components embed a `ServiceInfo` and report its name from
/// [`Lifecycle::name`](crate::Lifecycle::name).
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    name: String,
    id: ServiceId,
}

impl ServiceInfo {
    /// Creates identity for a service named `name` with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: ServiceId::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> ServiceId {
        self.id
    }
}
