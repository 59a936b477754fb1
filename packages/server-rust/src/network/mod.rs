//! HTTP participants: the server lifecycle component, static file mounts,
//! and serve-loop health.

pub mod health;
pub mod http;
pub mod static_files;

pub use health::{health_route, HealthState, ServeControl};
pub use http::{HttpConfig, HttpError, HttpService};
pub use static_files::{StaticConfig, StaticFileService};
