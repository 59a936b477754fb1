//! Process signal routing.
//!
//! A [`SignalRouter`] maps each [`Signal`] to at most one handler and runs a
//! single dispatch loop as a lifecycle component. Delivery comes from a
//! [`SignalSource`]: [`OsSignalSource`] for the real process, or
//! [`ManualSignalSource`] for in-process delivery.

pub mod kind;
pub mod router;
pub mod source;

pub use kind::Signal;
pub use router::{SignalHandler, SignalRouter};
pub use source::{Disposition, ManualSignalSource, OsSignalSource, SignalSource};

/// Errors returned by signal routing operations.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("signal number {raw} is not supported")]
    Unsupported { raw: i32 },
    #[error("unknown signal name: {name}")]
    Unknown { name: String },
    #[error("failed to subscribe to {signal}: {source}")]
    Subscribe {
        signal: Signal,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot route {signal} outside a Tokio runtime")]
    NoRuntime { signal: Signal },
    #[error("signal dispatch loop is already running")]
    AlreadyRunning,
}
