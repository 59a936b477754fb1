//! Serve-loop health state and the aggregate health endpoint.
//!
//! [`ServeControl`] keeps the HTTP service's health in an `ArcSwap` for
//! lock-free reads and broadcasts its stop request over a `watch` channel.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::StatusCode;
use axum::routing::{get, MethodRouter};
use axum::Json;
use conductor_core::Context;
use serde_json::json;
use tokio::sync::watch;

/// Health of a serve loop.
///
/// State machine: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Not yet accepting connections.
    Starting,
    /// Listener bound and serving.
    Ready,
    /// Stop requested; finishing in-flight connections.
    Draining,
    /// Serve loop has exited.
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Health state plus the stop trigger for one serve loop.
#[derive(Debug)]
pub struct ServeControl {
    stop_signal: watch::Sender<bool>,
    state: ArcSwap<HealthState>,
}

impl ServeControl {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            stop_signal: tx,
            state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    pub fn set_ready(&self) {
        self.state.store(Arc::new(HealthState::Ready));
    }

    /// Moves to `Draining` and notifies every stop receiver.
    pub fn trigger_stop(&self) {
        self.state.store(Arc::new(HealthState::Draining));
        self.stop_signal.send_replace(true);
    }

    pub fn set_stopped(&self) {
        self.state.store(Arc::new(HealthState::Stopped));
    }

    #[must_use]
    pub fn state(&self) -> HealthState {
        **self.state.load()
    }

    /// Returns a receiver that observes `true` once stop is triggered.
    #[must_use]
    pub fn stop_receiver(&self) -> watch::Receiver<bool> {
        self.stop_signal.subscribe()
    }
}

impl Default for ServeControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Route reporting the hierarchy's aggregate health.
///
/// Responds 200 when every component is healthy and 503 otherwise, with a
/// JSON body listing each component's lifecycle state.
pub fn health_route(ctx: Arc<Context>) -> MethodRouter {
    get(move || {
        let ctx = Arc::clone(&ctx);
        async move { health_response(&ctx) }
    })
}

fn health_response(ctx: &Context) -> (StatusCode, Json<serde_json::Value>) {
    let healthy = ctx.is_healthy();
    let components: Vec<_> = ctx
        .states()
        .into_iter()
        .map(|(name, state)| json!({ "name": name, "state": state.as_str() }))
        .collect();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({ "healthy": healthy, "components": components })),
    )
}

#[cfg(test)]
mod tests {
    use conductor_core::Lifecycle;

    use super::*;

    #[test]
    fn state_transitions_starting_ready_draining_stopped() {
        let control = ServeControl::new();
        assert_eq!(control.state(), HealthState::Starting);

        control.set_ready();
        assert_eq!(control.state(), HealthState::Ready);

        control.trigger_stop();
        assert_eq!(control.state(), HealthState::Draining);

        control.set_stopped();
        assert_eq!(control.state(), HealthState::Stopped);
    }

    #[tokio::test]
    async fn stop_receiver_notified() {
        let control = ServeControl::new();
        let mut rx = control.stop_receiver();
        assert!(!*rx.borrow());

        control.trigger_stop();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    struct Sick;

    impl Lifecycle for Sick {
        fn name(&self) -> &str {
            "sick"
        }

        fn health(&self) -> bool {
            false
        }
    }

    struct Fine;

    impl Lifecycle for Fine {
        fn name(&self) -> &str {
            "fine"
        }
    }

    #[test]
    fn health_response_reports_ok_when_all_healthy() {
        let ctx = Context::new();
        ctx.add_lifecycle(Arc::new(Fine)).unwrap();

        let (status, Json(body)) = health_response(&ctx);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);
        assert_eq!(body["components"][0]["name"], "fine");
        assert_eq!(body["components"][0]["state"], "unconfigured");
    }

    #[test]
    fn health_response_reports_unavailable_when_any_unhealthy() {
        let ctx = Context::new();
        ctx.add_lifecycle(Arc::new(Fine)).unwrap();
        ctx.add_lifecycle(Arc::new(Sick)).unwrap();

        let (status, Json(body)) = health_response(&ctx);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["healthy"], false);
        assert_eq!(body["components"].as_array().unwrap().len(), 2);
    }
}
