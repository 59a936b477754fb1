//! HTTP server lifecycle component.
//!
//! Follows a deferred startup pattern:
//! 1. construction -- allocates the route table and serve control
//! 2. `configure` -- reads the `"http"` key; other components register routes
//! 3. `start` -- binds the TCP listener and spawns the serve task
//! 4. `stop` -- triggers graceful shutdown and waits for the serve task

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::MethodRouter;
use axum::Router;
use conductor_core::{
    ConfigError, ConfigureContext, Context, Dependency, Lifecycle, Provide, Resolver, ServiceInfo,
};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::health::{HealthState, ServeControl};

/// Errors raised by [`HttpService`].
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("routes must be registered before the HTTP service starts")]
    AlreadyStarted,
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Listener configuration read from the `"http"` key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
        }
    }
}

/// Serves the routes other components register during composition and
/// configure.
pub struct HttpService {
    info: ServiceInfo,
    ctx: Arc<Context>,
    config: Mutex<HttpConfig>,
    /// `None` once the router has been handed to the serve task.
    router: Mutex<Option<Router>>,
    control: ServeControl,
    local_addr: Mutex<Option<SocketAddr>>,
    task: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl HttpService {
    #[must_use]
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            info: ServiceInfo::new("http"),
            ctx,
            config: Mutex::new(HttpConfig::default()),
            router: Mutex::new(Some(Router::new())),
            control: ServeControl::new(),
            local_addr: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Adds a route.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::AlreadyStarted`] once the service is serving.
    pub fn register(&self, path: &str, method_router: MethodRouter) -> Result<(), HttpError> {
        self.update_router(|router| router.route(path, method_router))?;
        debug!(path, "route registered");
        Ok(())
    }

    /// Mounts `service` under `path`. A path of `/` mounts it as the
    /// fallback for every unmatched request.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::AlreadyStarted`] once the service is serving.
    pub fn nest_service<T>(&self, path: &str, service: T) -> Result<(), HttpError>
    where
        T: tower::Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        T::Response: IntoResponse,
        T::Future: Send + 'static,
    {
        if path == "/" {
            self.update_router(|router| router.fallback_service(service))?;
        } else {
            self.update_router(|router| router.nest_service(path, service))?;
        }
        debug!(path, "service mounted");
        Ok(())
    }

    /// Address the listener is bound to, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    #[must_use]
    pub fn config(&self) -> HttpConfig {
        self.config.lock().clone()
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        self.control.state()
    }

    fn update_router(&self, f: impl FnOnce(Router) -> Router) -> Result<(), HttpError> {
        let mut slot = self.router.lock();
        let router = slot.take().ok_or(HttpError::AlreadyStarted)?;
        *slot = Some(f(router));
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for HttpService {
    fn name(&self) -> &str {
        self.info.name()
    }

    /// A missing `"http"` key keeps the defaults.
    async fn configure(&self, cx: &ConfigureContext<'_>) -> anyhow::Result<()> {
        if let Some(config) = cx
            .optional_config::<HttpConfig>("http")
            .map_err(HttpError::from)?
        {
            *self.config.lock() = config;
        }
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        let config = self.config();
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| HttpError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let router = self
            .router
            .lock()
            .take()
            .ok_or(HttpError::AlreadyStarted)?
            .layer(TraceLayer::new_for_http());

        let stop_rx = self.control.stop_receiver();
        let mut token = self.ctx.token();
        let shutdown = async move {
            tokio::select! {
                () = stop_requested(stop_rx) => {}
                () = token.cancelled() => {}
            }
        };
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
        });

        *self.local_addr.lock() = Some(local_addr);
        *self.task.lock() = Some(task);
        self.control.set_ready();
        info!(id = %self.info.id(), addr = %local_addr, "HTTP service listening");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.control.trigger_stop();
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.await??;
            info!("HTTP service stopped");
        }
        self.control.set_stopped();
        Ok(())
    }

    fn health(&self) -> bool {
        self.control.state() == HealthState::Ready
    }
}

async fn stop_requested(mut rx: tokio::sync::watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopping| *stopping).await;
}

impl Provide for HttpService {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<Context>()]
    }

    fn provide(resolver: &Resolver) -> anyhow::Result<Arc<Self>> {
        let ctx = resolver.resolve::<Context>()?;
        let service = Arc::new(Self::new(Arc::clone(&ctx)));
        ctx.add_lifecycle(Arc::clone(&service) as Arc<dyn Lifecycle>)?;
        Ok(service)
    }
}
