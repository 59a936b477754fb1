//! Static file mount on the HTTP service.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use conductor_core::{
    ConfigureContext, Context, Dependency, Lifecycle, Provide, Resolver, ServiceInfo,
};
use parking_lot::Mutex;
use serde::Deserialize;
use tower_http::services::ServeDir;
use tracing::info;

use super::http::{HttpError, HttpService};

/// Mount configuration read from the `"static"` key. Both fields are required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StaticConfig {
    /// URL prefix the directory is served under.
    pub url: String,
    /// Directory on disk.
    pub root: PathBuf,
}

/// Serves a directory from the HTTP service. Has no start or stop work of
/// its own; the mount is made during configure.
pub struct StaticFileService {
    info: ServiceInfo,
    http: Arc<HttpService>,
    mounted: Mutex<Option<StaticConfig>>,
}

impl StaticFileService {
    #[must_use]
    pub fn new(http: Arc<HttpService>) -> Self {
        Self {
            info: ServiceInfo::new("static"),
            http,
            mounted: Mutex::new(None),
        }
    }

    /// The mount made during configure, if any.
    #[must_use]
    pub fn mounted(&self) -> Option<StaticConfig> {
        self.mounted.lock().clone()
    }
}

#[async_trait]
impl Lifecycle for StaticFileService {
    fn name(&self) -> &str {
        self.info.name()
    }

    async fn configure(&self, cx: &ConfigureContext<'_>) -> anyhow::Result<()> {
        let config: StaticConfig = cx.config("static").map_err(HttpError::from)?;
        self.http
            .nest_service(&config.url, ServeDir::new(&config.root))?;
        info!(url = %config.url, root = %config.root.display(), "static files mounted");
        *self.mounted.lock() = Some(config);
        Ok(())
    }
}

impl Provide for StaticFileService {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<Context>(), Dependency::of::<HttpService>()]
    }

    fn provide(resolver: &Resolver) -> anyhow::Result<Arc<Self>> {
        let ctx = resolver.resolve::<Context>()?;
        let service = Arc::new(Self::new(resolver.resolve::<HttpService>()?));
        ctx.add_lifecycle(Arc::clone(&service) as Arc<dyn Lifecycle>)?;
        Ok(service)
    }
}
