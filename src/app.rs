//! Startup and shutdown coordination.
//!
//! Startup order: deployment config, registry, mediation engine, artifact
//! deployment (routes registered, inbound adapters spawned), HTTP server.
//! Shutdown order: root cancellation, wait for every tracked worker to
//! drain, then wait for the HTTP server's own bounded drain.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::info;

use crate::config::{self, BASE_HTTP_PORT, ConfigError};
use crate::deployers::Deployer;
use crate::lifecycle::Lifecycle;
use crate::mediation::{InboundMessageMediator, MediationEngine};
use crate::registry::ConfigRegistry;
use crate::router::{RouterError, RouterService};

/// Fatal startup failures. Artifact-level problems never surface here; they
/// are logged and skipped during deployment.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("cannot locate server home: {0}")]
    Home(#[from] std::io::Error),
}

/// On-disk layout the gateway runs from: `conf/` and `artifacts/` side by
/// side under one base directory.
#[derive(Debug, Clone)]
pub struct ServerHome {
    pub conf_dir: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl ServerHome {
    pub fn from_base(base: &Path) -> Self {
        Self {
            conf_dir: base.join("conf"),
            artifacts_dir: base.join("artifacts"),
        }
    }

    /// Resolve the home relative to the running binary: the binary lives in
    /// `<home>/bin/`, so conf and artifacts sit one level up.
    pub fn from_executable() -> std::io::Result<Self> {
        let exe = std::env::current_exe()?;
        let bin_dir = exe.parent().ok_or_else(|| {
            std::io::Error::other("executable has no parent directory")
        })?;
        Ok(Self::from_base(&bin_dir.join("..")))
    }
}

/// Run the gateway until the lifecycle is cancelled.
pub async fn run(home: &ServerHome, lifecycle: Lifecycle) -> Result<(), AppError> {
    let start = Instant::now();

    let registry = Arc::new(ConfigRegistry::new());

    let deployment = config::load_deployment_config(&home.conf_dir)?;
    let hostname = deployment.server.hostname.clone();
    let port = deployment.effective_port(BASE_HTTP_PORT)?;
    registry.set_deployment_config(deployment);

    let engine = Arc::new(MediationEngine::new(
        Arc::clone(&registry),
        lifecycle.clone(),
    ));
    let mediator: Arc<dyn InboundMessageMediator> = engine.clone() as Arc<dyn InboundMessageMediator>;

    let mut router = RouterService::new(hostname, port, engine.context(lifecycle.token()));

    let deployer = Deployer::new(&home.artifacts_dir, Arc::clone(&registry));
    deployer.deploy(&mut router, mediator, &lifecycle);

    let server = router.bind(lifecycle.clone()).await?;

    info!(
        startup_ms = start.elapsed().as_millis() as u64,
        apis = registry.api_count(),
        "server started"
    );

    // Block until shutdown is requested, then drain: first every tracked
    // worker (inbound adapters, in-flight mediation), then the HTTP server
    // with its own bounded timeout.
    lifecycle.token().cancelled().await;
    lifecycle.wait_for_workers().await;
    server.shutdown().await;
    info!("HTTP server shutdown gracefully");

    Ok(())
}
