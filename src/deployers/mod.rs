//! Artifact discovery and deployment.
//!
//! At startup the deployer scans the artifact directory layout
//! (`Sequences/`, `APIs/`, `Inbounds/`, `Endpoints/`, in that order), parses
//! every `*.xml` descriptor, registers the result, and performs side effects:
//! route registration for APIs, adapter spawn for inbounds. A failing
//! artifact is logged with its file and line and skipped; one bad descriptor
//! never aborts the deployment pass.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::artifacts::Position;
use crate::lifecycle::Lifecycle;
use crate::mediation::InboundMessageMediator;
use crate::registry::ConfigRegistry;
use crate::router::RouterService;

pub mod api;
pub mod endpoint;
pub mod inbound;
pub mod sequence;
mod xml;

pub use api::unmarshal_api;
pub use endpoint::unmarshal_endpoint;
pub use inbound::unmarshal_inbound;
pub use sequence::unmarshal_sequence;

/// Parsing or validation failure for a single artifact.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{file}:{line}: malformed XML: {reason}")]
    Xml {
        file: String,
        line: u64,
        reason: String,
    },

    #[error("{file}:{line}: {reason}")]
    Validation {
        file: String,
        line: u64,
        reason: String,
    },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Scans the artifact directory and deploys everything it finds.
pub struct Deployer {
    artifacts_dir: PathBuf,
    registry: Arc<ConfigRegistry>,
}

impl Deployer {
    pub fn new(artifacts_dir: impl Into<PathBuf>, registry: Arc<ConfigRegistry>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            registry,
        }
    }

    /// Run the full deployment pass.
    ///
    /// Sequences deploy first so inbounds can resolve them, then APIs (route
    /// registration), then inbounds (adapter spawn), then endpoints —
    /// endpoints may legally be referenced before they are deployed because
    /// `call` resolves them at execution time.
    pub fn deploy(
        &self,
        router: &mut RouterService,
        mediator: Arc<dyn InboundMessageMediator>,
        lifecycle: &Lifecycle,
    ) {
        for kind in ["Sequences", "APIs", "Inbounds", "Endpoints"] {
            let dir = self.artifacts_dir.join(kind);
            for (file_name, contents) in read_descriptors(&dir) {
                let position = Position::new(&file_name);
                match kind {
                    "Sequences" => self.deploy_sequence(&contents, position),
                    "APIs" => self.deploy_api(&contents, position, router),
                    "Inbounds" => {
                        self.deploy_inbound(&contents, position, &mediator, lifecycle)
                    }
                    "Endpoints" => self.deploy_endpoint(&contents, position),
                    _ => unreachable!(),
                }
            }
        }
    }

    fn deploy_sequence(&self, contents: &str, position: Position) {
        let file = position.file_name.clone();
        match sequence::unmarshal_sequence(contents, position) {
            Ok(seq) => {
                let name = seq.name.clone();
                match self.registry.register_sequence(seq) {
                    Ok(_) => info!(target: "flowgate::deployers", sequence = %name, "deployed sequence"),
                    Err(err) => error!(target: "flowgate::deployers", file = %file, error = %err, "skipping sequence"),
                }
            }
            Err(err) => {
                error!(target: "flowgate::deployers", error = %err, "error unmarshalling sequence")
            }
        }
    }

    fn deploy_api(&self, contents: &str, position: Position, router: &mut RouterService) {
        let file = position.file_name.clone();
        match api::unmarshal_api(contents, position) {
            Ok(parsed) => {
                let name = parsed.name.clone();
                let api = match self.registry.register_api(parsed) {
                    Ok(api) => api,
                    Err(err) => {
                        error!(target: "flowgate::deployers", file = %file, error = %err, "skipping API");
                        return;
                    }
                };
                match router.register_api(Arc::clone(&api)) {
                    Ok(()) => info!(target: "flowgate::deployers", api = %name, "deployed API"),
                    Err(err) => {
                        error!(target: "flowgate::deployers", file = %file, api = %name, error = %err, "failed to register API routes")
                    }
                }
            }
            Err(err) => error!(target: "flowgate::deployers", error = %err, "error unmarshalling API"),
        }
    }

    fn deploy_inbound(
        &self,
        contents: &str,
        position: Position,
        mediator: &Arc<dyn InboundMessageMediator>,
        lifecycle: &Lifecycle,
    ) {
        let file = position.file_name.clone();
        match inbound::unmarshal_inbound(contents, position) {
            Ok(parsed) => {
                let name = parsed.name.clone();
                let def = match self.registry.register_inbound(parsed) {
                    Ok(def) => def,
                    Err(err) => {
                        error!(target: "flowgate::deployers", file = %file, error = %err, "skipping inbound");
                        return;
                    }
                };
                info!(target: "flowgate::deployers", inbound = %name, "deployed inbound");
                if let Err(err) = crate::inbound::spawn_inbound(
                    def,
                    Arc::clone(&self.registry),
                    Arc::clone(mediator),
                    lifecycle,
                ) {
                    error!(target: "flowgate::deployers", file = %file, inbound = %name, error = %err, "failed to start inbound endpoint");
                }
            }
            Err(err) => {
                error!(target: "flowgate::deployers", error = %err, "error unmarshalling inbound")
            }
        }
    }

    fn deploy_endpoint(&self, contents: &str, position: Position) {
        let file = position.file_name.clone();
        match endpoint::unmarshal_endpoint(contents, position) {
            Ok(parsed) => {
                let name = parsed.name.clone();
                match self.registry.register_endpoint(parsed) {
                    Ok(_) => info!(target: "flowgate::deployers", endpoint = %name, "deployed endpoint"),
                    Err(err) => error!(target: "flowgate::deployers", file = %file, error = %err, "skipping endpoint"),
                }
            }
            Err(err) => {
                error!(target: "flowgate::deployers", error = %err, "error unmarshalling endpoint")
            }
        }
    }
}

/// All `*.xml` descriptors in a directory, in file-name order.
///
/// A missing directory is simply an empty kind, not an error.
fn read_descriptors(dir: &Path) -> Vec<(String, String)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            debug!(target: "flowgate::deployers", dir = %dir.display(), "artifact directory not present, skipping");
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".xml"))
        .collect();
    names.sort();

    names
        .into_iter()
        .filter_map(|name| {
            let path = dir.join(&name);
            match std::fs::read_to_string(&path) {
                Ok(contents) => Some((name, contents)),
                Err(err) => {
                    error!(target: "flowgate::deployers", path = %path.display(), error = %err, "error reading descriptor");
                    None
                }
            }
        })
        .collect()
}
