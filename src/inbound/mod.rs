//! Inbound adapters: message sources that dispatch into named sequences.
//!
//! The factory here maps an [`InboundDef`]'s protocol to its adapter
//! implementation and spawns it as a tracked worker, so process shutdown
//! waits for the adapter to wind down.

use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use crate::artifacts::InboundDef;
use crate::artifacts::inbound::{PROTOCOL_FILE, PROTOCOL_HTTP};
use crate::lifecycle::Lifecycle;
use crate::mediation::InboundMessageMediator;
use crate::registry::ConfigRegistry;

pub mod file;
pub mod fs;
pub mod http;

pub use file::{FileInbound, FileInboundSettings, LockRelease, PostAction};
pub use fs::{FileSystem, OsFileSystem};
pub use http::HttpInbound;

/// Adapter configuration and runtime failures.
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("missing required parameter: '{name}'")]
    MissingParameter { name: String },

    #[error("invalid {name} value: {reason}, got '{value}'")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("unsupported URI scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("no matching registered filesystem backend for scheme: {scheme}")]
    NoRegisteredBackend { scheme: String },

    #[error("invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("invalid protocol: expected '{expected}', got '{actual}'")]
    InvalidProtocol {
        expected: &'static str,
        actual: String,
    },

    #[error("inbound protocol not supported: {protocol}")]
    UnknownProtocol { protocol: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Construct the adapter for `def` and spawn it as a tracked worker.
///
/// Construction validates the configuration; a validation failure aborts
/// this adapter (the caller logs and moves on) without affecting the rest of
/// the deployment.
pub fn spawn_inbound(
    def: Arc<InboundDef>,
    registry: Arc<ConfigRegistry>,
    mediator: Arc<dyn InboundMessageMediator>,
    lifecycle: &Lifecycle,
) -> Result<(), InboundError> {
    match def.protocol.as_str() {
        PROTOCOL_FILE => {
            let adapter = FileInbound::new(&def, mediator, lifecycle.clone())?;
            let guard = lifecycle.track_worker();
            let token = lifecycle.token();
            let name = def.name.clone();
            tokio::spawn(async move {
                let _worker = guard;
                if let Err(err) = adapter.start(token).await {
                    error!(
                        target: "flowgate::inbound::file",
                        inbound = %name,
                        error = %err,
                        "file inbound endpoint stopped with error"
                    );
                }
            });
            Ok(())
        }
        PROTOCOL_HTTP => {
            let deployment = registry.deployment_config();
            let adapter = HttpInbound::new(&def, deployment.as_ref(), mediator)?;
            let guard = lifecycle.track_worker();
            let token = lifecycle.token();
            let name = def.name.clone();
            tokio::spawn(async move {
                let _worker = guard;
                if let Err(err) = adapter.start(token).await {
                    error!(
                        target: "flowgate::inbound::http",
                        inbound = %name,
                        error = %err,
                        "HTTP inbound endpoint stopped with error"
                    );
                }
            });
            Ok(())
        }
        other => Err(InboundError::UnknownProtocol {
            protocol: other.to_string(),
        }),
    }
}
