//! Mediation engine: executes named sequences on behalf of inbound adapters.
//!
//! Inbound adapters depend on the narrow [`InboundMessageMediator`] port
//! rather than the engine type so tests can substitute a recording mock.
//! Dispatch is awaited by the caller but runs under a tracked worker guard,
//! so process shutdown waits for in-flight mediation to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::lifecycle::Lifecycle;
use crate::message::MessageContext;
use crate::registry::ConfigRegistry;

/// Default end-to-end timeout for outbound calls made by mediators.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connect timeout for outbound calls made by mediators.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Failures surfaced to an inbound adapter for a single dispatched message.
///
/// All of these are per-message: the adapter logs and keeps running.
#[derive(Debug, Error)]
pub enum MediationError {
    #[error("sequence {name} not found")]
    SequenceNotFound { name: String },

    #[error("sequence {name} failed")]
    SequenceFailed { name: String },

    #[error("mediation cancelled")]
    Cancelled,
}

/// Ambient state handed to every mediator execution.
#[derive(Clone)]
pub struct MediationContext {
    pub registry: Arc<ConfigRegistry>,
    pub http: reqwest::Client,
    pub token: CancellationToken,
}

/// Port exposed by the core to inbound adapters.
#[async_trait]
pub trait InboundMessageMediator: Send + Sync {
    /// Run the named sequence against `msg`.
    ///
    /// An unknown sequence name is a non-fatal error: it is logged, the
    /// message is dropped, and the adapter carries on.
    async fn mediate_inbound(
        &self,
        token: CancellationToken,
        sequence_name: &str,
        msg: &mut MessageContext,
    ) -> Result<(), MediationError>;
}

/// The real mediation engine backed by the artifact registry.
pub struct MediationEngine {
    registry: Arc<ConfigRegistry>,
    http: reqwest::Client,
    lifecycle: Lifecycle,
}

impl MediationEngine {
    pub fn new(registry: Arc<ConfigRegistry>, lifecycle: Lifecycle) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_CALL_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            registry,
            http,
            lifecycle,
        }
    }

    /// Build the execution context for one dispatch.
    pub fn context(&self, token: CancellationToken) -> MediationContext {
        MediationContext {
            registry: Arc::clone(&self.registry),
            http: self.http.clone(),
            token,
        }
    }
}

#[async_trait]
impl InboundMessageMediator for MediationEngine {
    async fn mediate_inbound(
        &self,
        token: CancellationToken,
        sequence_name: &str,
        msg: &mut MessageContext,
    ) -> Result<(), MediationError> {
        if token.is_cancelled() {
            debug!(
                target: "flowgate::mediation",
                sequence = sequence_name,
                "mediation skipped, shutdown in progress"
            );
            return Err(MediationError::Cancelled);
        }

        let Some(sequence) = self.registry.get_sequence(sequence_name) else {
            error!(
                target: "flowgate::mediation",
                sequence = sequence_name,
                "sequence not found, dropping message"
            );
            return Err(MediationError::SequenceNotFound {
                name: sequence_name.to_string(),
            });
        };

        let _worker = self.lifecycle.track_worker();
        let ctx = self.context(token);
        if sequence.execute(msg, &ctx).await {
            Ok(())
        } else {
            Err(MediationError::SequenceFailed {
                name: sequence_name.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Mediator, Position, RespondMediator, Sequence};

    fn engine_with(sequence: Option<Sequence>) -> MediationEngine {
        let registry = Arc::new(ConfigRegistry::new());
        if let Some(sequence) = sequence {
            registry.register_sequence(sequence).unwrap();
        }
        MediationEngine::new(registry, Lifecycle::new())
    }

    fn respond_sequence(name: &str) -> Sequence {
        Sequence {
            name: name.to_string(),
            mediators: vec![Mediator::Respond(RespondMediator {
                position: Position::new("seq.xml"),
            })],
            position: Position::new("seq.xml"),
        }
    }

    #[tokio::test]
    async fn test_mediate_known_sequence() {
        let engine = engine_with(Some(respond_sequence("main")));
        let mut msg = MessageContext::new();

        engine
            .mediate_inbound(CancellationToken::new(), "main", &mut msg)
            .await
            .unwrap();
        assert!(msg.is_response_marked());
    }

    #[tokio::test]
    async fn test_unknown_sequence_is_nonfatal_error() {
        let engine = engine_with(None);
        let mut msg = MessageContext::new();

        let err = engine
            .mediate_inbound(CancellationToken::new(), "nope", &mut msg)
            .await
            .unwrap_err();
        assert!(matches!(err, MediationError::SequenceNotFound { name } if name == "nope"));
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let engine = engine_with(Some(respond_sequence("main")));
        let token = CancellationToken::new();
        token.cancel();

        let mut msg = MessageContext::new();
        let err = engine
            .mediate_inbound(token, "main", &mut msg)
            .await
            .unwrap_err();
        assert!(matches!(err, MediationError::Cancelled));
        assert!(!msg.is_response_marked());
    }
}
