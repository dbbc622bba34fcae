//! Dedicated HTTP inbound endpoint (`protocol="http"`).
//!
//! Unlike the shared router, an HTTP inbound owns its own listener on
//! `inbound.http.port` (shifted by the deployment offset) and funnels every
//! request, regardless of path, into one configured sequence.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::InboundError;
use crate::artifacts::InboundDef;
use crate::artifacts::inbound::PROTOCOL_HTTP;
use crate::config::DeploymentConfig;
use crate::mediation::InboundMessageMediator;
use crate::message::MessageContext;
use crate::router::SHUTDOWN_TIMEOUT;

const PARAM_HTTP_PORT: &str = "inbound.http.port";

pub struct HttpInbound {
    name: String,
    sequence_name: String,
    addr: String,
    mediator: Arc<dyn InboundMessageMediator>,
}

impl std::fmt::Debug for HttpInbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpInbound")
            .field("name", &self.name)
            .field("sequence_name", &self.sequence_name)
            .field("addr", &self.addr)
            .field("mediator", &"<dyn InboundMessageMediator>")
            .finish()
    }
}

impl HttpInbound {
    pub fn new(
        def: &InboundDef,
        deployment: Option<&DeploymentConfig>,
        mediator: Arc<dyn InboundMessageMediator>,
    ) -> Result<Self, InboundError> {
        if def.protocol != PROTOCOL_HTTP {
            return Err(InboundError::InvalidProtocol {
                expected: PROTOCOL_HTTP,
                actual: def.protocol.clone(),
            });
        }

        let raw_port = def
            .parameters
            .get(PARAM_HTTP_PORT)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| InboundError::MissingParameter {
                name: PARAM_HTTP_PORT.to_string(),
            })?;
        let base_port: u16 = raw_port.parse().map_err(|_| InboundError::InvalidParameter {
            name: PARAM_HTTP_PORT.to_string(),
            value: raw_port.clone(),
            reason: "must be a port number".to_string(),
        })?;

        // The deployment config is validated at startup; a missing one just
        // means defaults.
        let offset = deployment
            .and_then(|d| d.offset().ok())
            .unwrap_or(0);
        let port = base_port.saturating_add(offset);
        let hostname = deployment
            .map(|d| d.server.hostname.clone())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());

        Ok(Self {
            name: def.name.clone(),
            sequence_name: def.sequence.clone(),
            addr: format!("{hostname}:{port}"),
            mediator,
        })
    }

    /// Serve until cancellation, then drain within the shutdown window.
    pub async fn start(self, token: CancellationToken) -> Result<(), InboundError> {
        if token.is_cancelled() {
            return Ok(());
        }

        let mediator = Arc::clone(&self.mediator);
        let sequence_name = self.sequence_name.clone();
        let dispatch_token = token.clone();
        let app = Router::new().fallback(move |headers: HeaderMap, body: Bytes| {
            let mediator = Arc::clone(&mediator);
            let sequence_name = sequence_name.clone();
            let token = dispatch_token.clone();
            async move { dispatch(mediator, sequence_name, token, headers, body).await }
        });

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!(
            target: "flowgate::inbound::http",
            inbound = %self.name,
            address = %self.addr,
            "starting HTTP inbound listener"
        );

        let shutdown_token = token.clone();
        let serve = async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                })
                .await
        };

        tokio::select! {
            result = serve => {
                if let Err(err) = result {
                    error!(
                        target: "flowgate::inbound::http",
                        inbound = %self.name,
                        error = %err,
                        "HTTP inbound listener error"
                    );
                }
            }
            _ = async {
                token.cancelled().await;
                tokio::time::sleep(SHUTDOWN_TIMEOUT).await;
            } => {
                warn!(
                    target: "flowgate::inbound::http",
                    inbound = %self.name,
                    "HTTP inbound drain timeout exceeded, forcing stop"
                );
            }
        }

        info!(
            target: "flowgate::inbound::http",
            inbound = %self.name,
            "HTTP inbound server shut down"
        );
        Ok(())
    }
}

async fn dispatch(
    mediator: Arc<dyn InboundMessageMediator>,
    sequence_name: String,
    token: CancellationToken,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut msg = MessageContext::new();
    msg.message.raw_payload = body;
    msg.message.content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if let Err(err) = mediator
        .mediate_inbound(token, &sequence_name, &mut msg)
        .await
    {
        error!(
            target: "flowgate::inbound::http",
            sequence = %sequence_name,
            error = %err,
            "error mediating inbound message"
        );
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }

    if msg.is_response_marked() {
        (
            StatusCode::OK,
            [(CONTENT_TYPE, "application/json")],
            r#"{"message": "Inbound mediation successful"}"#,
        )
            .into_response()
    } else {
        StatusCode::ACCEPTED.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::mediation::MediationError;
    use async_trait::async_trait;

    struct NullMediator;

    #[async_trait]
    impl InboundMessageMediator for NullMediator {
        async fn mediate_inbound(
            &self,
            _token: CancellationToken,
            _sequence_name: &str,
            msg: &mut MessageContext,
        ) -> Result<(), MediationError> {
            msg.mark_response();
            Ok(())
        }
    }

    fn def(parameters: &[(&str, &str)]) -> InboundDef {
        InboundDef {
            name: "http-in".to_string(),
            sequence: "Seq".to_string(),
            protocol: "http".to_string(),
            parameters: parameters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..InboundDef::default()
        }
    }

    fn deployment(hostname: &str, offset: Option<&str>) -> DeploymentConfig {
        DeploymentConfig {
            server: ServerConfig {
                hostname: hostname.to_string(),
                offset: offset.map(String::from),
            },
        }
    }

    #[test]
    fn test_port_required() {
        let err = HttpInbound::new(&def(&[]), None, Arc::new(NullMediator)).unwrap_err();
        assert!(matches!(err, InboundError::MissingParameter { .. }));
    }

    #[test]
    fn test_bad_port_rejected() {
        let err = HttpInbound::new(
            &def(&[(PARAM_HTTP_PORT, "eighty")]),
            None,
            Arc::new(NullMediator),
        )
        .unwrap_err();
        assert!(matches!(err, InboundError::InvalidParameter { .. }));
    }

    #[test]
    fn test_offset_applied() {
        let inbound = HttpInbound::new(
            &def(&[(PARAM_HTTP_PORT, "9000")]),
            Some(&deployment("localhost", Some("5"))),
            Arc::new(NullMediator),
        )
        .unwrap();
        assert_eq!(inbound.addr, "localhost:9005");
    }

    #[test]
    fn test_missing_deployment_defaults() {
        let inbound = HttpInbound::new(
            &def(&[(PARAM_HTTP_PORT, "9000")]),
            None,
            Arc::new(NullMediator),
        )
        .unwrap();
        assert_eq!(inbound.addr, "0.0.0.0:9000");
    }

    #[tokio::test]
    async fn test_dispatch_with_respond() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "text/plain".parse().unwrap());

        let response = dispatch(
            Arc::new(NullMediator),
            "Seq".to_string(),
            CancellationToken::new(),
            headers,
            Bytes::from_static(b"hi"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dispatch_without_respond() {
        struct SilentMediator;

        #[async_trait]
        impl InboundMessageMediator for SilentMediator {
            async fn mediate_inbound(
                &self,
                _token: CancellationToken,
                _sequence_name: &str,
                _msg: &mut MessageContext,
            ) -> Result<(), MediationError> {
                Ok(())
            }
        }

        let response = dispatch(
            Arc::new(SilentMediator),
            "Seq".to_string(),
            CancellationToken::new(),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_dispatch_mediation_error() {
        struct FailingMediator;

        #[async_trait]
        impl InboundMessageMediator for FailingMediator {
            async fn mediate_inbound(
                &self,
                _token: CancellationToken,
                sequence_name: &str,
                _msg: &mut MessageContext,
            ) -> Result<(), MediationError> {
                Err(MediationError::SequenceNotFound {
                    name: sequence_name.to_string(),
                })
            }
        }

        let response = dispatch(
            Arc::new(FailingMediator),
            "Seq".to_string(),
            CancellationToken::new(),
            HeaderMap::new(),
            Bytes::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
