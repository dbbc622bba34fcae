//! The closed set of mediators and their execution semantics.
//!
//! Mediators are a tagged enum with a single execution method rather than a
//! trait-object hierarchy: adding a mediator means adding a variant plus its
//! decoder, and existing variants stay untouched. Execution returns
//! `Ok(true)` to continue the chain, `Ok(false)` to stop it, and `Err` to
//! stop it with a diagnostic logged against the mediator's position.

use thiserror::Error;
use tracing::{debug, info};

use super::Position;
use crate::mediation::MediationContext;
use crate::message::{MessageContext, PROP_QUERY_PARAMS, PROP_URI_PARAMS};

/// Execution failures raised by individual mediators.
#[derive(Debug, Error)]
pub enum MediatorError {
    #[error("endpoint reference not provided in call mediator at {at}")]
    MissingEndpointRef { at: String },

    #[error("endpoint not found with reference: {name} at {at}")]
    EndpointNotFound { name: String, at: String },

    #[error("HTTP method not specified for endpoint: {name} at {at}")]
    MissingMethod { name: String, at: String },

    #[error("endpoint URL is empty for endpoint: {name} at {at}")]
    MissingUrl { name: String, at: String },

    #[error("unsupported URL scheme for endpoint {name}: {url}")]
    UnsupportedScheme { name: String, url: String },

    #[error("invalid HTTP method '{method}' for endpoint {name}")]
    InvalidMethod { name: String, method: String },

    #[error("call to endpoint {name} failed: {source}")]
    Transport {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("call cancelled")]
    Cancelled,
}

/// Diagnostic verbosity of a log mediator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogCategory {
    Debug,
    #[default]
    Info,
}

impl LogCategory {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("DEBUG") {
            LogCategory::Debug
        } else {
            LogCategory::Info
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Debug => "DEBUG",
            LogCategory::Info => "INFO",
        }
    }
}

/// Emits a diagnostic line plus a dump of payload and known properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogMediator {
    pub category: LogCategory,
    pub message: String,
    pub position: Position,
}

/// Marks the message context for reply to the originating client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RespondMediator {
    pub position: Position,
}

/// Synchronously invokes a named endpoint, replacing the payload and content
/// type with the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMediator {
    pub endpoint_ref: String,
    pub position: Position,
}

/// A single processing step in a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mediator {
    Log(LogMediator),
    Respond(RespondMediator),
    Call(CallMediator),
}

impl Mediator {
    pub fn position(&self) -> &Position {
        match self {
            Mediator::Log(m) => &m.position,
            Mediator::Respond(m) => &m.position,
            Mediator::Call(m) => &m.position,
        }
    }

    /// Execute this mediator against the message.
    pub async fn execute(
        &self,
        msg: &mut MessageContext,
        ctx: &MediationContext,
    ) -> Result<bool, MediatorError> {
        match self {
            Mediator::Log(m) => m.execute(msg),
            Mediator::Respond(m) => m.execute(msg),
            Mediator::Call(m) => m.execute(msg, ctx).await,
        }
    }
}

impl LogMediator {
    pub fn execute(&self, msg: &MessageContext) -> Result<bool, MediatorError> {
        self.emit(format!("{} : {}", self.category.as_str(), self.message));

        if !msg.message.raw_payload.is_empty() {
            self.emit(format!(
                "{} : payload: {}",
                self.category.as_str(),
                String::from_utf8_lossy(&msg.message.raw_payload)
            ));
        }

        match msg.string_map(PROP_URI_PARAMS) {
            Some(params) => {
                for (key, value) in &params {
                    self.emit(format!("{} : uriParam {key}: {value}", self.category.as_str()));
                }
            }
            None => self.emit(format!(
                "{} : uriParams not found in properties",
                self.category.as_str()
            )),
        }

        match msg.string_map(PROP_QUERY_PARAMS) {
            Some(params) => {
                for (key, value) in &params {
                    self.emit(format!("{} : queryParam {key}: {value}", self.category.as_str()));
                }
            }
            None => self.emit(format!(
                "{} : queryParams not found in properties",
                self.category.as_str()
            )),
        }

        Ok(true)
    }

    fn emit(&self, line: String) {
        match self.category {
            LogCategory::Debug => debug!(target: "flowgate::mediation", "{line}"),
            LogCategory::Info => info!(target: "flowgate::mediation", "{line}"),
        }
    }
}

impl RespondMediator {
    pub fn execute(&self, msg: &mut MessageContext) -> Result<bool, MediatorError> {
        msg.mark_response();
        debug!(target: "flowgate::mediation", "respond mediator");
        Ok(true)
    }
}

impl CallMediator {
    /// Resolve the endpoint from the registry and invoke it with the current
    /// payload. Transport success always continues the chain, regardless of
    /// the HTTP status returned; transport failure stops it.
    pub async fn execute(
        &self,
        msg: &mut MessageContext,
        ctx: &MediationContext,
    ) -> Result<bool, MediatorError> {
        if self.endpoint_ref.is_empty() {
            return Err(MediatorError::MissingEndpointRef {
                at: self.position.hierarchy.clone(),
            });
        }

        let endpoint = ctx.registry.get_endpoint(&self.endpoint_ref).ok_or_else(|| {
            MediatorError::EndpointNotFound {
                name: self.endpoint_ref.clone(),
                at: self.position.hierarchy.clone(),
            }
        })?;

        if endpoint.url.method.is_empty() {
            return Err(MediatorError::MissingMethod {
                name: self.endpoint_ref.clone(),
                at: self.position.hierarchy.clone(),
            });
        }
        let url = endpoint.url.uri_template.as_str();
        if url.is_empty() {
            return Err(MediatorError::MissingUrl {
                name: self.endpoint_ref.clone(),
                at: self.position.hierarchy.clone(),
            });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(MediatorError::UnsupportedScheme {
                name: self.endpoint_ref.clone(),
                url: url.to_string(),
            });
        }

        let method: reqwest::Method =
            endpoint
                .url
                .method
                .parse()
                .map_err(|_| MediatorError::InvalidMethod {
                    name: self.endpoint_ref.clone(),
                    method: endpoint.url.method.clone(),
                })?;

        let mut request = ctx
            .http
            .request(method, url)
            .body(msg.message.raw_payload.clone());
        if !msg.message.content_type.is_empty() {
            request = request.header(
                reqwest::header::CONTENT_TYPE,
                msg.message.content_type.as_str(),
            );
        }

        debug!(
            target: "flowgate::mediation",
            endpoint = %self.endpoint_ref,
            url,
            "invoking endpoint"
        );

        let response = tokio::select! {
            _ = ctx.token.cancelled() => return Err(MediatorError::Cancelled),
            result = request.send() => result.map_err(|source| MediatorError::Transport {
                name: self.endpoint_ref.clone(),
                source,
            })?,
        };

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|source| MediatorError::Transport {
                name: self.endpoint_ref.clone(),
                source,
            })?;

        msg.message.raw_payload = body;
        msg.message.content_type = content_type;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_category_parse() {
        assert_eq!(LogCategory::parse("DEBUG"), LogCategory::Debug);
        assert_eq!(LogCategory::parse("debug"), LogCategory::Debug);
        assert_eq!(LogCategory::parse("INFO"), LogCategory::Info);
        assert_eq!(LogCategory::parse(""), LogCategory::Info);
        assert_eq!(LogCategory::parse("FULL"), LogCategory::Info);
    }

    #[test]
    fn test_log_mediator_always_continues() {
        let mediator = LogMediator {
            category: LogCategory::Info,
            message: "processing order".to_string(),
            position: Position::new("seq.xml"),
        };

        let mut msg = MessageContext::new();
        msg.message.raw_payload = bytes::Bytes::from_static(b"{\"id\":1}");
        msg.set_string_map(PROP_URI_PARAMS, HashMap::from([("id".to_string(), "1".to_string())]));

        assert!(mediator.execute(&msg).unwrap());
    }

    #[test]
    fn test_respond_mediator_sets_flag() {
        let mediator = RespondMediator {
            position: Position::new("seq.xml"),
        };
        let mut msg = MessageContext::new();

        assert!(mediator.execute(&mut msg).unwrap());
        assert!(msg.is_response_marked());
    }
}
