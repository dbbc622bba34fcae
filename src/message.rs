//! The per-message carrier threaded through a mediation chain.
//!
//! A [`MessageContext`] is created by an inbound adapter (HTTP router, file
//! poller), mutated in place by each mediator in the chain, and dropped when
//! the chain finishes. It is owned by exactly one chain at a time and is
//! never shared across chains.

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::Value;

/// Reserved property key: map of path parameter name to matched value.
pub const PROP_URI_PARAMS: &str = "uriParams";
/// Reserved property key: map of declared query variable name to value.
pub const PROP_QUERY_PARAMS: &str = "queryParams";
/// Reserved property key set by inbound adapters on generated messages.
pub const PROP_IS_INBOUND: &str = "isInbound";
/// Reserved property key naming the artifact that produced the message.
pub const PROP_ARTIFACT_NAME: &str = "ARTIFACT_NAME";
/// Reserved property key naming the inbound endpoint kind.
pub const PROP_INBOUND_ENDPOINT_NAME: &str = "inboundEndpointName";
/// Reserved property key marking non-blocking client dispatch.
pub const PROP_CLIENT_API_NON_BLOCKING: &str = "ClientApiNonBlocking";

/// Reserved header set by the respond mediator. When present with the value
/// `"true"` the inbound adapter writes the current payload back to the
/// client.
pub const HEADER_HTTP_RESPONSE: &str = "http-response";

/// Payload portion of a message: raw bytes plus the declared content type.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub raw_payload: Bytes,
    pub content_type: String,
}

/// Mutable per-message state passed through a mediator chain.
///
/// `properties` is deliberately untyped (`serde_json::Value`) so that
/// heterogeneous per-stage data (path-parameter maps, inbound source flags)
/// can ride along without the core model knowing about every producer.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    pub message: Message,
    pub headers: HashMap<String, String>,
    pub properties: HashMap<String, Value>,
}

impl MessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a string-to-string map under a property key.
    pub fn set_string_map(&mut self, key: &str, map: HashMap<String, String>) {
        let object: serde_json::Map<String, Value> = map
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        self.properties.insert(key.to_string(), Value::Object(object));
    }

    /// Read back a string-to-string map property, if present and well formed.
    pub fn string_map(&self, key: &str) -> Option<HashMap<String, String>> {
        let Value::Object(object) = self.properties.get(key)? else {
            return None;
        };
        Some(
            object
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
        )
    }

    /// True once a respond mediator has marked this message for reply.
    pub fn is_response_marked(&self) -> bool {
        self.headers
            .get(HEADER_HTTP_RESPONSE)
            .is_some_and(|v| v == "true")
    }

    /// Mark the message for reply to the originating client.
    pub fn mark_response(&mut self) {
        self.headers
            .insert(HEADER_HTTP_RESPONSE.to_string(), "true".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_empty() {
        let msg = MessageContext::new();
        assert!(msg.message.raw_payload.is_empty());
        assert!(msg.message.content_type.is_empty());
        assert!(msg.headers.is_empty());
        assert!(msg.properties.is_empty());
        assert!(!msg.is_response_marked());
    }

    #[test]
    fn test_response_marking() {
        let mut msg = MessageContext::new();
        assert!(!msg.is_response_marked());

        msg.mark_response();
        assert!(msg.is_response_marked());
        assert_eq!(msg.headers.get(HEADER_HTTP_RESPONSE).map(String::as_str), Some("true"));
    }

    #[test]
    fn test_response_flag_requires_true_value() {
        let mut msg = MessageContext::new();
        msg.headers
            .insert(HEADER_HTTP_RESPONSE.to_string(), "false".to_string());
        assert!(!msg.is_response_marked());
    }

    #[test]
    fn test_string_map_round_trip() {
        let mut msg = MessageContext::new();
        let mut params = HashMap::new();
        params.insert("id".to_string(), "42".to_string());
        params.insert("name".to_string(), "widget".to_string());

        msg.set_string_map(PROP_URI_PARAMS, params.clone());
        assert_eq!(msg.string_map(PROP_URI_PARAMS), Some(params));
    }

    #[test]
    fn test_string_map_absent_key() {
        let msg = MessageContext::new();
        assert!(msg.string_map(PROP_QUERY_PARAMS).is_none());
    }

    #[test]
    fn test_string_map_non_object_property() {
        let mut msg = MessageContext::new();
        msg.properties
            .insert("flag".to_string(), Value::String("true".to_string()));
        assert!(msg.string_map("flag").is_none());
    }
}
