//! Inbound endpoint definitions.

use std::collections::HashMap;

use super::Position;

/// Inbound protocol identifier for the dedicated HTTP listener.
pub const PROTOCOL_HTTP: &str = "http";
/// Inbound protocol identifier for the polled file source.
pub const PROTOCOL_FILE: &str = "file";

/// Declarative definition of a message source.
///
/// The adapter implementation is chosen by `protocol`; everything
/// protocol-specific rides in `parameters` and is validated by the adapter
/// before it starts.
#[derive(Debug, Clone, Default)]
pub struct InboundDef {
    pub name: String,
    /// Name of the sequence each produced message is dispatched to.
    pub sequence: String,
    pub protocol: String,
    pub suspend: Option<String>,
    pub on_error: Option<String>,
    pub parameters: HashMap<String, String>,
    pub position: Position,
}
