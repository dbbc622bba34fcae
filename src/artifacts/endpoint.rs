//! Named outbound endpoints used by the call mediator.

use super::Position;

/// HTTP target of an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointUrl {
    pub method: String,
    pub uri_template: String,
}

/// A named outbound target.
///
/// Endpoints are looked up by name from the registry at mediator execution
/// time, not at deployment time, so a `call` may reference an endpoint that
/// is deployed later in the scan.
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    pub name: String,
    pub url: EndpointUrl,
    pub position: Position,
}
