//! Endpoint descriptor parsing.

use quick_xml::events::Event;

use super::xml::{XmlCursor, attr_value};
use super::DeployError;
use crate::artifacts::{Endpoint, EndpointUrl, Position};

/// Parse an `<endpoint name="..."><http method="..." uri-template="..."/></endpoint>`
/// artifact.
pub fn unmarshal_endpoint(xml: &str, position: Position) -> Result<Endpoint, DeployError> {
    let mut cursor = XmlCursor::new(xml, &position.file_name);

    let mut endpoint = Endpoint {
        position: position.clone(),
        ..Endpoint::default()
    };

    loop {
        match cursor.next()? {
            Event::Start(element) if element.name().as_ref() == b"endpoint" => {
                endpoint.name = attr_value(&element, "name")?.unwrap_or_default();
                endpoint.position.line_no = cursor.line();
                endpoint.position.hierarchy = endpoint.name.clone();
            }
            Event::Start(element) if element.name().as_ref() == b"http" => {
                endpoint.url = parse_http_url(&element)?;
                cursor.skip(&element)?;
            }
            Event::Empty(element) if element.name().as_ref() == b"http" => {
                endpoint.url = parse_http_url(&element)?;
            }
            Event::Start(other) => cursor.skip(&other)?,
            Event::Eof => break,
            _ => {}
        }
    }

    if endpoint.name.is_empty() {
        return Err(DeployError::Validation {
            file: position.file_name,
            line: cursor.line(),
            reason: "endpoint name is required".to_string(),
        });
    }

    Ok(endpoint)
}

fn parse_http_url(
    element: &quick_xml::events::BytesStart<'_>,
) -> Result<EndpointUrl, DeployError> {
    Ok(EndpointUrl {
        method: attr_value(element, "method")?.unwrap_or_default(),
        uri_template: attr_value(element, "uri-template")?.unwrap_or_default(),
    })
}
