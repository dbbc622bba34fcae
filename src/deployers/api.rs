//! API descriptor parsing.
//!
//! An `<api>` element carries its routing attributes, an optional `<cors>`
//! element, and one `<resource>` per route. Resources accept their in- and
//! fault-sequences either as mediators placed directly under
//! `<inSequence>`/`<faultSequence>` (flat form) or wrapped in a nested
//! `<sequence>` element; both forms occur in the wild and both are kept.

use quick_xml::events::{BytesStart, Event};

use super::sequence::{mediator_from_empty, mediator_from_start, parse_mediators};
use super::xml::{XmlCursor, attr_value, split_csv};
use super::DeployError;
use crate::artifacts::cors::DEFAULT_MAX_AGE_SECS;
use crate::artifacts::{Api, CorsConfig, Position, Resource, Sequence, UriTemplateInfo, VersionType};

const KNOWN_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Parse and validate an `<api>` artifact.
pub fn unmarshal_api(xml: &str, position: Position) -> Result<Api, DeployError> {
    let mut cursor = XmlCursor::new(xml, &position.file_name);

    let mut api = Api {
        position: position.clone(),
        ..Api::default()
    };
    let mut version_type_raw: Option<String> = None;
    let mut api_line = 1;

    loop {
        match cursor.next()? {
            Event::Start(element) if element.name().as_ref() == b"api" => {
                api_line = cursor.line();
                api.context = attr_value(&element, "context")?.unwrap_or_default();
                api.name = attr_value(&element, "name")?.unwrap_or_default();
                api.version = attr_value(&element, "version")?.filter(|v| !v.is_empty());
                version_type_raw = attr_value(&element, "version-type")?.filter(|v| !v.is_empty());
                api.position.line_no = api_line;
                api.position.hierarchy = api.name.clone();
            }
            Event::Start(element) if element.name().as_ref() == b"resource" => {
                let resource = parse_resource(&mut cursor, &element, &api.position)?;
                api.resources.push(resource);
            }
            Event::Empty(element) if element.name().as_ref() == b"resource" => {
                let resource = parse_resource_attrs(&cursor, &element, &api.position)?;
                api.resources.push(resource);
            }
            Event::Start(element) if element.name().as_ref() == b"cors" => {
                api.cors = parse_cors(&element)?;
                cursor.skip(&element)?;
            }
            Event::Empty(element) if element.name().as_ref() == b"cors" => {
                api.cors = parse_cors(&element)?;
            }
            Event::Start(other) => cursor.skip(&other)?,
            Event::Eof => break,
            _ => {}
        }
    }

    let validation = |reason: String| DeployError::Validation {
        file: position.file_name.clone(),
        line: api_line,
        reason,
    };

    if api.context.is_empty() {
        return Err(validation("API context is required".to_string()));
    }
    if !api.context.starts_with('/') {
        return Err(validation(
            "API context must begin with '/' character".to_string(),
        ));
    }
    if api.name.is_empty() {
        return Err(validation("API name is required".to_string()));
    }
    match (&api.version, &version_type_raw) {
        (Some(_), Some(raw)) => match VersionType::parse(raw) {
            Some(version_type) => api.version_type = Some(version_type),
            None => {
                return Err(validation(format!(
                    "version-type must be either 'context' or 'url', got: {raw}"
                )));
            }
        },
        (None, None) => {}
        _ => {
            return Err(validation(
                "both version and version-type must be specified together".to_string(),
            ));
        }
    }

    Ok(api)
}

/// Decode the attributes of a `<resource>` element.
fn parse_resource_attrs(
    cursor: &XmlCursor<'_>,
    element: &BytesStart<'_>,
    api_position: &Position,
) -> Result<Resource, DeployError> {
    let line = cursor.line();
    let mut resource = Resource::default();

    if let Some(methods) = attr_value(element, "methods")? {
        for method in methods.split_whitespace() {
            let method = method.to_ascii_uppercase();
            if !KNOWN_METHODS.contains(&method.as_str()) {
                return Err(DeployError::Validation {
                    file: api_position.file_name.clone(),
                    line,
                    reason: format!("unsupported HTTP method '{method}' in resource"),
                });
            }
            resource.methods.push(method);
        }
    }

    if let Some(template) = attr_value(element, "uri-template")? {
        resource.uri_template =
            UriTemplateInfo::parse(&template).map_err(|err| DeployError::Validation {
                file: api_position.file_name.clone(),
                line,
                reason: format!("invalid URI template '{template}': {err}"),
            })?;
    }

    Ok(resource)
}

/// Decode a full `<resource>` element including its sequences.
fn parse_resource(
    cursor: &mut XmlCursor<'_>,
    element: &BytesStart<'_>,
    api_position: &Position,
) -> Result<Resource, DeployError> {
    let mut resource = parse_resource_attrs(cursor, element, api_position)?;
    let resource_position = api_position.descend(&resource.uri_template.full_template);

    loop {
        match cursor.next()? {
            Event::Start(child) if matches!(child.name().as_ref(), b"inSequence" | b"faultSequence")
                => {
                let slot = child.name().as_ref().to_vec();
                let slot_name = String::from_utf8_lossy(&slot).into_owned();
                let seq = parse_slot_sequence(cursor, &slot, &resource_position.descend(&slot_name))?;
                if slot == b"inSequence" {
                    resource.in_sequence = seq;
                } else {
                    resource.fault_sequence = seq;
                }
            }
            Event::Empty(child)
                if matches!(child.name().as_ref(), b"inSequence" | b"faultSequence") => {}
            Event::Start(other) => cursor.skip(&other)?,
            Event::End(end) if end.name().as_ref() == b"resource" => break,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(resource)
}

/// Decode the contents of an `<inSequence>`/`<faultSequence>` slot.
///
/// The first meaningful child decides the form: a `<sequence>` element means
/// the nested form (its mediators become the slot's sequence and anything
/// after it is ignored); any mediator element means the flat form.
fn parse_slot_sequence(
    cursor: &mut XmlCursor<'_>,
    slot: &[u8],
    position: &Position,
) -> Result<Sequence, DeployError> {
    let position = cursor.position_here(position);

    loop {
        match cursor.next()? {
            Event::Start(element) if element.name().as_ref() == b"sequence" => {
                let nested_position = cursor.position_here(&position.descend("sequence"));
                let mediators = parse_mediators(cursor, b"sequence", &nested_position)?;
                consume_until_end(cursor, slot)?;
                return Ok(Sequence {
                    name: String::new(),
                    mediators,
                    position: nested_position,
                });
            }
            Event::Start(element) => {
                let mut mediators = Vec::new();
                if let Some(mediator) = mediator_from_start(cursor, &element, &position)? {
                    mediators.push(mediator);
                }
                mediators.extend(parse_mediators(cursor, slot, &position)?);
                return Ok(Sequence {
                    name: String::new(),
                    mediators,
                    position,
                });
            }
            Event::Empty(element) => {
                let mut mediators = Vec::new();
                if let Some(mediator) = mediator_from_empty(cursor, &element, &position)? {
                    mediators.push(mediator);
                }
                mediators.extend(parse_mediators(cursor, slot, &position)?);
                return Ok(Sequence {
                    name: String::new(),
                    mediators,
                    position,
                });
            }
            Event::End(end) if end.name().as_ref() == slot => {
                return Ok(Sequence {
                    name: String::new(),
                    mediators: Vec::new(),
                    position,
                });
            }
            Event::Eof => {
                return Ok(Sequence {
                    name: String::new(),
                    mediators: Vec::new(),
                    position,
                });
            }
            _ => {}
        }
    }
}

fn consume_until_end(cursor: &mut XmlCursor<'_>, tag: &[u8]) -> Result<(), DeployError> {
    loop {
        match cursor.next()? {
            Event::Start(element) => cursor.skip(&element)?,
            Event::End(end) if end.name().as_ref() == tag => return Ok(()),
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

/// Attribute-driven CORS parsing. Comma-separated attributes are split and
/// trimmed; a bad `max-age` falls back to the default.
fn parse_cors(element: &BytesStart<'_>) -> Result<CorsConfig, DeployError> {
    let mut cors = CorsConfig::default();

    if let Some(enabled) = attr_value(element, "enabled")? {
        cors.enabled = enabled == "true";
    }
    if let Some(origins) = attr_value(element, "allow-origins")? {
        cors.allow_origins = split_csv(&origins);
    }
    if let Some(methods) = attr_value(element, "allow-methods")? {
        cors.allow_methods = split_csv(&methods);
    }
    if let Some(headers) = attr_value(element, "allow-headers")? {
        cors.allow_headers = split_csv(&headers);
    }
    if let Some(expose) = attr_value(element, "expose-headers")? {
        cors.expose_headers = split_csv(&expose);
    }
    if let Some(credentials) = attr_value(element, "allow-credentials")? {
        cors.allow_credentials = credentials == "true";
    }
    if let Some(max_age) = attr_value(element, "max-age")? {
        cors.max_age_secs = max_age.parse().unwrap_or(DEFAULT_MAX_AGE_SECS);
    }

    Ok(cors)
}
