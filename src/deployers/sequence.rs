//! Sequence descriptor parsing, shared by the standalone `<sequence>`
//! artifact and the anonymous sequences nested inside API resources.

use quick_xml::events::Event;

use super::xml::{XmlCursor, attr_value};
use super::DeployError;
use crate::artifacts::{
    CallMediator, LogCategory, LogMediator, Mediator, Position, RespondMediator, Sequence,
};

/// Parse a named top-level `<sequence name="...">...</sequence>` artifact.
pub fn unmarshal_sequence(xml: &str, position: Position) -> Result<Sequence, DeployError> {
    let mut cursor = XmlCursor::new(xml, &position.file_name);

    loop {
        match cursor.next()? {
            Event::Start(element) if element.name().as_ref() == b"sequence" => {
                let name = attr_value(&element, "name")?.unwrap_or_default();
                if name.is_empty() {
                    return Err(DeployError::Validation {
                        file: position.file_name.clone(),
                        line: cursor.line(),
                        reason: "sequence name is required".to_string(),
                    });
                }
                let seq_position = Position {
                    file_name: position.file_name.clone(),
                    line_no: cursor.line(),
                    hierarchy: name.clone(),
                };
                let mediators = parse_mediators(&mut cursor, b"sequence", &seq_position)?;
                return Ok(Sequence {
                    name,
                    mediators,
                    position: seq_position,
                });
            }
            Event::Start(other) => cursor.skip(&other)?,
            Event::Eof => {
                return Err(DeployError::Validation {
                    file: position.file_name.clone(),
                    line: cursor.line(),
                    reason: "no <sequence> element found".to_string(),
                });
            }
            _ => {}
        }
    }
}

/// Parse mediator elements until the closing tag named `until`.
///
/// Recognized mediators are `<log>`, `<respond>` and `<call>`; anything else
/// is skipped together with its subtree. The current input line is captured
/// when each mediator is entered.
pub(crate) fn parse_mediators(
    cursor: &mut XmlCursor<'_>,
    until: &[u8],
    base: &Position,
) -> Result<Vec<Mediator>, DeployError> {
    let mut mediators = Vec::new();

    loop {
        match cursor.next()? {
            Event::Start(element) => {
                if let Some(mediator) = mediator_from_start(cursor, &element, base)? {
                    mediators.push(mediator);
                }
            }
            Event::Empty(element) => {
                if let Some(mediator) = mediator_from_empty(cursor, &element, base)? {
                    mediators.push(mediator);
                }
            }
            Event::End(end) if end.name().as_ref() == until => break,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(mediators)
}

/// Decode a mediator from a start element, or skip it if unrecognized.
pub(crate) fn mediator_from_start<'a>(
    cursor: &mut XmlCursor<'a>,
    element: &quick_xml::events::BytesStart<'a>,
    base: &Position,
) -> Result<Option<Mediator>, DeployError> {
    let line = cursor.line();
    match element.name().as_ref() {
        b"log" => {
            let category = attr_value(element, "category")?
                .map(|v| LogCategory::parse(&v))
                .unwrap_or_default();
            let message = parse_log_body(cursor)?;
            Ok(Some(Mediator::Log(LogMediator {
                category,
                message,
                position: base.descend("log").at_line(line),
            })))
        }
        b"respond" => {
            cursor.skip(element)?;
            Ok(Some(Mediator::Respond(RespondMediator {
                position: base.descend("respond").at_line(line),
            })))
        }
        b"call" => {
            let endpoint_ref = parse_call_body(cursor)?;
            Ok(Some(Mediator::Call(CallMediator {
                endpoint_ref,
                position: base.descend("call").at_line(line),
            })))
        }
        _ => {
            cursor.skip(element)?;
            Ok(None)
        }
    }
}

/// Decode a mediator from a self-closing element, if recognized.
pub(crate) fn mediator_from_empty(
    cursor: &mut XmlCursor<'_>,
    element: &quick_xml::events::BytesStart<'_>,
    base: &Position,
) -> Result<Option<Mediator>, DeployError> {
    let line = cursor.line();
    match element.name().as_ref() {
        b"log" => {
            let category = attr_value(element, "category")?
                .map(|v| LogCategory::parse(&v))
                .unwrap_or_default();
            Ok(Some(Mediator::Log(LogMediator {
                category,
                message: String::new(),
                position: base.descend("log").at_line(line),
            })))
        }
        b"respond" => Ok(Some(Mediator::Respond(RespondMediator {
            position: base.descend("respond").at_line(line),
        }))),
        b"call" => Ok(Some(Mediator::Call(CallMediator {
            endpoint_ref: String::new(),
            position: base.descend("call").at_line(line),
        }))),
        _ => Ok(None),
    }
}

/// `<log>` body: an optional `<message>` child with text content.
fn parse_log_body(cursor: &mut XmlCursor<'_>) -> Result<String, DeployError> {
    let mut message = String::new();
    loop {
        match cursor.next()? {
            Event::Start(element) if element.name().as_ref() == b"message" => {
                message = cursor.read_text(&element)?;
            }
            Event::Start(other) => cursor.skip(&other)?,
            Event::End(end) if end.name().as_ref() == b"log" => break,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(message)
}

/// `<call>` body: an `<endpoint key="..."/>` child naming the target.
fn parse_call_body(cursor: &mut XmlCursor<'_>) -> Result<String, DeployError> {
    let mut endpoint_ref = String::new();
    loop {
        match cursor.next()? {
            Event::Empty(element) if element.name().as_ref() == b"endpoint" => {
                if let Some(key) = attr_value(&element, "key")? {
                    endpoint_ref = key;
                }
            }
            Event::Start(element) if element.name().as_ref() == b"endpoint" => {
                if let Some(key) = attr_value(&element, "key")? {
                    endpoint_ref = key;
                }
                cursor.skip(&element)?;
            }
            Event::Start(other) => cursor.skip(&other)?,
            Event::End(end) if end.name().as_ref() == b"call" => break,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(endpoint_ref)
}
