//! Inbound descriptor parsing.

use quick_xml::events::Event;

use super::xml::{XmlCursor, attr_value};
use super::DeployError;
use crate::artifacts::{InboundDef, Position};

/// Parse an `<inbound>` artifact with its `<parameters>` block.
pub fn unmarshal_inbound(xml: &str, position: Position) -> Result<InboundDef, DeployError> {
    let mut cursor = XmlCursor::new(xml, &position.file_name);

    let mut inbound = InboundDef {
        position: position.clone(),
        ..InboundDef::default()
    };

    loop {
        match cursor.next()? {
            Event::Start(element) | Event::Empty(element)
                if element.name().as_ref() == b"inbound" =>
            {
                inbound.name = attr_value(&element, "name")?.unwrap_or_default();
                inbound.sequence = attr_value(&element, "sequence")?.unwrap_or_default();
                inbound.protocol = attr_value(&element, "protocol")?.unwrap_or_default();
                inbound.suspend = attr_value(&element, "suspend")?;
                inbound.on_error = attr_value(&element, "onError")?;
                inbound.position.line_no = cursor.line();
                inbound.position.hierarchy = inbound.name.clone();
            }
            Event::Start(element) if element.name().as_ref() == b"parameters" => {
                parse_parameters(&mut cursor, &mut inbound)?;
            }
            Event::Start(other) => cursor.skip(&other)?,
            Event::Eof => break,
            _ => {}
        }
    }

    let validation = |reason: &str| DeployError::Validation {
        file: position.file_name.clone(),
        line: inbound.position.line_no,
        reason: reason.to_string(),
    };

    if inbound.name.is_empty() {
        return Err(validation("inbound name is required"));
    }
    if inbound.protocol.is_empty() {
        return Err(validation("inbound protocol is required"));
    }
    if inbound.sequence.is_empty() {
        return Err(validation("inbound sequence is required"));
    }

    Ok(inbound)
}

fn parse_parameters(
    cursor: &mut XmlCursor<'_>,
    inbound: &mut InboundDef,
) -> Result<(), DeployError> {
    loop {
        match cursor.next()? {
            Event::Start(element) if element.name().as_ref() == b"parameter" => {
                let name = attr_value(&element, "name")?.unwrap_or_default();
                let value = cursor.read_text(&element)?;
                if !name.is_empty() {
                    inbound.parameters.insert(name, value.trim().to_string());
                }
            }
            Event::Empty(element) if element.name().as_ref() == b"parameter" => {
                let name = attr_value(&element, "name")?.unwrap_or_default();
                if !name.is_empty() {
                    inbound.parameters.insert(name, String::new());
                }
            }
            Event::Start(other) => cursor.skip(&other)?,
            Event::End(end) if end.name().as_ref() == b"parameters" => break,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_inbound() {
        let inbound = unmarshal_inbound(
            r#"
<inbound name="file-source" sequence="FileSeq" protocol="file">
    <parameters>
        <parameter name="interval">1000</parameter>
        <parameter name="transport.vfs.FileURI">file:///var/spool/in</parameter>
        <parameter name="transport.vfs.ContentType">text/plain</parameter>
    </parameters>
</inbound>"#,
            Position::new("in.xml"),
        )
        .unwrap();

        assert_eq!(inbound.name, "file-source");
        assert_eq!(inbound.sequence, "FileSeq");
        assert_eq!(inbound.protocol, "file");
        assert_eq!(inbound.parameters.len(), 3);
        assert_eq!(
            inbound.parameters.get("interval").map(String::as_str),
            Some("1000")
        );
        assert_eq!(
            inbound
                .parameters
                .get("transport.vfs.FileURI")
                .map(String::as_str),
            Some("file:///var/spool/in")
        );
    }

    #[test]
    fn test_suspend_and_on_error_attributes() {
        let inbound = unmarshal_inbound(
            r#"<inbound name="n" sequence="s" protocol="http" suspend="false" onError="FaultSeq"/>"#,
            Position::new("in.xml"),
        )
        .unwrap();
        assert_eq!(inbound.suspend.as_deref(), Some("false"));
        assert_eq!(inbound.on_error.as_deref(), Some("FaultSeq"));
    }

    #[test]
    fn test_name_required() {
        let err = unmarshal_inbound(
            r#"<inbound sequence="s" protocol="file"/>"#,
            Position::new("in.xml"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("inbound name is required"));
    }

    #[test]
    fn test_protocol_required() {
        let err = unmarshal_inbound(
            r#"<inbound name="n" sequence="s"/>"#,
            Position::new("in.xml"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("protocol is required"));
    }

    #[test]
    fn test_sequence_required() {
        let err = unmarshal_inbound(
            r#"<inbound name="n" protocol="file"/>"#,
            Position::new("in.xml"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("sequence is required"));
    }

    #[test]
    fn test_parameter_values_trimmed() {
        let inbound = unmarshal_inbound(
            "<inbound name=\"n\" sequence=\"s\" protocol=\"file\">\n  <parameters>\n    <parameter name=\"interval\">\n      500\n    </parameter>\n  </parameters>\n</inbound>",
            Position::new("in.xml"),
        )
        .unwrap();
        assert_eq!(
            inbound.parameters.get("interval").map(String::as_str),
            Some("500")
        );
    }
}
