//! Shared streaming-XML plumbing for the artifact parsers.
//!
//! Artifact descriptors are read with a forward-only `quick-xml` reader, not
//! mapped through a DOM: unknown elements are skipped wholesale, and the
//! reader's byte position is translated to a line number whenever a nested
//! sequence or mediator is entered so its [`Position`] survives into
//! diagnostics.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::DeployError;
use crate::artifacts::Position;

/// A streaming reader over one descriptor file, tracking line numbers.
pub(crate) struct XmlCursor<'a> {
    reader: Reader<&'a [u8]>,
    source: &'a str,
    file_name: String,
}

impl<'a> XmlCursor<'a> {
    pub fn new(source: &'a str, file_name: &str) -> Self {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            source,
            file_name: file_name.to_string(),
        }
    }

    /// Next event, with malformed input mapped to a positioned error.
    pub fn next(&mut self) -> Result<Event<'a>, DeployError> {
        let line = self.line();
        self.reader.read_event().map_err(|err| DeployError::Xml {
            file: self.file_name.clone(),
            line,
            reason: err.to_string(),
        })
    }

    /// Line of the current reader position (1-based).
    pub fn line(&self) -> u64 {
        let pos = (self.reader.buffer_position() as usize).min(self.source.len());
        self.source[..pos].bytes().filter(|b| *b == b'\n').count() as u64 + 1
    }

    /// Skip an element and its whole subtree.
    pub fn skip(&mut self, start: &BytesStart<'a>) -> Result<(), DeployError> {
        let line = self.line();
        self.reader
            .read_to_end(start.name())
            .map(|_| ())
            .map_err(|err| DeployError::Xml {
                file: self.file_name.clone(),
                line,
                reason: err.to_string(),
            })
    }

    /// Collect the text content of the element just opened by `start`.
    pub fn read_text(&mut self, start: &BytesStart<'a>) -> Result<String, DeployError> {
        let line = self.line();
        self.reader
            .read_text(start.name())
            .map(|text| text.into_owned())
            .map_err(|err| DeployError::Xml {
                file: self.file_name.clone(),
                line,
                reason: err.to_string(),
            })
    }

    /// A position at the current line with the given hierarchy.
    pub fn position_here(&self, hierarchy: &Position) -> Position {
        hierarchy.at_line(self.line())
    }
}

/// Value of a named attribute on an element, unescaped.
pub(crate) fn attr_value(
    element: &BytesStart<'_>,
    name: &str,
) -> Result<Option<String>, DeployError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|err| DeployError::Xml {
            file: String::new(),
            line: 0,
            reason: err.to_string(),
        })?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            let value = attr.unescape_value().map_err(|err| DeployError::Xml {
                file: String::new(),
                line: 0,
                reason: err.to_string(),
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Split-and-trim a comma-separated attribute into non-empty entries.
pub(crate) fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(String::from)
        .collect()
}
