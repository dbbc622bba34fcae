//! Typed in-memory representation of deployable artifacts.
//!
//! APIs, Resources, Endpoints, Sequences, Mediators and Inbounds are parsed
//! from XML descriptors at startup (see [`crate::deployers`]) and live,
//! immutable, in the [`crate::registry::ConfigRegistry`] for the rest of the
//! process lifetime. Every artifact carries a [`Position`] so diagnostics can
//! name the file and line it came from.

pub mod api;
pub mod cors;
pub mod endpoint;
pub mod inbound;
pub mod mediator;
pub mod sequence;
pub mod uri_template;

pub use api::{Api, Resource, VersionType};
pub use cors::CorsConfig;
pub use endpoint::{Endpoint, EndpointUrl};
pub use inbound::InboundDef;
pub use mediator::{CallMediator, LogCategory, LogMediator, Mediator, RespondMediator};
pub use sequence::Sequence;
pub use uri_template::UriTemplateInfo;

/// Separator used to build hierarchy breadcrumbs.
pub const HIERARCHY_SEPARATOR: &str = "→";

/// Source location of an artifact or mediator inside its descriptor file.
///
/// `hierarchy` is a breadcrumb such as
/// `HealthcareAPI→/patients/{id}→inSequence→log`, grown as parsing descends
/// into nested elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Position {
    pub file_name: String,
    pub line_no: u64,
    pub hierarchy: String,
}

impl Position {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            line_no: 0,
            hierarchy: String::new(),
        }
    }

    /// Returns a copy with one more breadcrumb segment appended.
    pub fn descend(&self, segment: &str) -> Self {
        let hierarchy = if self.hierarchy.is_empty() {
            segment.to_string()
        } else {
            format!("{}{}{}", self.hierarchy, HIERARCHY_SEPARATOR, segment)
        };
        Self {
            file_name: self.file_name.clone(),
            line_no: self.line_no,
            hierarchy,
        }
    }

    /// Returns a copy pointing at a different line of the same file.
    pub fn at_line(&self, line_no: u64) -> Self {
        Self {
            line_no,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.hierarchy.is_empty() {
            write!(f, "{}:{}", self.file_name, self.line_no)
        } else {
            write!(f, "{}:{} ({})", self.file_name, self.line_no, self.hierarchy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descend_builds_breadcrumb() {
        let root = Position::new("api.xml");
        let api = root.descend("OrderAPI");
        let resource = api.descend("/orders/{id}");
        let seq = resource.descend("inSequence");

        assert_eq!(seq.hierarchy, "OrderAPI→/orders/{id}→inSequence");
        assert_eq!(seq.file_name, "api.xml");
    }

    #[test]
    fn test_display_names_file_and_line() {
        let position = Position {
            file_name: "seq.xml".to_string(),
            line_no: 7,
            hierarchy: "MainSeq→log".to_string(),
        };
        assert_eq!(position.to_string(), "seq.xml:7 (MainSeq→log)");
    }

    #[test]
    fn test_at_line_preserves_hierarchy() {
        let position = Position::new("a.xml").descend("A");
        let moved = position.at_line(12);
        assert_eq!(moved.line_no, 12);
        assert_eq!(moved.hierarchy, "A");
    }
}
