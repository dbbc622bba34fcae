//! API artifacts: HTTP routes grouped under a shared base path.

use super::cors::CorsConfig;
use super::sequence::Sequence;
use super::uri_template::UriTemplateInfo;
use super::Position;
use crate::mediation::MediationContext;
use crate::message::MessageContext;

/// Versioning strategy of an API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionType {
    /// The literal `{version}` token in the context path is replaced.
    Context,
    /// The version is appended to the context path as a segment.
    Url,
}

impl VersionType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "context" => Some(VersionType::Context),
            "url" => Some(VersionType::Url),
            _ => None,
        }
    }
}

/// A single HTTP route: a method set and URI template with its in- and
/// fault-sequences. A resource belongs to exactly one API.
#[derive(Debug, Clone, Default)]
pub struct Resource {
    pub methods: Vec<String>,
    pub uri_template: UriTemplateInfo,
    pub in_sequence: Sequence,
    pub fault_sequence: Sequence,
}

impl Resource {
    /// Run the in-sequence; on failure run the fault-sequence. The mediation
    /// succeeds iff at least one of the two completed.
    pub async fn mediate(&self, msg: &mut MessageContext, ctx: &MediationContext) -> bool {
        if self.in_sequence.execute(msg, ctx).await {
            return true;
        }
        self.fault_sequence.execute(msg, ctx).await
    }
}

/// A deployed API artifact.
#[derive(Debug, Clone, Default)]
pub struct Api {
    pub name: String,
    pub context: String,
    pub version: Option<String>,
    pub version_type: Option<VersionType>,
    pub resources: Vec<Resource>,
    pub cors: CorsConfig,
    pub position: Position,
}

impl Api {
    /// The effective base path all of this API's routes hang off.
    ///
    /// Trailing slashes are trimmed; `url` versioning appends the version as
    /// a segment, `context` versioning substitutes the `{version}` token.
    pub fn base_path(&self) -> String {
        let mut base = self.context.clone();
        if base.len() > 1 && base.ends_with('/') {
            base.pop();
        }
        if !base.is_empty() && !base.starts_with('/') {
            base.insert(0, '/');
        }

        if let (Some(version), Some(version_type)) = (&self.version, self.version_type) {
            match version_type {
                VersionType::Url => {
                    if base == "/" || base.is_empty() {
                        base = format!("/{version}");
                    } else {
                        base = format!("{base}/{version}");
                    }
                }
                VersionType::Context => {
                    base = base.replacen("{version}", version, 1);
                }
            }
        }
        base
    }

    /// Path of the OpenAPI discovery endpoint: `/<name>` or
    /// `/<name>:<version>` when versioned.
    pub fn swagger_path(&self) -> String {
        match &self.version {
            Some(version) => format!("/{}:{}", self.name, version),
            None => format!("/{}", self.name),
        }
    }
}
