//! Per-API CORS configuration.

/// Preflight cache duration used when the descriptor does not override it.
pub const DEFAULT_MAX_AGE_SECS: u64 = 86_400;

/// CORS policy attached to an API.
///
/// Defaults mirror a disabled policy that, once enabled, allows any origin
/// and the common REST verbs/headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_origins: vec!["*".to_string()],
            allow_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS", "PATCH"]
                .into_iter()
                .map(String::from)
                .collect(),
            allow_headers: ["Origin", "Content-Type", "Accept", "Authorization"]
                .into_iter()
                .map(String::from)
                .collect(),
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }
}

impl CorsConfig {
    /// Whether `origin` is allowed by this policy.
    ///
    /// A configured origin of `*` allows everything. A configured origin of
    /// the form `*.example.com` matches any origin whose host ends in
    /// `.example.com`.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.allow_origins.iter().any(|allowed| {
            if allowed == "*" || allowed == origin {
                return true;
            }
            if let Some(domain) = allowed.strip_prefix("*.") {
                return origin.ends_with(&format!(".{domain}"));
            }
            false
        })
    }
}
