//! TOML configuration loading and validation.
//!
//! Two files live under `conf/` next to the deployment:
//!
//! - `deployment.toml` — server settings. `server.hostname` is required;
//!   `server.offset` is an optional non-negative integer (accepted as a bare
//!   integer or an integer-valued string) added to the base HTTP port.
//! - `LoggerConfig.toml` — log handler format and per-component levels,
//!   translated into a `tracing_subscriber` filter at startup.
//!
//! Any violation here is fatal: a gateway with a broken deployment file must
//! not come up half-configured.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};

pub mod error;

pub use error::ConfigError;

/// Base port of the shared HTTP router; `server.offset` shifts it.
pub const BASE_HTTP_PORT: u16 = 8290;

/// Contents of `deployment.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentConfig {
    pub server: ServerConfig,
}

/// The `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub hostname: String,
    #[serde(default, deserialize_with = "int_or_string")]
    pub offset: Option<String>,
}

impl DeploymentConfig {
    /// Validated port offset (defaults to zero).
    pub fn offset(&self) -> Result<u16, ConfigError> {
        match self.server.offset.as_deref() {
            None | Some("") => Ok(0),
            Some(raw) => {
                let value: i64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "server.offset",
                    reason: format!("'{raw}' is not an integer"),
                })?;
                if !(0..=i64::from(u16::MAX)).contains(&value) {
                    return Err(ConfigError::InvalidValue {
                        key: "server.offset",
                        reason: format!("offset must be non-negative, got {value}"),
                    });
                }
                Ok(value as u16)
            }
        }
    }

    /// Port a listener with the given base port should bind.
    pub fn effective_port(&self, base: u16) -> Result<u16, ConfigError> {
        let offset = self.offset()?;
        base.checked_add(offset).ok_or(ConfigError::InvalidValue {
            key: "server.offset",
            reason: format!("offset {offset} overflows port {base}"),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.hostname.is_empty() {
            return Err(ConfigError::MissingKey { key: "hostname" });
        }
        self.offset()?;
        Ok(())
    }
}

/// Accept `offset = 2` and `offset = "2"` alike; normalize to a string.
fn int_or_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Int(value) => value.to_string(),
        Raw::Str(value) => value,
    }))
}

/// Load and validate `deployment.toml` from the conf directory.
pub fn load_deployment_config(conf_dir: &Path) -> Result<DeploymentConfig, ConfigError> {
    let path = conf_dir.join("deployment.toml");
    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config: DeploymentConfig =
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?;
    config.validate()?;
    Ok(config)
}

/// Contents of `LoggerConfig.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggerConfig {
    #[serde(default)]
    pub logger: LoggerSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggerSection {
    #[serde(default)]
    pub handler: HandlerConfig,
    #[serde(default)]
    pub level: LevelSection,
}

/// Output handler settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    /// `text` or `json`.
    #[serde(default = "default_format")]
    pub format: String,
    /// Default level applied to everything not listed per component.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            level: default_level(),
        }
    }
}

fn default_format() -> String {
    "text".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

/// Per-component level overrides, keyed by short component name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LevelSection {
    #[serde(default)]
    pub components: BTreeMap<String, String>,
}

impl LoggerConfig {
    /// Render the configuration as an `EnvFilter` directive string, e.g.
    /// `info,flowgate::router=debug,flowgate::mediation=warn`.
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.logger.handler.level.clone()];
        for (component, level) in &self.logger.level.components {
            let target = if component.contains("::") {
                component.clone()
            } else {
                format!("flowgate::{component}")
            };
            directives.push(format!("{target}={level}"));
        }
        directives.join(",")
    }

    pub fn json_output(&self) -> bool {
        self.logger.handler.format.eq_ignore_ascii_case("json")
    }
}

/// Load `LoggerConfig.toml` from the conf directory.
pub fn load_logger_config(conf_dir: &Path) -> Result<LoggerConfig, ConfigError> {
    let path = conf_dir.join("LoggerConfig.toml");
    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}
