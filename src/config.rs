//! Configuration management for record-reformer
//!
//! Handles loading and validating configuration from YAML files.
//!
//! Besides the reserved settings, every top-level key is a field template.
//! Entries under the `record` block are applied after them and win on
//! collision:
//!
//! ```yaml
//! output_tag: "reformed.${tag}"
//! remove_keys: "password,secret"
//! renew_record: false
//! enable_expression_mode: false
//! message: "${hostname} ${tag_parts[-1]} ${message}"
//! record:
//!   host: "${hostname}"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as YamlValue};
use thiserror::Error;

use crate::transformer::{ExpandMode, FieldMap, RemoveKeys};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error reading the configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing the configuration file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Plugin type marker, accepted and ignored
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub plugin_type: Option<String>,

    /// Template of the outgoing tag (required)
    #[serde(default)]
    pub output_tag: String,

    /// Comma-separated keys deleted from every outgoing record
    #[serde(default)]
    pub remove_keys: Option<String>,

    /// Build outgoing records from empty instead of copying the input
    #[serde(default)]
    pub renew_record: bool,

    /// Evaluate `${...}` holes as expressions instead of placeholder lookups
    #[serde(default = "default_expression_mode", alias = "enable_ruby")]
    pub enable_expression_mode: bool,

    /// Keep the value type when a template is a single placeholder
    #[serde(default = "default_auto_typecast")]
    pub auto_typecast: bool,

    /// Hostname override; resolved by the caller when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Nested `record` block of field templates
    #[serde(default)]
    pub record: Mapping,

    /// Flat field templates (every other top-level key)
    #[serde(flatten)]
    pub fields: Mapping,
}

fn default_expression_mode() -> bool {
    true
}

fn default_auto_typecast() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Selected expansion mode
    pub fn expand_mode(&self) -> ExpandMode {
        if self.enable_expression_mode {
            ExpandMode::Expression
        } else {
            ExpandMode::Placeholder
        }
    }

    /// Build the field map: flat entries first, then the `record` block
    ///
    /// # Errors
    /// Returns an error if a key is not text or a template is not a scalar
    pub fn field_map(&self) -> Result<FieldMap, ConfigError> {
        let mut map = FieldMap::new();
        for (key, value) in self.fields.iter().chain(self.record.iter()) {
            let key = key.as_str().ok_or_else(|| {
                ConfigError::ValidationError(format!("Field key must be a string: {:?}", key))
            })?;
            map.insert(key, template_text(key, value)?);
        }
        Ok(map)
    }

    /// Parsed remove keys, if configured
    pub fn remove_keys(&self) -> Option<RemoveKeys> {
        self.remove_keys.as_deref().map(RemoveKeys::parse)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.output_tag.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "output_tag is required".to_string(),
            ));
        }

        if let Some(keys) = self.remove_keys() {
            if keys.keys().iter().any(|k| k.is_empty()) {
                return Err(ConfigError::ValidationError(format!(
                    "remove_keys contains an empty key: '{}'",
                    self.remove_keys.as_deref().unwrap_or_default()
                )));
            }
        }

        self.field_map()?;

        Ok(())
    }
}

/// Template text of a configured field value
fn template_text(key: &str, value: &YamlValue) -> Result<String, ConfigError> {
    match value {
        YamlValue::String(s) => Ok(s.clone()),
        YamlValue::Number(n) => Ok(n.to_string()),
        YamlValue::Bool(b) => Ok(b.to_string()),
        YamlValue::Null => Ok(String::new()),
        _ => Err(ConfigError::ValidationError(format!(
            "Template for field '{}' must be a scalar value",
            key
        ))),
    }
}
