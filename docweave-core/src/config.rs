//! Engine configuration.

use crate::error::SchemaError;
use crate::extension::Extension;
use crate::extensions;
use crate::markdown::SerializerOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Unknown extension: {0}")]
    UnknownExtension(String),

    #[error("Invalid options for `{extension}`: {message}")]
    InvalidOptions { extension: String, message: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Which built-in descriptors to start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Full,
    /// CommonMark blocks and the core marks only.
    Basic,
}

/// Engine configuration, usually loaded from `docweave.yml`.
///
/// ```yaml
/// preset: full
/// disabled: [embed]
/// options:
///   heading:
///     levels: [1, 2, 3]
/// serializer:
///   bullet: "*"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub preset: Preset,

    /// Descriptor names to leave out of the preset.
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Per-descriptor option overrides, merged over each descriptor's defaults.
    #[serde(default)]
    pub options: BTreeMap<String, Value>,

    #[serde(default)]
    pub serializer: SerializerOptions,

    #[serde(default = "default_true")]
    pub editable: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preset: Preset::default(),
            disabled: Vec::new(),
            options: BTreeMap::new(),
            serializer: SerializerOptions::default(),
            editable: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Names of the descriptors this configuration enables, in
    /// registration order.
    pub fn extension_names(&self) -> Result<Vec<&'static str>, ConfigError> {
        let preset = match self.preset {
            Preset::Full => extensions::FULL,
            Preset::Basic => extensions::BASIC,
        };
        for name in self.disabled.iter().chain(self.options.keys()) {
            if !extensions::FULL.contains(&name.as_str()) {
                return Err(ConfigError::UnknownExtension(name.clone()));
            }
        }
        Ok(preset
            .iter()
            .copied()
            .filter(|name| !self.disabled.iter().any(|d| d == name))
            .collect())
    }

    /// Instantiate the enabled descriptors with their merged options.
    pub fn build_extensions(&self) -> Result<Vec<Box<dyn Extension>>, ConfigError> {
        self.extension_names()?
            .into_iter()
            .map(|name| {
                let options = self.options.get(name).cloned().unwrap_or(Value::Null);
                extensions::build_extension(name, &options)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_yaml_str("").unwrap();
        assert_eq!(config.preset, Preset::Full);
        assert!(config.editable);
        assert_eq!(config.serializer.bullet, "-");
        assert_eq!(config.extension_names().unwrap(), extensions::FULL.to_vec());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "preset: basic\ndisabled: [image]\noptions:\n  heading:\n    levels: [1, 2]\nserializer:\n  bullet: \"*\"\neditable: false"
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.preset, Preset::Basic);
        assert!(!config.editable);
        assert_eq!(config.serializer.bullet, "*");
        assert_eq!(config.options["heading"], json!({"levels": [1, 2]}));
        let names = config.extension_names().unwrap();
        assert!(!names.contains(&"image"));
        assert!(!names.contains(&"table"));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let config = EngineConfig::from_yaml_str("disabled: [sparkles]").unwrap();
        assert!(matches!(
            config.extension_names(),
            Err(ConfigError::UnknownExtension(name)) if name == "sparkles"
        ));
    }

    #[test]
    fn test_invalid_options_rejected() {
        let config = EngineConfig::from_yaml_str("options:\n  heading:\n    levels: nope").unwrap();
        assert!(matches!(
            config.build_extensions(),
            Err(ConfigError::InvalidOptions { extension, .. }) if extension == "heading"
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            EngineConfig::from_file("/nonexistent/docweave.yml"),
            Err(ConfigError::ReadError(_))
        ));
    }
}
