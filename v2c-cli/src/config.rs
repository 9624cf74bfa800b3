use v2c_core::{ErrContext, Result};

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Optional user configuration. Every field has a sensible default so the
/// file does not have to exist.
#[derive(Deserialize, Debug, Default)]
pub struct Configuration {
    /// URI of the container engine.
    pub runtime_uri: Option<String>,
    /// Name of the shared transport volume.
    pub transport_volume: Option<String>,
    /// Category emission order used after the base image.
    pub categories: Option<Vec<String>>,
}

impl Configuration {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read `{}`", path.as_ref().display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse `{}`", path.as_ref().display()))
    }

    /// Loads the file when it exists; a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_fields() {
        let raw = "runtime_uri: tcp://127.0.0.1:2375\ntransport_volume: v2c-testing\ncategories:\n  - application\n  - init\n";
        let config: Configuration = serde_yaml::from_str(raw).unwrap();

        assert_eq!(config.runtime_uri.as_deref(), Some("tcp://127.0.0.1:2375"));
        assert_eq!(config.transport_volume.as_deref(), Some("v2c-testing"));
        assert_eq!(
            config.categories,
            Some(vec!["application".to_string(), "init".to_string()])
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Configuration::load_or_default("/definitely/not/here.yml").unwrap();
        assert!(config.runtime_uri.is_none());
        assert!(config.transport_volume.is_none());
        assert!(config.categories.is_none());
    }
}
