//! papersync configuration file parsing (papersync.toml)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::document::Content;
use crate::download::DEFAULT_TARGET_ARCHIVE;

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "papersync.toml";

/// Settings read from the config file.
///
/// Every key is optional; command-line flags and environment variables take
/// precedence over anything set here.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub consume: ConsumeConfig,
    pub download: DownloadConfig,
}

/// Server connection
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Base URL of the Paperless instance
    pub url: Option<String>,
    /// User for basic auth; token auth when absent
    pub username: Option<String>,
    /// API token, or password with `username`
    pub token: Option<String>,
}

/// `consume` command
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsumeConfig {
    /// Drop-box directory
    pub dir: Option<PathBuf>,
    /// Quiet period in humantime syntax, e.g. "1s"
    pub delay: Option<String>,
}

/// `bulk-download` command
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct DownloadConfig {
    pub target_path: Option<PathBuf>,
    pub content: Option<Content>,
    pub unzip: Option<bool>,
    pub overwrite: Option<bool>,
    pub incremental: Option<bool>,
}

impl Config {
    /// Load config from `path`.
    ///
    /// Returns the default config if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)
            .map_err(|e| color_eyre::eyre::eyre!("cannot parse {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Config with every key set to its default, for `init`
    #[must_use]
    pub fn template() -> Self {
        Self {
            server: ServerConfig {
                url: Some("http://localhost:8000".to_string()),
                username: Some(String::new()),
                token: Some(String::new()),
            },
            consume: ConsumeConfig {
                dir: Some(PathBuf::from("consume")),
                delay: Some("1s".to_string()),
            },
            download: DownloadConfig {
                target_path: Some(PathBuf::from(DEFAULT_TARGET_ARCHIVE)),
                content: Some(Content::default()),
                unzip: Some(false),
                overwrite: Some(false),
                incremental: Some(false),
            },
        }
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> color_eyre::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
url = "https://paperless.example.com"
token = "abc"

[consume]
dir = "/srv/scans"
delay = "2s"

[download]
target-path = "mirror"
content = "both"
incremental = true
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.url.as_deref(), Some("https://paperless.example.com"));
        assert_eq!(config.server.username, None);
        assert_eq!(config.consume.dir, Some(PathBuf::from("/srv/scans")));
        assert_eq!(config.consume.delay.as_deref(), Some("2s"));
        assert_eq!(config.download.content, Some(Content::Both));
        assert_eq!(config.download.incremental, Some(true));
        assert_eq!(config.download.unzip, None);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = toml::from_str::<Config>("[server]\nurll = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_template_roundtrip() {
        let rendered = Config::template().to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, Config::template());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[server\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
