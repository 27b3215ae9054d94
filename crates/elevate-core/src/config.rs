//! Broker configuration.
//!
//! Embedders that want more than the [`crate::execute`] defaults load a
//! [`BrokerConfig`] (TOML or built in code) and execute through it. Every
//! field maps to one injectable knob on the executors; absent fields keep
//! the reference behavior.
//!
//! ```toml
//! retention = "retain"
//! helpers = ["/usr/bin/pkexec"]
//!
//! [wait]
//! poll_interval = "500ms"
//! deadline = "5m"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ElevationResult;
use crate::exec::{Elevator, ExecOutput};
use crate::options::ValidatedOptions;
use crate::session::{Retention, Session};
use crate::wait::WaitConfig;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading a configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Caller-facing knobs for the platform executors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// What happens to session directories after result collection.
    #[serde(default)]
    pub retention: Retention,

    /// Root for session directories. Defaults to the system temp dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_root: Option<PathBuf>,

    /// Status-artifact wait policy (Windows).
    #[serde(default)]
    pub wait: WaitConfig,

    /// Ordered elevation-helper list (Linux). Defaults to the built-in
    /// preference order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helpers: Option<Vec<PathBuf>>,

    /// Prompt relay binary (macOS). Defaults to environment resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applet: Option<PathBuf>,
}

impl BrokerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or contains unknown shapes.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Runs one elevated command using this configuration.
    ///
    /// # Errors
    ///
    /// Same contract as [`crate::execute`].
    #[allow(unused_variables)]
    pub async fn execute(
        &self,
        command: &str,
        options: ValidatedOptions,
    ) -> ElevationResult<ExecOutput> {
        let temp_root = self
            .temp_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let session = Session::build_in(temp_root, command, options, self.retention)?;

        #[cfg(target_os = "macos")]
        {
            let executor = match &self.applet {
                Some(applet) => crate::exec::MacExecutor::with_applet(applet),
                None => crate::exec::MacExecutor::new(),
            };
            executor.elevate(&session).await
        }
        #[cfg(target_os = "linux")]
        {
            let executor = match &self.helpers {
                Some(helpers) => crate::exec::LinuxExecutor::with_helpers(helpers.clone()),
                None => crate::exec::LinuxExecutor::new(),
            };
            executor.elevate(&session).await
        }
        #[cfg(target_os = "windows")]
        {
            crate::exec::WindowsExecutor::new()
                .with_wait(self.wait.clone())
                .elevate(&session)
                .await
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            let _ = session;
            Err(crate::error::ElevationError::environment(
                "platform not supported",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_parse_empty_config_is_defaults() {
        let config = BrokerConfig::from_toml("").unwrap();
        assert_eq!(config.retention, Retention::Remove);
        assert!(config.temp_root.is_none());
        assert!(config.helpers.is_none());
        assert!(config.applet.is_none());
        assert_eq!(config.wait, WaitConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            retention = "retain"
            temp_root = "/var/tmp"
            helpers = ["/usr/bin/pkexec"]
            applet = "/opt/elevate/elevate-applet"

            [wait]
            poll_interval = "500ms"
            deadline = "5m"
        "#;

        let config = BrokerConfig::from_toml(toml).unwrap();
        assert_eq!(config.retention, Retention::Retain);
        assert_eq!(config.temp_root, Some(PathBuf::from("/var/tmp")));
        assert_eq!(
            config.helpers,
            Some(vec![PathBuf::from("/usr/bin/pkexec")])
        );
        assert_eq!(config.wait.poll_interval, Duration::from_millis(500));
        assert_eq!(config.wait.deadline, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_parse_rejects_malformed_retention() {
        assert!(BrokerConfig::from_toml("retention = \"sometimes\"").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = BrokerConfig {
            retention: Retention::Retain,
            temp_root: Some(PathBuf::from("/var/tmp")),
            ..BrokerConfig::default()
        };
        let rendered = config.to_toml().unwrap();
        let parsed = BrokerConfig::from_toml(&rendered).unwrap();
        assert_eq!(parsed.retention, Retention::Retain);
        assert_eq!(parsed.temp_root, Some(PathBuf::from("/var/tmp")));
    }
}
