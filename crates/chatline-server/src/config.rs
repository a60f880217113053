//! Server configuration: defaults, optional TOML file, command-line overrides.

use chatline_core::{CoreConfig, InvalidConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    Invalid(#[from] InvalidConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind: SocketAddr,
    /// Close sessions that have not picked a nickname within this many
    /// seconds. `0` disables the timeout.
    pub nickname_timeout_secs: u64,
    /// Drop a connection whose socket accepts no frame for this many seconds.
    /// `0` waits forever.
    pub send_timeout_secs: u64,
    #[serde(flatten)]
    pub core: CoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: ([127, 0, 0, 1], DEFAULT_PORT).into(),
            nickname_timeout_secs: 0,
            send_timeout_secs: DEFAULT_SEND_TIMEOUT_SECS,
            core: CoreConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(self.core.validate()?)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn nickname_timeout(&self) -> Option<Duration> {
        (self.nickname_timeout_secs > 0).then(|| Duration::from_secs(self.nickname_timeout_secs))
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        (self.send_timeout_secs > 0).then(|| Duration::from_secs(self.send_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_core::CasePolicy;
    use std::io::Write;

    #[test]
    fn empty_file_is_default() {
        assert_eq!(ServerConfig::from_toml("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn flat_core_keys() {
        let cfg = ServerConfig::from_toml(
            r#"
            bind = "0.0.0.0:9000"
            nickname_timeout_secs = 30
            case_policy = "insensitive"
            max_history = 0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.bind.port(), 9000);
        assert_eq!(cfg.nickname_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.core.case_policy, CasePolicy::Insensitive);
        assert_eq!(cfg.core.max_history, 0);
        assert_eq!(cfg.core.outbound_buffer, chatline_core::DEFAULT_OUTBOUND_BUFFER);
        assert_eq!(cfg.send_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_history = 5").unwrap();
        let cfg = ServerConfig::load(file.path()).unwrap();
        assert_eq!(cfg.core.max_history, 5);
        assert_eq!(cfg.nickname_timeout(), None);
    }

    #[test]
    fn bad_file_names_the_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_history = \"lots\"").unwrap();
        let err = ServerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));

        let missing = ServerConfig::load(Path::new("/nonexistent/chatline.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn tiny_queue_is_rejected_on_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "outbound_buffer = 1\nsend_timeout_secs = 0").unwrap();
        let err = ServerConfig::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(InvalidConfig::OutboundBufferTooSmall(1))
        ));

        let cfg = ServerConfig::from_toml("send_timeout_secs = 0").unwrap();
        assert_eq!(cfg.send_timeout(), None);
    }
}
