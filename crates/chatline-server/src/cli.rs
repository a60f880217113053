//! Command-line arguments.

use crate::config::{ConfigError, ServerConfig};
use chatline_core::CasePolicy;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "chatline", version, about = "Real-time chat server")]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "CHATLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, value_name = "ADDR", env = "CHATLINE_BIND")]
    pub bind: Option<SocketAddr>,

    /// Port to listen on. Overrides the port of `--bind`.
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u16).range(1..),
        env = "CHATLINE_PORT"
    )]
    pub port: Option<u16>,

    /// History kept for replay (0 = unbounded).
    #[arg(long)]
    pub max_history: Option<usize>,

    /// Treat nicknames differing only in case as equal.
    #[arg(long)]
    pub case_insensitive: bool,

    /// Per-session outbound queue capacity.
    #[arg(long)]
    pub outbound_buffer: Option<usize>,

    /// Seconds a session may wait before choosing a nickname (0 = forever).
    #[arg(long, value_name = "SECS")]
    pub nickname_timeout: Option<u64>,

    /// Seconds a single frame may take to reach a client (0 = forever).
    #[arg(long, value_name = "SECS")]
    pub send_timeout: Option<u64>,
}

impl Cli {
    /// Load the config file, if any, and apply flags on top.
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.bind.set_port(port);
        }
        if let Some(max) = self.max_history {
            config.core.max_history = max;
        }
        if self.case_insensitive {
            config.core.case_policy = CasePolicy::Insensitive;
        }
        if let Some(capacity) = self.outbound_buffer {
            config.core.outbound_buffer = capacity;
        }
        if let Some(secs) = self.nickname_timeout {
            config.nickname_timeout_secs = secs;
        }
        if let Some(secs) = self.send_timeout {
            config.send_timeout_secs = secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_core::InvalidConfig;

    #[test]
    fn port_flag() {
        let cli = Cli::try_parse_from(["chatline", "--port", "6000"]).unwrap();
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.bind.port(), 6000);
        assert!(cfg.bind.ip().is_loopback());
        assert_eq!(cfg.core.max_history, chatline_core::DEFAULT_MAX_HISTORY);

        let cli = Cli::try_parse_from(["chatline", "-p", "6001"]).unwrap();
        assert_eq!(cli.port, Some(6001));
    }

    #[test]
    fn port_range_checked() {
        assert!(Cli::try_parse_from(["chatline", "--port", "0"]).is_err());
        assert!(Cli::try_parse_from(["chatline", "--port", "70000"]).is_err());
        assert!(Cli::try_parse_from(["chatline", "--port", "abc"]).is_err());
        assert!(Cli::try_parse_from(["chatline", "6000"]).is_err());
    }

    #[test]
    fn bind_then_port() {
        let cli = Cli::try_parse_from(["chatline", "--bind", "0.0.0.0:7000"]).unwrap();
        let cfg = cli.into_config().unwrap();
        assert!(cfg.bind.ip().is_unspecified());
        assert_eq!(cfg.bind.port(), 7000);

        let cli =
            Cli::try_parse_from(["chatline", "--bind", "0.0.0.0:7000", "--port", "7001"]).unwrap();
        let cfg = cli.into_config().unwrap();
        assert!(cfg.bind.ip().is_unspecified());
        assert_eq!(cfg.bind.port(), 7001);

        assert!(Cli::try_parse_from(["chatline", "--bind", "0.0.0.0"]).is_err());
    }

    #[test]
    fn flags_override() {
        let cli = Cli::try_parse_from([
            "chatline",
            "--max-history",
            "0",
            "--case-insensitive",
            "--nickname-timeout",
            "15",
            "--send-timeout",
            "0",
        ])
        .unwrap();
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.bind.port(), crate::config::DEFAULT_PORT);
        assert_eq!(cfg.core.max_history, 0);
        assert_eq!(cfg.core.case_policy, CasePolicy::Insensitive);
        assert_eq!(cfg.nickname_timeout_secs, 15);
        assert_eq!(cfg.send_timeout(), None);
    }

    #[test]
    fn queue_too_small_for_a_join() {
        let cli = Cli::try_parse_from(["chatline", "--outbound-buffer", "2"]).unwrap();
        assert!(matches!(
            cli.into_config(),
            Err(ConfigError::Invalid(InvalidConfig::OutboundBufferTooSmall(2)))
        ));

        let min = chatline_core::MIN_OUTBOUND_BUFFER.to_string();
        let cli = Cli::try_parse_from(["chatline", "--outbound-buffer", min.as_str()]).unwrap();
        assert!(cli.into_config().is_ok());
    }
}
