use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use super::types::ProviderKind;
use crate::error_handling::types::ConfigError;

/// Application configuration structure that defines all runtime parameters.
///
/// Built either from the command line (`clap`) or, when `--config <file>` is
/// given, from a TOML file (`toml`). Every field has a default, so an empty
/// file or a bare invocation is a valid configuration.
///
/// # Fields Overview
///
/// - `bind_address` / `web_port`: where the request layer listens
/// - `interface`: interface used when a start request does not name one
/// - `packet_limit`: per-session packet limit used when a start request does not give one
/// - `provider`: capture provider backing new sessions
/// - `replay_pace`: replay frames at their recorded pace
/// - `staging_dir`: where staging artifacts are written before upload
/// - `store_dir`: root of the file-backed object store
/// - `key_prefix`: prefix of every persisted object key
/// - `publish_capacity`: records buffered per live subscriber
#[derive(Parser, Deserialize, Debug, Clone, PartialEq)]
#[command(name = "netsniff")]
#[command(version)]
#[command(about = "Live packet capture with real-time streaming and durable upload")]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Load the configuration from this TOML file instead of the flags
    #[arg(long = "config", env = "NETSNIFF_CONFIG")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Address the web server binds to
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Port of the web server
    #[arg(long, default_value_t = 5000)]
    pub web_port: u16,

    /// Default capture interface
    #[arg(long, env = "NETSNIFF_INTERFACE", default_value = "eth0")]
    pub interface: String,

    /// Default per-session packet limit
    #[arg(long, default_value_t = 10_000)]
    pub packet_limit: usize,

    /// Capture provider
    #[arg(long, value_enum, default_value_t = ProviderKind::default())]
    pub provider: ProviderKind,

    /// Replay frames at their recorded inter-arrival pace
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub replay_pace: bool,

    /// Directory for staging artifacts
    #[arg(long, default_value = "tmp")]
    pub staging_dir: PathBuf,

    /// Root directory of the object store
    #[arg(long, env = "NETSNIFF_STORE_DIR", default_value = "captures")]
    pub store_dir: PathBuf,

    /// Prefix of persisted object keys
    #[arg(long, default_value = "success_packet_capture_")]
    pub key_prefix: String,

    /// Records buffered per live subscriber
    #[arg(long, default_value_t = 1024)]
    pub publish_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_file: None,
            bind_address: "0.0.0.0".to_string(),
            web_port: 5000,
            interface: "eth0".to_string(),
            packet_limit: 10_000,
            provider: ProviderKind::default(),
            replay_pace: false,
            staging_dir: PathBuf::from("tmp"),
            store_dir: PathBuf::from("captures"),
            key_prefix: "success_packet_capture_".to_string(),
            publish_capacity: 1024,
        }
    }
}

impl Config {
    /// Parses the command line; if it names a config file, that file wins.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = Config::parse();
        let config = match &cli.config_file {
            Some(path) => Config::from_file(path)?,
            None => cli,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let mut config: Config =
            toml::from_str(&raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_limit == 0 {
            return Err(ConfigError::NotInRange(
                "packet_limit must be greater than 0".into(),
            ));
        }
        if self.publish_capacity == 0 {
            return Err(ConfigError::NotInRange(
                "publish_capacity must be greater than 0".into(),
            ));
        }
        if self.key_prefix.is_empty() || self.key_prefix.contains('/') {
            return Err(ConfigError::NotInRange(
                "key_prefix must be a non-empty flat name".into(),
            ));
        }
        if self.staging_dir.is_file() {
            return Err(ConfigError::DirectoryDoesNotExist(format!(
                "staging_dir {} is a file",
                self.staging_dir.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn defaults_from_empty_command_line() {
        let config = Config::try_parse_from(["netsniff"]).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "netsniff",
            "--web-port",
            "8080",
            "--interface",
            "wlan0",
            "--packet-limit",
            "5",
            "--provider",
            "pcap",
            "--replay-pace",
        ])
        .unwrap();
        assert_eq!(config.web_port, 8080);
        assert_eq!(config.interface, "wlan0");
        assert_eq!(config.packet_limit, 5);
        assert_eq!(config.provider, ProviderKind::Pcap);
        assert!(config.replay_pace);
    }

    #[test]
    fn from_file_fills_missing_fields_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "interface = \"frames.jsonl\"\npacket_limit = 25\nprovider = \"replay\"\nkey_prefix = \"lab_\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.interface, "frames.jsonl");
        assert_eq!(config.packet_limit, 25);
        assert_eq!(config.key_prefix, "lab_");
        assert_eq!(config.web_port, 5000);
        assert_eq!(config.config_file.as_deref(), Some(file.path()));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "interfaces = \"eth0\"").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    #[serial]
    fn provider_default_follows_build_features() {
        let config = Config::try_parse_from(["netsniff"]).unwrap();
        let expected = if cfg!(feature = "pcap") {
            ProviderKind::Pcap
        } else {
            ProviderKind::Replay
        };
        assert_eq!(config.provider, expected);
    }

    #[test]
    fn validation_rejects_zero_limit() {
        let config = Config {
            packet_limit: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NotInRange(_))));
    }
}
