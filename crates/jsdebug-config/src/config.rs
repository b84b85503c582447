use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Wire protocol used to reach the VM.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Length-framed JSON over a raw socket.
    #[default]
    V8,
    /// WebSocket Inspector protocol.
    Wip,
}

/// Log verbosity level.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Where the VM listens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub protocol: Protocol,
    /// Host of the native debugger socket.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// WebSocket URL of the inspected page. Required for `wip`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5858
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::V8,
            host: default_host(),
            port: default_port(),
            url: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Frame range of the automatic backtrace taken on every suspend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktraceConfig {
    #[serde(default)]
    pub from_frame: Option<u32>,
    /// One past the last frame; absent means all frames.
    #[serde(default)]
    pub to_frame: Option<u32>,
    #[serde(default = "default_true")]
    pub compact: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BacktraceConfig {
    fn default() -> Self {
        Self {
            from_frame: None,
            to_frame: None,
            compact: true,
        }
    }
}

/// Value loading limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuesConfig {
    /// String cap for ordinary lookups; absent keeps the VM default.
    #[serde(default)]
    pub max_string_length: Option<u64>,
    /// Lower bound of the cap used when reloading a truncated string.
    #[serde(default = "default_reload_min_length")]
    pub reload_min_length: u64,
}

fn default_reload_min_length() -> u64 {
    65536
}

impl Default for ValuesConfig {
    fn default() -> Self {
        Self {
            max_string_length: None,
            reload_min_length: default_reload_min_length(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Top-level jsdebug configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub backtrace: BacktraceConfig,
    #[serde(default)]
    pub values: ValuesConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.connection.protocol, Protocol::V8);
        assert_eq!(cfg.connection.host, "127.0.0.1");
        assert_eq!(cfg.connection.port, 5858);
        assert!(cfg.connection.url.is_none());
        assert_eq!(cfg.connection.connect_timeout_secs, 10);
        assert!(cfg.backtrace.from_frame.is_none());
        assert!(cfg.backtrace.to_frame.is_none());
        assert!(cfg.backtrace.compact);
        assert!(cfg.values.max_string_length.is_none());
        assert_eq!(cfg.values.reload_min_length, 65536);
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
    }

    #[test]
    fn serde_roundtrip_preserves_values() {
        let cfg = Config {
            connection: ConnectionConfig {
                protocol: Protocol::Wip,
                host: "localhost".into(),
                port: 9222,
                url: Some("ws://localhost:9222/devtools/page/1".into()),
                connect_timeout_secs: 3,
            },
            backtrace: BacktraceConfig {
                from_frame: Some(0),
                to_frame: Some(20),
                compact: false,
            },
            values: ValuesConfig {
                max_string_length: Some(1000),
                reload_min_length: 4096,
            },
            log: LogConfig {
                level: LogLevel::Debug,
                file: Some(PathBuf::from("/tmp/jsdebug.log")),
            },
        };

        let toml_str = toml::to_string(&cfg).expect("serialize");
        let deserialized: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn parse_from_toml_string() {
        let input = r#"
[connection]
protocol = "wip"
url = "ws://127.0.0.1:9222/devtools/page/A1"

[backtrace]
to_frame = 10
"#;
        let cfg: Config = toml::from_str(input).expect("parse toml");
        assert_eq!(cfg.connection.protocol, Protocol::Wip);
        assert_eq!(cfg.backtrace.to_frame, Some(10));
        // Unspecified fields keep defaults via serde(default)
        assert_eq!(cfg.connection.port, 5858);
        assert!(cfg.backtrace.compact);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: Config = toml::from_str("").expect("parse empty toml");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn log_level_filter_names() {
        assert_eq!(LogLevel::Trace.as_str(), "trace");
        assert_eq!(LogLevel::Warn.as_str(), "warn");
    }
}
