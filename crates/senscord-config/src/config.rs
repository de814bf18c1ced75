//! `senscord_server.toml` loading.
//!
//! Schema version 1. Default search order (spec §6): the paths in
//! `SENSCORD_FILE_PATH` (colon-separated), then `./senscord_server.toml`.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// A validated listener entry (spec §4.9 `listener_list`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSetting {
    pub connection_key: String,
    pub primary_address: String,
    pub secondary_address: Option<String>,
}

/// Buffering strategy for a stream's frame queue. `"queue"`/`"ring"` are
/// accepted as legacy aliases for `Discard`/`Overwrite` (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferingFormat {
    Discard,
    Overwrite,
}

impl BufferingFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "discard" | "queue" => Ok(BufferingFormat::Discard),
            "overwrite" | "ring" => Ok(BufferingFormat::Overwrite),
            other => Err(ConfigError::InvalidValue(format!(
                "unknown buffering format '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenStreamSetting {
    pub buffering: BufferingFormat,
    pub buffer_num: u32,
}

impl Default for OpenStreamSetting {
    fn default() -> Self {
        Self {
            buffering: BufferingFormat::Discard,
            buffer_num: 8,
        }
    }
}

/// One precedence entry; `stream_key`/`connection_key` of `""` are the
/// defaults described in spec §4.9.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettingEntry {
    pub stream_key: String,
    pub connection_key: String,
    pub setting: OpenStreamSetting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub client_enabled: bool,
    pub listeners: Vec<ListenerSetting>,
    pub stream_settings: Vec<StreamSettingEntry>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    server: Option<RawServer>,
    #[serde(default)]
    stream_settings: Vec<RawStreamSetting>,
}

#[derive(Debug, Deserialize)]
struct RawServer {
    client_enabled: Option<bool>,
    #[serde(default)]
    listeners: Vec<RawListener>,
}

#[derive(Debug, Deserialize)]
struct RawListener {
    connection_key: Option<String>,
    primary_address: Option<String>,
    secondary_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStreamSetting {
    #[serde(default)]
    stream_key: String,
    #[serde(default)]
    connection_key: String,
    buffering: Option<String>,
    buffer_num: Option<u32>,
}

pub fn load_from_path(path: &Path) -> Result<ServerConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading '{}': {e}", path.display())))?;
    load_from_str(&text)
}

pub fn load_from_str(text: &str) -> Result<ServerConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw.schema_version.unwrap_or(1);
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {schema_version}"
        )));
    }

    let raw_server = raw.server.unwrap_or(RawServer {
        client_enabled: None,
        listeners: vec![],
    });
    let client_enabled = raw_server.client_enabled.unwrap_or(false);

    let mut listeners = Vec::with_capacity(raw_server.listeners.len());
    for (i, l) in raw_server.listeners.into_iter().enumerate() {
        let connection_key = l
            .connection_key
            .ok_or_else(|| ConfigError::MissingField(format!("server.listeners[{i}].connection_key")))?;
        let primary_address = l.primary_address.ok_or_else(|| {
            ConfigError::MissingField(format!("server.listeners[{i}].primary_address"))
        })?;
        listeners.push(ListenerSetting {
            connection_key,
            primary_address,
            secondary_address: l.secondary_address,
        });
    }

    let mut stream_settings = Vec::with_capacity(raw.stream_settings.len());
    for entry in raw.stream_settings {
        let buffering = match entry.buffering {
            Some(b) => BufferingFormat::parse(&b)?,
            None => BufferingFormat::Discard,
        };
        stream_settings.push(StreamSettingEntry {
            stream_key: entry.stream_key,
            connection_key: entry.connection_key,
            setting: OpenStreamSetting {
                buffering,
                buffer_num: entry.buffer_num.unwrap_or(8),
            },
        });
    }

    Ok(ServerConfig {
        client_enabled,
        listeners,
        stream_settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = load_from_str("schema_version = 1\n").unwrap();
        assert!(!config.client_enabled);
        assert!(config.listeners.is_empty());
    }

    #[test]
    fn rejects_unsupported_schema_version() {
        let result = load_from_str("schema_version = 2\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn parses_listeners_and_stream_settings() {
        let text = r#"
            schema_version = 1

            [server]
            client_enabled = true

            [[server.listeners]]
            connection_key = "tcp_0"
            primary_address = "0.0.0.0:8080"
            secondary_address = "0.0.0.0:8081"

            [[stream_settings]]
            stream_key = "camera_0"
            connection_key = "tcp_0"
            buffering = "ring"
            buffer_num = 4
        "#;
        let config = load_from_str(text).unwrap();
        assert!(config.client_enabled);
        assert_eq!(config.listeners.len(), 1);
        assert_eq!(config.listeners[0].connection_key, "tcp_0");
        assert_eq!(config.listeners[0].secondary_address.as_deref(), Some("0.0.0.0:8081"));
        assert_eq!(
            config.stream_settings[0].setting.buffering,
            BufferingFormat::Overwrite
        );
    }

    #[test]
    fn rejects_unknown_buffering_format() {
        let text = r#"
            schema_version = 1
            [[stream_settings]]
            buffering = "nonsense"
        "#;
        assert!(matches!(load_from_str(text), Err(ConfigError::InvalidValue(_))));
    }
}
