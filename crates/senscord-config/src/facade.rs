//! Configuration façade (spec §4.9): the four lookups the server core
//! consumes. Kept separate from [`crate::config::ServerConfig`] loading so
//! the core can be handed a façade backed by something other than a file in
//! tests.

use crate::config::{ListenerSetting, OpenStreamSetting, ServerConfig, StreamSettingEntry};

pub struct ConfigFacade {
    config: ServerConfig,
}

impl ConfigFacade {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn is_client_enabled(&self) -> bool {
        self.config.client_enabled
    }

    pub fn listener_list(&self) -> &[ListenerSetting] {
        &self.config.listeners
    }

    /// Precedence (spec §4.9):
    /// 1. exact stream + exact connection
    /// 2. exact stream + default connection ("")
    /// 3. default stream ("") + exact connection
    /// 4. default stream + default connection
    /// 5. suffix match on stream key (first match wins; no ordering
    ///    guarantee among multiple suffix matches)
    pub fn stream_setting_for(&self, stream_key: &str, connection_key: &str) -> OpenStreamSetting {
        let entries = &self.config.stream_settings;

        let find = |want_stream: &str, want_conn: &str| {
            entries
                .iter()
                .find(|e| e.stream_key == want_stream && e.connection_key == want_conn)
        };

        if let Some(e) = find(stream_key, connection_key) {
            return e.setting;
        }
        if let Some(e) = find(stream_key, "") {
            return e.setting;
        }
        if let Some(e) = find("", connection_key) {
            return e.setting;
        }
        if let Some(e) = find("", "") {
            return e.setting;
        }
        if let Some(e) = entries.iter().find(|e: &&StreamSettingEntry| {
            !e.stream_key.is_empty()
                && stream_key.ends_with(e.stream_key.as_str())
                && (e.connection_key == connection_key || e.connection_key.is_empty())
        }) {
            return e.setting;
        }

        OpenStreamSetting::default()
    }

    /// Emits a warning for every configured, non-default stream key that is
    /// not a suffix of any catalog key (spec §4.9).
    pub fn verify_supported_streams(&self, catalog: &[String]) {
        for entry in &self.config.stream_settings {
            if entry.stream_key.is_empty() {
                continue;
            }
            let supported = catalog.iter().any(|k| k.ends_with(entry.stream_key.as_str()));
            if !supported {
                tracing::warn!(
                    stream_key = entry.stream_key.as_str(),
                    "configured stream key does not match any entry in the stream catalog"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferingFormat;

    fn setting(buffer_num: u32) -> OpenStreamSetting {
        OpenStreamSetting {
            buffering: BufferingFormat::Discard,
            buffer_num,
        }
    }

    fn facade_with(entries: Vec<StreamSettingEntry>) -> ConfigFacade {
        ConfigFacade::new(ServerConfig {
            client_enabled: false,
            listeners: vec![],
            stream_settings: entries,
        })
    }

    #[test]
    fn exact_stream_and_connection_wins_over_everything() {
        let facade = facade_with(vec![
            StreamSettingEntry {
                stream_key: "camera_0".into(),
                connection_key: "".into(),
                setting: setting(1),
            },
            StreamSettingEntry {
                stream_key: "camera_0".into(),
                connection_key: "tcp_0".into(),
                setting: setting(2),
            },
            StreamSettingEntry {
                stream_key: "".into(),
                connection_key: "".into(),
                setting: setting(3),
            },
        ]);
        assert_eq!(facade.stream_setting_for("camera_0", "tcp_0").buffer_num, 2);
    }

    #[test]
    fn falls_back_through_precedence_chain() {
        let facade = facade_with(vec![StreamSettingEntry {
            stream_key: "".into(),
            connection_key: "".into(),
            setting: setting(3),
        }]);
        assert_eq!(facade.stream_setting_for("camera_0", "tcp_0").buffer_num, 3);
    }

    #[test]
    fn suffix_match_used_as_last_resort() {
        let facade = facade_with(vec![StreamSettingEntry {
            stream_key: "_0".into(),
            connection_key: "".into(),
            setting: setting(9),
        }]);
        assert_eq!(facade.stream_setting_for("camera_0", "tcp_0").buffer_num, 9);
    }

    #[test]
    fn no_match_falls_back_to_default() {
        let facade = facade_with(vec![]);
        assert_eq!(
            facade.stream_setting_for("camera_0", "tcp_0"),
            OpenStreamSetting::default()
        );
    }
}
