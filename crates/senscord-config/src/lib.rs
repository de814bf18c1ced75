mod config;
mod error;
mod facade;

pub use config::{
    load_from_path, load_from_str, BufferingFormat, ListenerSetting, OpenStreamSetting,
    ServerConfig, StreamSettingEntry,
};
pub use error::ConfigError;
pub use facade::ConfigFacade;
