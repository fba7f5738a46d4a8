//! Daemon configuration file.
//!
//! Every field has a default, so an empty file (or none at all) is valid.

use anyhow::Context;
use gogodata_client::DEFAULT_TIMEOUT;
use gogodata_connector_board::{BoardAliases, ContextLayout, TopicFilter};
use gogodata_core::{CollectionLabels, Dimensions, FrameConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub codap: CodapConfig,
    pub data_context: DataContextConfig,
    pub mqtt: MqttConfig,
    pub serial: SerialConfig,
    /// Board id → display name.
    pub boards: HashMap<String, String>,
}

impl Config {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn aliases(&self) -> BoardAliases {
        BoardAliases::new(self.boards.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CodapConfig {
    /// WebSocket URL of the relay running inside the CODAP iframe.
    pub url: String,
    pub timeout_ms: u64,
    /// Seconds between connection attempts while CODAP is unavailable.
    pub retry_secs: u64,
    pub name: String,
    pub title: String,
    pub version: String,
    pub width: u32,
    pub height: u32,
    pub prevent_data_context_reorg: bool,
}

impl Default for CodapConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765".into(),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            retry_secs: 5,
            name: "GoGoData".into(),
            title: "GoGoData".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            width: 720,
            height: 520,
            prevent_data_context_reorg: true,
        }
    }
}

impl CodapConfig {
    pub fn frame(&self) -> FrameConfig {
        let mut frame = FrameConfig::new(&self.name);
        frame.title = Some(self.title.clone());
        frame.version = Some(self.version.clone());
        frame.dimensions = Some(Dimensions {
            width: self.width,
            height: self.height,
        });
        frame.prevent_data_context_reorg = Some(self.prevent_data_context_reorg);
        frame
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataContextConfig {
    pub name: String,
    pub title: Option<String>,
    pub collection: String,
    pub single_case: Option<String>,
    pub plural_case: Option<String>,
}

impl Default for DataContextConfig {
    fn default() -> Self {
        Self {
            name: "GoGoBoard".into(),
            title: None,
            collection: "Sensor data".into(),
            single_case: None,
            plural_case: None,
        }
    }
}

impl DataContextConfig {
    pub fn layout(&self) -> ContextLayout {
        let labels = match (&self.single_case, &self.plural_case) {
            (Some(single), Some(plural)) => Some(CollectionLabels {
                single_case: single.clone(),
                plural_case: plural.clone(),
            }),
            _ => None,
        };
        ContextLayout {
            name: self.name.clone(),
            title: self.title.clone(),
            collection: self.collection.clone(),
            labels,
            attrs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
    pub keep_alive_secs: u64,
    pub reconnect_ms: u64,
    pub board_prefix: Option<String>,
    /// Only forward this board.
    pub board: Option<String>,
    /// Quiet period before a board's readings become a row.
    pub debounce_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            tls: false,
            client_id: "gogodata".into(),
            username: None,
            password: None,
            topic: "plog/gogodata/#".into(),
            keep_alive_secs: 60,
            reconnect_ms: 1000,
            board_prefix: Some("GoGo-".into()),
            board: None,
            debounce_ms: 60,
        }
    }
}

impl MqttConfig {
    pub fn settings(&self) -> gogodata_connector_board::mqtt::MqttSettings {
        gogodata_connector_board::mqtt::MqttSettings {
            host: self.host.clone(),
            port: self.port,
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            tls: self.tls,
            topic: self.topic.clone(),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            reconnect_delay: Duration::from_millis(self.reconnect_ms),
            filter: TopicFilter {
                board_prefix: self.board_prefix.clone(),
                board: self.board.clone(),
            },
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub device: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.codap.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.mqtt.debounce(), Duration::from_millis(60));
        assert_eq!(config.data_context.layout().name, "GoGoBoard");
    }

    #[test]
    fn parses_full_file() {
        let config: Config = toml::from_str(
            r#"
            [codap]
            url = "ws://codap.local:9000"
            width = 400
            height = 300

            [data_context]
            name = "GoGoBoardData"
            collection = "readings"
            single_case = "reading"
            plural_case = "readings"

            [mqtt]
            host = "broker.example"
            port = 8883
            tls = true
            username = "admin"
            board = "GoGo-99A5FCE8"
            debounce_ms = 80

            [serial]
            device = "/dev/ttyACM0"

            [boards]
            "GoGo-99A5FCE8" = "Board #1"
            "#,
        )
        .unwrap();

        let frame = config.codap.frame();
        assert_eq!(frame.dimensions, Some(Dimensions { width: 400, height: 300 }));
        assert_eq!(frame.name, "GoGoData");

        let layout = config.data_context.layout();
        assert_eq!(layout.labels.unwrap().single_case, "reading");

        let settings = config.mqtt.settings();
        assert!(settings.tls);
        assert_eq!(settings.filter.board.as_deref(), Some("GoGo-99A5FCE8"));
        assert_eq!(settings.filter.board_prefix.as_deref(), Some("GoGo-"));
        assert_eq!(config.mqtt.debounce(), Duration::from_millis(80));

        assert_eq!(config.serial.device, Some(PathBuf::from("/dev/ttyACM0")));
        assert_eq!(config.aliases().display_name("GoGo-99A5FCE8"), "Board #1");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/gogodata.toml"))).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}
