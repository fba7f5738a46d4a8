//! GoGo Board connector.
//!
//! Reads sensor data from a board (USB serial or MQTT), shapes it into
//! rows and delivers them to a CODAP data context.

pub mod debounce;
pub mod mqtt;
pub mod payload;
mod row;
pub mod serial;
mod sink;

pub use payload::{PayloadError, TopicFilter};
pub use row::{ContextLayout, Row};
pub use sink::CodapSink;

use gogodata_client::ClientError;
use std::collections::HashMap;

/// A single sensor value from a board.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub board: String,
    pub sensor: String,
    pub value: f64,
}

/// Friendly names for board ids, used in logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardAliases(HashMap<String, String>);

impl BoardAliases {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self(aliases)
    }

    pub fn display_name<'a>(&'a self, board: &'a str) -> &'a str {
        self.0.get(board).map_or(board, String::as_str)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_fall_back_to_id() {
        let aliases = BoardAliases::new(HashMap::from([(
            "GoGo-99A5FCE8".to_string(),
            "Board #1".to_string(),
        )]));
        assert_eq!(aliases.display_name("GoGo-99A5FCE8"), "Board #1");
        assert_eq!(aliases.display_name("GoGo-0C47ED10"), "GoGo-0C47ED10");
    }
}
