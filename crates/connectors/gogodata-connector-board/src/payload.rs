//! Sensor payload parsing.
//!
//! Serial lines carry three readings as `s1,s2,s3` (or `;`-separated), or
//! as JSON (`{"s1":..}`, `{"sensor1":..}`, `[a, b, c]`). MQTT messages
//! arrive on `plog/gogodata/<board>/<sensor>` with a `key=value` payload.

use crate::Reading;
use serde_json::Value;

/// Topic prefix GoGo Boards publish under.
pub const TOPIC_PREFIX: &str = "plog/gogodata";

/// Error parsing a sensor payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("empty payload")]
    Empty,
    #[error("no field separator in {0:?}")]
    NoSeparator(String),
    #[error("expected 3 fields, got {0}")]
    TooFewFields(usize),
    #[error("not a number: {0:?}")]
    NotANumber(String),
    #[error("no value in JSON payload for sensor {0}")]
    MissingValue(usize),
}

/// Parse a serial line into `[sensor1, sensor2, sensor3]`.
pub fn parse_serial_line(line: &str) -> Result<[f64; 3], PayloadError> {
    let text = line.trim();
    if text.is_empty() {
        return Err(PayloadError::Empty);
    }

    let looks_like_json = (text.starts_with('{') && text.ends_with('}'))
        || (text.starts_with('[') && text.ends_with(']'));
    if looks_like_json {
        if let Ok(json) = serde_json::from_str::<Value>(text) {
            return parse_json(&json);
        }
    }

    let separator = if text.contains(',') {
        ','
    } else if text.contains(';') {
        ';'
    } else {
        return Err(PayloadError::NoSeparator(text.to_string()));
    };

    let fields: Vec<&str> = text
        .split(separator)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    if fields.len() < 3 {
        return Err(PayloadError::TooFewFields(fields.len()));
    }

    let mut readings = [0.0; 3];
    for (slot, field) in readings.iter_mut().zip(&fields) {
        *slot = parse_number(field)?;
    }
    Ok(readings)
}

fn parse_json(json: &Value) -> Result<[f64; 3], PayloadError> {
    let mut readings = [0.0; 3];
    for (i, slot) in readings.iter_mut().enumerate() {
        let short = format!("s{}", i + 1);
        let long = format!("sensor{}", i + 1);
        let value = json
            .get(&short)
            .or_else(|| json.get(&long))
            .or_else(|| json.get(i))
            .ok_or(PayloadError::MissingValue(i + 1))?;
        *slot = match value {
            Value::Number(n) => n.as_f64().ok_or_else(|| PayloadError::NotANumber(n.to_string()))?,
            Value::String(s) => parse_number(s.trim())?,
            other => return Err(PayloadError::NotANumber(other.to_string())),
        };
    }
    Ok(readings)
}

fn parse_number(field: &str) -> Result<f64, PayloadError> {
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PayloadError::NotANumber(field.to_string()))
}

/// Board and sensor named by an MQTT topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAddress<'a> {
    pub board: &'a str,
    pub sensor: &'a str,
}

/// Split `plog/gogodata/<board>/<sensor>`.
pub fn parse_topic(topic: &str) -> Option<TopicAddress<'_>> {
    let rest = topic.strip_prefix(TOPIC_PREFIX)?.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let board = parts.next().filter(|b| !b.is_empty())?;
    let sensor = parts.next().filter(|s| !s.is_empty())?;
    Some(TopicAddress { board, sensor })
}

/// Extract the number following the first `=` in a payload like
/// `GoGo-1 light=846.00`.
pub fn parse_sensor_value(payload: &str) -> Option<f64> {
    payload.match_indices('=').find_map(|(i, _)| {
        let rest = &payload[i + 1..];
        let sign = usize::from(rest.starts_with('-'));
        let digits = rest[sign..]
            .char_indices()
            .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
            .last()
            .map(|(j, c)| sign + j + c.len_utf8())?;
        // Cut at a second decimal point.
        let number = &rest[..digits];
        let end = number
            .match_indices('.')
            .nth(1)
            .map_or(number.len(), |(j, _)| j);
        number[..end].parse::<f64>().ok()
    })
}

/// Which MQTT messages become readings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicFilter {
    /// Only boards whose id starts with this, e.g. `GoGo-`.
    pub board_prefix: Option<String>,
    /// Only this board.
    pub board: Option<String>,
}

impl TopicFilter {
    /// Turn a message into a reading, or `None` if it is filtered out or
    /// malformed.
    pub fn reading(&self, topic: &str, payload: &[u8]) -> Option<Reading> {
        let address = parse_topic(topic)?;
        if let Some(prefix) = &self.board_prefix {
            if !address.board.starts_with(prefix.as_str()) {
                return None;
            }
        }
        if let Some(board) = &self.board {
            if address.board != board.as_str() {
                return None;
            }
        }

        let text = String::from_utf8_lossy(payload);
        let Some(value) = parse_sensor_value(text.trim()) else {
            tracing::warn!("Unrecognized payload on {}: {:?}", topic, text);
            return None;
        };
        Some(Reading {
            board: address.board.to_string(),
            sensor: address.sensor.to_string(),
            value,
        })
    }
}
