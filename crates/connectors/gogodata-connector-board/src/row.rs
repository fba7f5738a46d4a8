//! A row of sensor data as sent to CODAP.

use chrono::{DateTime, SecondsFormat, Utc};
use gogodata_core::{AttributeSpec, AttributeType, CollectionLabels, CollectionSpec, DataContextSpec};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// One item: a timestamp, the source board (if known) and sensor values.
///
/// Serializes to an object keyed by attribute name, e.g.
/// `{"timestamp": "...", "board": "GoGo-1", "light": 846.0}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub timestamp: DateTime<Utc>,
    pub board: Option<String>,
    pub values: IndexMap<String, f64>,
}

impl Row {
    pub fn now(board: Option<String>, values: IndexMap<String, f64>) -> Self {
        Self {
            timestamp: Utc::now(),
            board,
            values,
        }
    }

    /// Attributes describing this row: timestamp, board, then one numeric
    /// attribute per sensor.
    pub fn attributes(&self) -> Vec<AttributeSpec> {
        let mut attrs = vec![AttributeSpec::new("timestamp", AttributeType::Date)];
        if self.board.is_some() {
            attrs.push(AttributeSpec::new("board", AttributeType::Categorical));
        }
        attrs.extend(
            self.values
                .keys()
                .map(|name| AttributeSpec::new(name.clone(), AttributeType::Numeric).titled(capitalize(name))),
        );
        attrs
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 1 + usize::from(self.board.is_some()) + self.values.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(
            "timestamp",
            &self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        if let Some(board) = &self.board {
            map.serialize_entry("board", board)?;
        }
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Where rows go in CODAP.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextLayout {
    /// Data context name.
    pub name: String,
    pub title: Option<String>,
    /// Name of the single collection.
    pub collection: String,
    pub labels: Option<CollectionLabels>,
    /// Fixed attributes. When `None` they are derived from the first row.
    pub attrs: Option<Vec<AttributeSpec>>,
}

impl ContextLayout {
    /// The `create dataContext` values for this layout.
    pub fn spec_for(&self, first_row: &Row) -> DataContextSpec {
        let attrs = self
            .attrs
            .clone()
            .unwrap_or_else(|| first_row.attributes());
        DataContextSpec {
            name: self.name.clone(),
            title: self.title.clone(),
            collections: vec![CollectionSpec {
                name: self.collection.clone(),
                labels: self.labels.clone(),
                attrs,
            }],
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
