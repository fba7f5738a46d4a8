//! Data context descriptions for `create dataContext`.

use serde::{Deserialize, Serialize};

/// Attribute value type as understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Date,
    Numeric,
    Categorical,
}

/// One attribute (column) of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: AttributeType,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            title: None,
            kind,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Singular and plural case labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionLabels {
    pub single_case: String,
    pub plural_case: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<CollectionLabels>,
    pub attrs: Vec<AttributeSpec>,
}

/// The `values` of a `create dataContext` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataContextSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub collections: Vec<CollectionSpec>,
}

impl DataContextSpec {
    /// A context holding a single flat collection.
    pub fn single(name: impl Into<String>, collection: CollectionSpec) -> Self {
        Self {
            name: name.into(),
            title: None,
            collections: vec![collection],
        }
    }
}
