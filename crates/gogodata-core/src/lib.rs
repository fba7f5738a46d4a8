//! Core types for the CODAP Data-Interactive protocol.
//!
//! This crate provides the protocol primitives: resource selectors, request
//! and response envelopes, iframe-phone framing, and the shapes used to
//! describe data contexts. It performs no I/O.

mod context;
mod message;
mod resource;

pub use context::{AttributeSpec, AttributeType, CollectionLabels, CollectionSpec, DataContextSpec};
pub use message::{Action, HostRequest, PhoneFrame, Request, Response, RpcMessage, CHANNEL};
pub use resource::{parse_resource_selector, ParsedResource, ResourceError, ResourceSelector, Segment};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame configuration sent to the host during `init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameConfig {
    /// Plugin name (also used as the frame name).
    pub name: String,
    /// Human-readable frame title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Plugin version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Frame size in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_bring_to_front: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_data_context_reorg: Option<bool>,
    /// Skip registering the built-in `get interactiveState` handler.
    #[serde(default, skip_serializing)]
    pub custom_interactive_state_handler: bool,
}

impl FrameConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            version: None,
            dimensions: None,
            prevent_bring_to_front: None,
            prevent_data_context_reorg: None,
            custom_interactive_state_handler: false,
        }
    }
}

/// Pixel dimensions of the interactive frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Created, `init` not yet called.
    Preinit,
    /// Bootstrap requests sent, no reply yet.
    Init,
    /// The host has replied or called in.
    Active,
    /// The host channel went away.
    Inactive,
    /// Closed by the plugin; no further sends.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Preinit => "preinit",
            ConnectionState::Init => "init",
            ConnectionState::Active => "active",
            ConnectionState::Inactive => "inactive",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_config_wire_shape() {
        let mut config = FrameConfig::new("GoGoData");
        config.title = Some("GoGo Board".into());
        config.dimensions = Some(Dimensions {
            width: 720,
            height: 520,
        });
        config.prevent_data_context_reorg = Some(true);
        config.custom_interactive_state_handler = true;

        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            json!({
                "name": "GoGoData",
                "title": "GoGo Board",
                "dimensions": { "width": 720, "height": 520 },
                "preventDataContextReorg": true,
            })
        );
    }
}
