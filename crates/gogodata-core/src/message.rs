//! Protocol messages.
//!
//! Requests and responses follow the CODAP Data-Interactive API. The
//! iframe-phone RPC frames wrap them on the wire.

use crate::ResourceSelector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The iframe-phone channel CODAP listens on.
pub const CHANNEL: &str = "data-interactive";

/// Request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Get,
    Create,
    Update,
    Delete,
    Notify,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Notify => "notify",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request sent from the plugin to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub action: Action,
    pub resource: ResourceSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
}

impl Request {
    pub fn new(action: Action, resource: ResourceSelector) -> Self {
        Self {
            action,
            resource,
            values: None,
        }
    }

    pub fn get(resource: ResourceSelector) -> Self {
        Self::new(Action::Get, resource)
    }

    pub fn create(resource: ResourceSelector, values: Value) -> Self {
        Self::new(Action::Create, resource).with_values(values)
    }

    pub fn update(resource: ResourceSelector, values: Value) -> Self {
        Self::new(Action::Update, resource).with_values(values)
    }

    pub fn delete(resource: ResourceSelector) -> Self {
        Self::new(Action::Delete, resource)
    }

    pub fn notify(resource: ResourceSelector, values: Value) -> Self {
        Self::new(Action::Notify, resource).with_values(values)
    }

    pub fn with_values(mut self, values: Value) -> Self {
        self.values = Some(values);
        self
    }
}

/// A request initiated by the host.
///
/// The resource stays a raw string: the host owns that grammar and the
/// plugin only matches against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRequest {
    pub action: Action,
    #[serde(default)]
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
}

/// A reply to either side's request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            values: None,
        }
    }

    pub fn ok_with(values: Value) -> Self {
        Self {
            success: true,
            values: Some(values),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            values: None,
        }
    }

    /// The host's `values.error` message, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.values.as_ref()?.get("error")?.as_str()
    }

    /// Look up a field of `values`.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.as_ref()?.get(key)
    }
}

/// An iframe-phone RPC message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "camelCase")]
pub enum RpcMessage {
    /// A call expecting a `ReturnValue` with the same uuid.
    Call { uuid: u64, value: Value },
    /// The reply to a call.
    ReturnValue {
        uuid: u64,
        #[serde(default)]
        value: Value,
    },
}

/// A frame as posted on the iframe-phone channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneFrame {
    #[serde(rename = "type")]
    pub channel: String,
    pub content: RpcMessage,
}

impl PhoneFrame {
    pub fn new(content: RpcMessage) -> Self {
        Self {
            channel: CHANNEL.to_string(),
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape() {
        let request = Request::create(
            ResourceSelector::data_context("GoGoBoard")
                .and_then(|s| s.then("item"))
                .unwrap(),
            json!([{ "value": 1.5 }]),
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "action": "create",
                "resource": "dataContext[GoGoBoard].item",
                "values": [{ "value": 1.5 }],
            })
        );
    }

    #[test]
    fn get_request_omits_values() {
        let request = Request::get(ResourceSelector::leaf("interactiveFrame").unwrap());
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "action": "get", "resource": "interactiveFrame" })
        );
    }

    #[test]
    fn response_error_message() {
        let response: Response =
            serde_json::from_value(json!({ "success": false, "values": { "error": "nope" } }))
                .unwrap();
        assert!(!response.success);
        assert_eq!(response.error_message(), Some("nope"));
    }

    #[test]
    fn host_request_keeps_raw_resource() {
        let request: HostRequest = serde_json::from_value(json!({
            "action": "notify",
            "resource": "dataContextChangeNotice[a.b]",
            "values": { "operation": "createCases" },
        }))
        .unwrap();
        assert_eq!(request.action, Action::Notify);
        assert_eq!(request.resource, "dataContextChangeNotice[a.b]");
    }

    #[test]
    fn phone_frame_shape() {
        let frame = PhoneFrame::new(RpcMessage::Call {
            uuid: 7,
            value: json!({ "action": "get", "resource": "interactiveFrame" }),
        });
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "type": "data-interactive",
                "content": {
                    "messageType": "call",
                    "uuid": 7,
                    "value": { "action": "get", "resource": "interactiveFrame" },
                },
            })
        );
    }
}
