//! Command, response, event and lifecycle message shapes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::SerializedError;
use crate::guid::Guid;

/// Reserved event name announcing a new node to the controller.
pub const CREATE_METHOD: &str = "__create__";
/// Reserved event name reparenting an existing node.
pub const ADOPT_METHOD: &str = "__adopt__";
/// Reserved event name announcing a node's disposal.
pub const DISPOSE_METHOD: &str = "__dispose__";

/// An incoming command from the controller, expecting exactly one
/// [`Response`] with the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Request correlation id, unique per connection.
    pub id: u64,
    /// Target node guid.
    pub guid: Guid,
    /// Method name to invoke on the target node.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
    /// Raw call metadata. Validated into a [`WireMetadata`](crate::WireMetadata)
    /// during dispatch so a malformed record fails that one call instead of
    /// poisoning the whole message.
    #[serde(default)]
    pub metadata: Value,
}

/// Response to a [`Command`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SerializedError>,
    /// Compressed call log, attached on error only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<Vec<String>>,
}

impl Response {
    /// Bare acknowledgement carrying neither result nor error.
    pub fn ack(id: u64) -> Self {
        Self {
            id,
            result: None,
            error: None,
            log: None,
        }
    }

    /// Successful response with a result payload.
    pub fn result(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
            log: None,
        }
    }

    /// Error response.
    pub fn error(id: u64, error: SerializedError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
            log: None,
        }
    }
}

/// A one-way event, server to controller. Lifecycle messages use the
/// reserved method names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Guid the event is addressed to (the emitting node, or the parent for
    /// `__create__`).
    pub guid: Guid,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Announce a newly created node, addressed to its parent.
    pub fn create(parent: &Guid, kind: &str, guid: &Guid, initializer: Value) -> Self {
        Self {
            guid: parent.clone(),
            method: CREATE_METHOD.to_string(),
            params: json!({ "type": kind, "initializer": initializer, "guid": guid }),
        }
    }

    /// Announce that `child` now belongs to `new_parent`.
    pub fn adopt(new_parent: &Guid, child: &Guid) -> Self {
        Self {
            guid: new_parent.clone(),
            method: ADOPT_METHOD.to_string(),
            params: json!({ "guid": child }),
        }
    }

    /// Announce a node's disposal. `reason` is `"gc"` for evictions.
    pub fn dispose(guid: &Guid, reason: Option<&str>) -> Self {
        let params = match reason {
            Some(reason) => json!({ "reason": reason }),
            None => json!({}),
        };
        Self {
            guid: guid.clone(),
            method: DISPOSE_METHOD.to_string(),
            params,
        }
    }

    /// Whether this event uses one of the reserved lifecycle method names.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self.method.as_str(),
            CREATE_METHOD | ADOPT_METHOD | DISPOSE_METHOD
        )
    }
}

/// Any server-to-controller record handed to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Response(Response),
    Event(Event),
}

impl OutgoingMessage {
    /// The event, if this is one.
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            OutgoingMessage::Event(event) => Some(event),
            OutgoingMessage::Response(_) => None,
        }
    }

    /// The response, if this is one.
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            OutgoingMessage::Response(response) => Some(response),
            OutgoingMessage::Event(_) => None,
        }
    }
}

impl From<Response> for OutgoingMessage {
    fn from(response: Response) -> Self {
        OutgoingMessage::Response(response)
    }
}

impl From<Event> for OutgoingMessage {
    fn from(event: Event) -> Self {
        OutgoingMessage::Event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_deserializes_with_defaults() {
        let cmd: Command =
            serde_json::from_value(json!({ "id": 3, "guid": "page@1", "method": "reload" }))
                .unwrap();
        assert_eq!(cmd.id, 3);
        assert_eq!(cmd.guid, "page@1");
        assert_eq!(cmd.params, Value::Null);
        assert_eq!(cmd.metadata, Value::Null);
    }

    #[test]
    fn create_event_shape() {
        let event = Event::create(
            &Guid::root(),
            "Browser",
            &Guid::new("browser@1"),
            json!({ "version": "1.0" }),
        );
        assert_eq!(event.guid, "");
        assert_eq!(event.method, CREATE_METHOD);
        assert_eq!(event.params["type"], "Browser");
        assert_eq!(event.params["guid"], "browser@1");
        assert_eq!(event.params["initializer"]["version"], "1.0");
        assert!(event.is_lifecycle());
    }

    #[test]
    fn dispose_event_omits_absent_reason() {
        let event = Event::dispose(&Guid::new("page@1"), None);
        assert_eq!(event.params, json!({}));
        let event = Event::dispose(&Guid::new("page@1"), Some("gc"));
        assert_eq!(event.params["reason"], "gc");
    }

    #[test]
    fn response_error_serialization() {
        let response = Response::error(7, SerializedError::target_closed(None));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["error"]["error"]["name"], "TargetClosedError");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn outgoing_message_untagged() {
        let json = serde_json::to_value(OutgoingMessage::from(Response::ack(1))).unwrap();
        assert_eq!(json, json!({ "id": 1 }));
        let json = serde_json::to_value(OutgoingMessage::from(Event::adopt(
            &Guid::new("ctx@1"),
            &Guid::new("dl@2"),
        )))
        .unwrap();
        assert_eq!(json["method"], ADOPT_METHOD);
    }
}
