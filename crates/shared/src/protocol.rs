//! Messages exchanged with the browser over the push channel.
//!
//! Client to server: `[handle, event_type, args_or_single_value, kwargs]`.
//! Server to client: `[handle_or_"portal", name, ...values]`.

use serde::{ser::SerializeSeq, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::PortletHandle;

/// Source name used for updates that concern the portal as a whole.
pub const PORTAL_SOURCE: &str = "portal";

/// Update name used by the page script to show a message at the top.
pub const PORTAL_MESSAGE: &str = "portal_message";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("client message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("client message must be a JSON array")]
    NotAnArray,
    #[error("client message needs at least handle and event type, got {0} elements")]
    TooShort(usize),
    #[error("client message field `{0}` must be a string")]
    NotAString(&'static str),
    #[error("client message keyword arguments must be an object")]
    KwargsNotAnObject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientEventMessage {
    pub handle: String,
    pub event_type: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl ClientEventMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Array(mut items) = value else {
            return Err(ProtocolError::NotAnArray);
        };
        if items.len() < 2 {
            return Err(ProtocolError::TooShort(items.len()));
        }
        items.resize(4, Value::Null);
        let mut items = items.into_iter();

        let handle = match items.next() {
            Some(Value::String(handle)) => handle,
            _ => return Err(ProtocolError::NotAString("handle")),
        };
        let event_type = match items.next() {
            Some(Value::String(name)) => name,
            _ => return Err(ProtocolError::NotAString("event_type")),
        };
        let args = match items.next() {
            Some(Value::Array(args)) => args,
            Some(Value::Null) | None => Vec::new(),
            Some(single) => vec![single],
        };
        let kwargs = match items.next() {
            Some(Value::Object(kwargs)) => kwargs,
            Some(Value::Null) | None => Map::new(),
            Some(_) => return Err(ProtocolError::KwargsNotAnObject),
        };

        Ok(Self {
            handle,
            event_type,
            args,
            kwargs,
        })
    }
}

/// An update pushed to the browser. `source` is `None` for portal-wide updates.
#[derive(Debug, Clone, PartialEq)]
pub struct PushUpdate {
    pub source: Option<PortletHandle>,
    pub name: String,
    pub values: Vec<Value>,
}

impl PushUpdate {
    pub fn from_portlet(
        source: PortletHandle,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Self {
        Self {
            source: Some(source),
            name: name.into(),
            values,
        }
    }

    pub fn portal_message(text: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            source: None,
            name: PORTAL_MESSAGE.to_string(),
            values: vec![Value::String(text.into()), Value::String(class.into())],
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for PushUpdate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2 + self.values.len()))?;
        match &self.source {
            Some(handle) => seq.serialize_element(handle.as_str())?,
            None => seq.serialize_element(PORTAL_SOURCE)?,
        }
        seq.serialize_element(&self.name)?;
        for value in &self.values {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}
