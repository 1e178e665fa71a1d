//! Raw webhook envelopes as posted by the chat gateway.
//!
//! The gateway's callbacks are weakly typed: strings sometimes arrive wrapped
//! as `{"string": "..."}`, ids arrive as numbers or numeric strings, and the
//! same field has a short snake-case name in some deployments and the
//! gateway's native PascalCase name in others. Every accessor here tolerates
//! all of those shapes and returns `None` for anything else, so predicates
//! can treat malformed input as "does not match".

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Top-level `typename` discriminants.
pub mod typename {
    pub const NEW_MESSAGE: &str = "AddMsg";
    pub const CONTACT_CHANGED: &str = "ModContacts";
    pub const CONTACT_REMOVED: &str = "DelContacts";
    pub const OFFLINE: &str = "Offline";

    /// Discriminants that produce an `UNKNOWN` record when no classifier
    /// recognizes the envelope. Everything else is gateway chatter.
    pub const FALLBACK: &[&str] = &[NEW_MESSAGE, CONTACT_CHANGED, CONTACT_REMOVED, OFFLINE];
}

/// Numeric `sub_type` discriminants of `AddMsg` payloads.
pub mod sub_type {
    pub const TEXT: i64 = 1;
    pub const IMAGE: i64 = 3;
    pub const VOICE: i64 = 34;
    pub const FRIEND_REQUEST: i64 = 37;
    pub const CARD: i64 = 42;
    pub const VIDEO: i64 = 43;
    pub const EMOJI: i64 = 47;
    pub const LOCATION: i64 = 48;
    /// Rich app message; the concrete kind lives in the nested `appmsg/type`.
    pub const APP: i64 = 49;
    pub const SYSTEM_NOTICE: i64 = 10000;
    pub const SYSTEM_MESSAGE: i64 = 10002;
}

const TYPENAME: &[&str] = &["typename", "TypeName"];
const DEVICE_ID: &[&str] = &["device_id", "Appid"];
const SESSION_WXID: &[&str] = &["wxid", "Wxid"];
const PAYLOAD: &[&str] = &["payload", "Data"];
const SUB_TYPE: &[&str] = &["sub_type", "MsgType"];
const CONTENT: &[&str] = &["content", "Content"];
const FROM: &[&str] = &["from", "FromUserName"];
const TO: &[&str] = &["to", "ToUserName"];
const MSG_ID: &[&str] = &["msg_id", "MsgId"];
const NEW_MSG_ID: &[&str] = &["new_msg_id", "NewMsgId"];
const CREATE_TIME: &[&str] = &["create_time", "CreateTime"];
const MSG_SOURCE: &[&str] = &["msg_source", "MsgSource"];
const PUSH_CONTENT: &[&str] = &["push_content", "PushContent"];
const CONTACT_ID: &[&str] = &["user_name", "UserName"];

/// One webhook notification, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(Value);

impl Envelope {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn typename(&self) -> Option<&str> {
        text_field(&self.0, TYPENAME)
    }

    pub fn device_id(&self) -> Option<&str> {
        text_field(&self.0, DEVICE_ID)
    }

    pub fn session_wxid(&self) -> Option<&str> {
        text_field(&self.0, SESSION_WXID)
    }

    /// The nested payload (`payload` / `Data`), whatever its shape.
    pub fn payload(&self) -> Option<&Value> {
        field(&self.0, PAYLOAD)
    }

    pub fn sub_type(&self) -> Option<i64> {
        self.payload().and_then(|p| int_field(p, SUB_TYPE))
    }

    pub fn content(&self) -> Option<&str> {
        self.payload().and_then(|p| text_field(p, CONTENT))
    }

    pub fn from_id(&self) -> Option<&str> {
        self.payload().and_then(|p| text_field(p, FROM))
    }

    pub fn to_id(&self) -> Option<&str> {
        self.payload().and_then(|p| text_field(p, TO))
    }

    pub fn message_id(&self) -> Option<String> {
        self.payload().and_then(|p| id_field(p, MSG_ID))
    }

    /// Redelivery-safe id; stable across gateway retries.
    pub fn new_message_id(&self) -> Option<String> {
        self.payload().and_then(|p| id_field(p, NEW_MSG_ID))
    }

    pub fn created_at(&self) -> Option<i64> {
        self.payload().and_then(|p| int_field(p, CREATE_TIME))
    }

    pub fn msg_source(&self) -> Option<&str> {
        self.payload().and_then(|p| text_field(p, MSG_SOURCE))
    }

    pub fn push_content(&self) -> Option<&str> {
        self.payload().and_then(|p| text_field(p, PUSH_CONTENT))
    }

    /// Contact id carried by contact events. `DelContacts` payloads are
    /// sometimes the bare id instead of an object.
    pub fn contact_id(&self) -> Option<&str> {
        let payload = self.payload()?;
        text_field(payload, CONTACT_ID)
            .or_else(|| as_text(payload))
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn is_typename(&self, expected: &str) -> bool {
        self.typename() == Some(expected)
    }

    /// `AddMsg` with the given `sub_type`.
    #[must_use]
    pub fn is_new_message(&self, expected: i64) -> bool {
        self.is_typename(typename::NEW_MESSAGE) && self.sub_type() == Some(expected)
    }
}

impl From<Value> for Envelope {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// First non-null value among `keys` in an object.
pub fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = value.as_object()?;
    keys.iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

/// String field, unwrapping the gateway's `{"string": ...}` form.
pub fn text_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    field(value, keys).and_then(as_text)
}

/// Integer field given as a number or a numeric string.
pub fn int_field(value: &Value, keys: &[&str]) -> Option<i64> {
    field(value, keys).and_then(as_int)
}

/// Identifier field rendered as a string, whether sent as number or string.
pub fn id_field(value: &Value, keys: &[&str]) -> Option<String> {
    match field(value, keys)? {
        Value::Number(n) => Some(n.to_string()),
        other => as_text(other)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}

fn as_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("string").and_then(Value::as_str),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        other => as_text(other).and_then(|s| s.trim().parse().ok()),
    }
}
