use log::debug;
use serde_json::{ Map, Value as JsonValue };

use super::AgentError;
use crate::models::agent::{
    message_id_from_value,
    text_from_value,
    AgentEvent,
    AgentReply,
    ToolCallRecord,
};

pub const NO_RESPONSE_TEXT: &str = "No response received.";
const UNKNOWN_TOOL: &str = "unknown";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Interpretation {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub parent_message_id: Option<String>,
}

impl Interpretation {
    pub fn no_response() -> Self {
        Self { text: NO_RESPONSE_TEXT.to_string(), ..Default::default() }
    }

    pub fn from_error(err: &AgentError) -> Self {
        Self { text: format!("Error calling agent: {}", err), ..Default::default() }
    }
}

/// Turns the raw reply cell into structured data. Strings hold encoded JSON
/// and are decoded here; `None` means the reply was absent or empty.
pub fn decode_reply(raw: Option<JsonValue>) -> Result<Option<JsonValue>, AgentError> {
    match raw {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(encoded)) => {
            if encoded.trim().is_empty() {
                return Ok(None);
            }
            let decoded: JsonValue = serde_json
                ::from_str(&encoded)
                .map_err(|e| AgentError::MalformedReply(e.to_string()))?;
            Ok(Some(decoded).filter(|v| !v.is_null()))
        }
        Some(value) => Ok(Some(value)),
    }
}

pub fn classify_reply(value: &JsonValue) -> AgentReply {
    let object = match value.as_object() {
        Some(o) => o,
        None => {
            return AgentReply::Unrecognized;
        }
    };

    if let Some(JsonValue::Array(events)) = object.get("events") {
        return AgentReply::Events(events.iter().map(parse_event).collect());
    }

    if let Some(response) = object.get("response") {
        return AgentReply::Flat {
            text: text_of(response),
            message_id: object.get("message_id").and_then(message_id_from_value),
        };
    }

    if let Some(text) = object.get("text") {
        return AgentReply::Flat { text: text_of(text), message_id: None };
    }

    debug!("Unrecognized agent reply shape with keys: {:?}", keys_of(object));
    AgentReply::Unrecognized
}

pub fn interpret_reply(reply: &AgentReply) -> Interpretation {
    match reply {
        AgentReply::Events(events) => interpret_events(events),
        AgentReply::Flat { text, message_id } =>
            Interpretation {
                text: text.clone(),
                tool_calls: Vec::new(),
                parent_message_id: message_id.clone(),
            },
        AgentReply::Unrecognized => Interpretation::default(),
    }
}

/// Full pipeline from the raw cell to what a turn renders.
pub fn interpret_raw(raw: Option<JsonValue>) -> Interpretation {
    match decode_reply(raw) {
        Ok(Some(value)) => interpret_reply(&classify_reply(&value)),
        Ok(None) => Interpretation::no_response(),
        Err(e) => Interpretation::from_error(&e),
    }
}

fn interpret_events(events: &[AgentEvent]) -> Interpretation {
    let mut out = Interpretation::default();

    for event in events {
        match event {
            AgentEvent::TextDelta { delta } => out.text.push_str(delta),
            AgentEvent::Text { text: Some(text) } => {
                out.text = text.clone();
            }
            AgentEvent::Text { text: None } => {}
            AgentEvent::ToolCall { tool_name, status } => {
                out.tool_calls.push(ToolCallRecord {
                    tool: tool_name.clone().unwrap_or_else(|| UNKNOWN_TOOL.to_string()),
                    status: status.clone().unwrap_or_default(),
                });
            }
            AgentEvent::Response { message_id: Some(id) } => {
                out.parent_message_id = Some(id.clone());
            }
            AgentEvent::Response { message_id: None } | AgentEvent::Unknown => {}
        }
    }

    out
}

fn parse_event(value: &JsonValue) -> AgentEvent {
    match serde_json::from_value::<AgentEvent>(value.clone()) {
        Ok(event) => event,
        Err(e) => {
            debug!("Skipping unparseable agent event: {}", e);
            AgentEvent::Unknown
        }
    }
}

fn text_of(value: &JsonValue) -> String {
    text_from_value(value).unwrap_or_default()
}

fn keys_of(object: &Map<String, JsonValue>) -> Vec<&str> {
    object.keys().map(|k| k.as_str()).collect()
}
