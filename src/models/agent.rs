use serde::{ Serialize, Deserialize, Deserializer };
use serde_json::Value as JsonValue;
use super::chat::Role;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestMessage {
    pub role: Role,
    pub content: String,
}

/// Advisory limits the remote service enforces on a single call.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Budget {
    pub seconds: u32,
    pub tokens: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentRequest {
    pub messages: Vec<RequestMessage>,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub tool: String,
    pub status: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum AgentEvent {
    #[serde(rename = "response.text.delta")] TextDelta {
        #[serde(default, deserialize_with = "lenient_delta")]
        delta: String,
    },
    #[serde(rename = "response.text")] Text {
        #[serde(default, deserialize_with = "lenient_text")]
        text: Option<String>,
    },
    #[serde(rename = "response.tool_call")] ToolCall {
        #[serde(default, deserialize_with = "lenient_text")]
        tool_name: Option<String>,
        #[serde(default, deserialize_with = "lenient_text")]
        status: Option<String>,
    },
    #[serde(rename = "response")] Response {
        #[serde(default, deserialize_with = "lenient_message_id")]
        message_id: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Server message ids are normally strings; numeric ids are kept as their
/// decimal text and anything else is dropped.
pub(crate) fn message_id_from_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Text fields keep strings as-is and any other non-null value as its JSON text.
pub(crate) fn text_from_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where D: Deserializer<'de>
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(text_from_value))
}

fn lenient_delta<'de, D>(deserializer: D) -> Result<String, D::Error>
    where D: Deserializer<'de>
{
    Ok(lenient_text(deserializer)?.unwrap_or_default())
}

fn lenient_message_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where D: Deserializer<'de>
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(message_id_from_value))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentReply {
    Events(Vec<AgentEvent>),
    Flat {
        text: String,
        message_id: Option<String>,
    },
    Unrecognized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_absent_optionals() {
        let request = AgentRequest {
            messages: vec![RequestMessage { role: Role::User, content: "hi".into() }],
            thread_id: "t1".into(),
            parent_message_id: None,
            stream: None,
            budget: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "messages": [{ "role": "user", "content": "hi" }],
                "thread_id": "t1"
            })
        );
    }

    #[test]
    fn request_carries_parent_stream_and_budget() {
        let request = AgentRequest {
            messages: vec![RequestMessage { role: Role::User, content: "hi".into() }],
            thread_id: "t1".into(),
            parent_message_id: Some("m1".into()),
            stream: Some(true),
            budget: Some(Budget { seconds: 30, tokens: 16000 }),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["parent_message_id"], "m1");
        assert_eq!(value["stream"], true);
        assert_eq!(value["budget"], json!({ "seconds": 30, "tokens": 16000 }));
    }

    #[test]
    fn events_parse_by_type_tag() {
        let delta: AgentEvent = serde_json
            ::from_value(json!({ "type": "response.text.delta", "delta": "Hel" }))
            .unwrap();
        assert_eq!(delta, AgentEvent::TextDelta { delta: "Hel".into() });

        let tool: AgentEvent = serde_json
            ::from_value(json!({ "type": "response.tool_call" }))
            .unwrap();
        assert_eq!(tool, AgentEvent::ToolCall { tool_name: None, status: None });

        let other: AgentEvent = serde_json
            ::from_value(json!({ "type": "response.thinking", "text": "hmm" }))
            .unwrap();
        assert_eq!(other, AgentEvent::Unknown);
    }

    #[test]
    fn numeric_message_id_is_kept_as_text() {
        let event: AgentEvent = serde_json
            ::from_value(json!({ "type": "response", "message_id": 42 }))
            .unwrap();
        assert_eq!(event, AgentEvent::Response { message_id: Some("42".into()) });
    }

    #[test]
    fn non_string_event_fields_keep_their_json_text() {
        let tool: AgentEvent = serde_json
            ::from_value(json!({ "type": "response.tool_call", "tool_name": "search", "status": 7 }))
            .unwrap();
        assert_eq!(tool, AgentEvent::ToolCall {
            tool_name: Some("search".into()),
            status: Some("7".into()),
        });

        let delta: AgentEvent = serde_json
            ::from_value(json!({ "type": "response.text.delta", "delta": null }))
            .unwrap();
        assert_eq!(delta, AgentEvent::TextDelta { delta: String::new() });

        let text: AgentEvent = serde_json
            ::from_value(json!({ "type": "response.text", "text": { "table": [1, 2] } }))
            .unwrap();
        assert_eq!(text, AgentEvent::Text { text: Some(r#"{"table":[1,2]}"#.into()) });
    }
}
