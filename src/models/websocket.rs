use serde::{ Serialize, Deserialize };
use super::agent::ToolCallRecord;
use super::chat::ChatMessage;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    #[serde(rename = "sample")] Sample {
        index: usize,
    },
    #[serde(rename = "reset")]
    Reset,
    #[serde(rename = "history")]
    History,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session")] Session {
        thread_id: String,
        thread_label: String,
        title: String,
        caption: String,
        samples: Vec<String>,
    },
    #[serde(rename = "response")] Response {
        content: String,
        tool_calls: Vec<ToolCallRecord>,
        timestamp: i64,
    },
    #[serde(rename = "history")] History {
        thread_id: String,
        messages: Vec<ChatMessage>,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
    #[serde(rename = "processing")]
    Processing,
}
