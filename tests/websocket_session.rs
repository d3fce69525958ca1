use async_trait::async_trait;
use cortex_agent_chat::agent::{ ChatAgent, TurnSettings };
use cortex_agent_chat::config::ui::UiConfig;
use cortex_agent_chat::cortex::{ AgentError, AgentInvoker };
use cortex_agent_chat::models::agent::AgentRequest;
use cortex_agent_chat::server::websocket::{ handle_connection, ws_config, ChatContext };
use futures::{ SinkExt, StreamExt };
use serde_json::{ json, Value as JsonValue };
use std::net::SocketAddr;
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio_tungstenite::tungstenite::protocol::{ Message, Role };
use tokio_tungstenite::WebSocketStream;

struct ScriptedInvoker {
    replies: Mutex<Vec<Result<Option<JsonValue>, String>>>,
    seen: Mutex<Vec<AgentRequest>>,
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(&self, request: &AgentRequest) -> Result<Option<JsonValue>, AgentError> {
        self.seen.lock().unwrap().push(request.clone());
        let next = self.replies.lock().unwrap().remove(0);
        next.map_err(AgentError::RemoteInvocation)
    }

    fn agent_name(&self) -> &str {
        "TEST.AGENT"
    }
}

async fn connect(
    replies: Vec<Result<Option<JsonValue>, String>>
) -> (WebSocketStream<DuplexStream>, Arc<ScriptedInvoker>) {
    let invoker = Arc::new(ScriptedInvoker {
        replies: Mutex::new(replies),
        seen: Mutex::new(Vec::new()),
    });
    let context = Arc::new(ChatContext {
        agent: Arc::new(ChatAgent::new(invoker.clone(), TurnSettings::default())),
        ui: Arc::new(UiConfig::default()),
    });

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
    tokio::spawn(async move {
        let server_ws = WebSocketStream::from_raw_socket(server_io, Role::Server, Some(ws_config())).await;
        handle_connection(peer, server_ws, context).await;
    });

    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    (client, invoker)
}

async fn send(client: &mut WebSocketStream<DuplexStream>, value: JsonValue) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

async fn recv(client: &mut WebSocketStream<DuplexStream>) -> JsonValue {
    loop {
        match client.next().await.expect("connection closed").unwrap() {
            Message::Text(text) => {
                return serde_json::from_str(&text).unwrap();
            }
            _ => {
                continue;
            }
        }
    }
}

#[tokio::test]
async fn sample_and_free_text_turns_share_one_thread() {
    let (mut client, invoker) = connect(
        vec![
            Ok(
                Some(
                    json!({
                    "events": [
                        { "type": "response.text.delta", "delta": "Revenue was " },
                        { "type": "response.text.delta", "delta": "$1.2M" },
                        { "type": "response.tool_call", "tool_name": "cortex_analyst", "status": "success" },
                        { "type": "response", "message_id": "m1" }
                    ]
                }).to_string().into()
                )
            ),
            Ok(Some(json!({ "response": "Top rep: Sarah Chen", "message_id": "m2" })))
        ]
    ).await;

    let hello = recv(&mut client).await;
    assert_eq!(hello["type"], "session");
    assert_eq!(hello["samples"].as_array().unwrap().len(), 8);
    let thread_id = hello["thread_id"].as_str().unwrap().to_string();

    send(&mut client, json!({ "type": "sample", "index": 0 })).await;
    assert_eq!(recv(&mut client).await["type"], "processing");
    let first = recv(&mut client).await;
    assert_eq!(first["type"], "response");
    assert_eq!(first["content"], "Revenue was $1.2M");
    assert_eq!(first["tool_calls"], json!([{ "tool": "cortex_analyst", "status": "success" }]));

    send(&mut client, json!({ "type": "chat", "content": "And the top rep?" })).await;
    assert_eq!(recv(&mut client).await["type"], "processing");
    let second = recv(&mut client).await;
    assert_eq!(second["content"], "Top rep: Sarah Chen");
    assert_eq!(second["tool_calls"], json!([]));

    send(&mut client, json!({ "type": "history" })).await;
    let history = recv(&mut client).await;
    assert_eq!(history["thread_id"], thread_id.as_str());
    let contents: Vec<&str> = history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(
        contents,
        vec![
            "What was our total revenue last quarter?",
            "Revenue was $1.2M",
            "And the top rep?",
            "Top rep: Sarah Chen"
        ]
    );

    let seen = invoker.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].thread_id, thread_id);
    assert!(seen[0].parent_message_id.is_none());
    assert_eq!(seen[1].parent_message_id.as_deref(), Some("m1"));
}

#[tokio::test]
async fn failures_are_answers_and_reset_starts_over() {
    let (mut client, invoker) = connect(
        vec![Err("timeout".to_string()), Ok(Some(json!({ "text": "fresh start" })))]
    ).await;

    let hello = recv(&mut client).await;
    let first_thread = hello["thread_id"].as_str().unwrap().to_string();

    send(&mut client, json!({ "type": "chat", "content": "hello?" })).await;
    assert_eq!(recv(&mut client).await["type"], "processing");
    let failed = recv(&mut client).await;
    assert_eq!(failed["type"], "response");
    assert_eq!(failed["content"], "Error calling agent: timeout");

    send(&mut client, json!({ "type": "history" })).await;
    let history = recv(&mut client).await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "hello?");

    send(&mut client, json!({ "type": "reset" })).await;
    let reset = recv(&mut client).await;
    assert_eq!(reset["type"], "session");
    assert_ne!(reset["thread_id"], first_thread.as_str());

    send(&mut client, json!({ "type": "history" })).await;
    assert_eq!(recv(&mut client).await["messages"], json!([]));

    send(&mut client, json!({ "type": "chat", "content": "again" })).await;
    assert_eq!(recv(&mut client).await["type"], "processing");
    assert_eq!(recv(&mut client).await["content"], "fresh start");

    let seen = invoker.seen.lock().unwrap().clone();
    assert_eq!(seen[1].thread_id, reset["thread_id"].as_str().unwrap());
}

#[tokio::test]
async fn bad_frames_get_protocol_errors() {
    let (mut client, invoker) = connect(vec![]).await;
    recv(&mut client).await;

    send(&mut client, json!({ "type": "sample", "index": 42 })).await;
    let unknown = recv(&mut client).await;
    assert_eq!(unknown["type"], "error");
    assert_eq!(unknown["message"], "Unknown sample question #42");

    client.send(Message::Text("not json".to_string())).await.unwrap();
    let parse = recv(&mut client).await;
    assert_eq!(parse["type"], "error");

    assert!(invoker.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_frame_ends_the_connection_without_a_turn() {
    let (mut client, invoker) = connect(vec![Ok(Some(json!({ "text": "never" })))]).await;
    recv(&mut client).await;

    let content = "x".repeat(2 * 1024 * 1024);
    let _ = client.send(Message::Text(json!({ "type": "chat", "content": content }).to_string())).await;

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(message)) = client.next().await {
            if let Message::Text(text) = message {
                let value: JsonValue = serde_json::from_str(&text).unwrap();
                assert_ne!(value["type"], "response");
            }
        }
    }).await;

    assert!(drained.is_ok());
    assert!(invoker.seen.lock().unwrap().is_empty());
}
