use crate::agent::{ ChatAgent, TurnOutcome };
use crate::config::ui::UiConfig;
use crate::models::websocket::{ ClientMessage, ServerMessage };
use crate::session::ChatSession;

use std::error::Error;
use std::fmt::Display;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::collections::HashMap;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };

use tokio_tungstenite::{ accept_hdr_async_with_config, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::{ Message, WebSocketConfig };
use tokio_rustls::TlsAcceptor;

use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use hmac::{ Hmac, Mac };
use sha2::Sha256;
use chrono::Utc;
use url::form_urlencoded;

use log::{ debug, info, warn, error };
use futures::{ Sink, SinkExt, StreamExt };

type HmacSha256 = Hmac<Sha256>;

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;
const MAX_CLOCK_SKEW_SECS: i64 = 300;
const CONNECTIONS_PER_SECOND: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => panic!("connection rate must be non-zero"),
};

/// Frames and messages over the cap are refused by tungstenite before they
/// are buffered.
pub fn ws_config() -> WebSocketConfig {
    WebSocketConfig {
        max_message_size: Some(MAX_MESSAGE_SIZE),
        max_frame_size: Some(MAX_MESSAGE_SIZE),
        ..Default::default()
    }
}

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(CONNECTIONS_PER_SECOND));
}

fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let mut keys = pkcs8_private_keys(&mut key_reader);
    let key = match keys.next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

fn build_tls_acceptor(
    enable_tls: bool,
    cert_path: Option<&str>,
    key_path: Option<&str>
) -> Result<Option<TlsAcceptor>, Box<dyn Error + Send + Sync>> {
    if !enable_tls {
        info!("TLS not enabled. Running plain WebSocket (WS) server.");
        return Ok(None);
    }
    match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => {
            info!(
                "TLS enabled. Loading certificate from '{}' and key from '{}'",
                cert_path,
                key_path
            );
            let config = load_tls_config(cert_path, key_path)?;
            Ok(Some(TlsAcceptor::from(config)))
        }
        (Some(_), None) | (None, Some(_)) => {
            error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
            Err("Missing TLS certificate or key path".into())
        }
        (None, None) => {
            error!("--enable-tls was set but no certificate/key paths provided.");
            Err("TLS enabled without cert/key".into())
        }
    }
}

/// Shared, read-only context every connection handler gets a handle to.
pub struct ChatContext {
    pub agent: Arc<ChatAgent>,
    pub ui: Arc<UiConfig>,
}

pub struct WsServerOptions<'a> {
    pub api_key: Option<String>,
    pub enable_tls: bool,
    pub tls_cert_path: Option<&'a str>,
    pub tls_key_path: Option<&'a str>,
}

pub async fn start_ws_server(
    addr: &str,
    context: Arc<ChatContext>,
    options: WsServerOptions<'_>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let tls_acceptor = build_tls_acceptor(
        options.enable_tls,
        options.tls_cert_path,
        options.tls_key_path
    )?;
    let listener = TcpListener::bind(addr).await?;
    let protocol = if tls_acceptor.is_some() { "wss" } else { "ws" };
    info!("{} server listening on: {}", protocol.to_uppercase(), addr);

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let context = Arc::clone(&context);
        let required_api_key = options.api_key.clone();
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, context, required_api_key).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, context, required_api_key).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

/// Checks a handshake signature: `sig` must be hex(HMAC-SHA256(secret, ts))
/// and `ts` within five minutes of `now`.
pub fn verify_signature(secret: &str, ts: &str, sig: &str, now: i64) -> Result<(), &'static str> {
    let ts_i: i64 = ts.parse().map_err(|_| "invalid timestamp")?;
    if (now - ts_i).abs() > MAX_CLOCK_SKEW_SECS {
        return Err("timestamp out of range");
    }

    let provided = hex::decode(sig).map_err(|_| "bad signature")?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "bad signature")?;
    mac.update(ts.as_bytes());
    mac.verify_slice(&provided).map_err(|_| "bad signature")
}

fn unauthorized(reason: &str) -> ErrorResponse {
    let mut res = ErrorResponse::new(Some(reason.to_string()));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    context: Arc<ChatContext>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let secret = match &required_api_key {
            Some(k) if !k.is_empty() => k,
            _ => {
                return Ok(response);
            }
        };

        let qs = req.uri().query().unwrap_or("");
        let params: HashMap<String, String> = form_urlencoded
            ::parse(qs.as_bytes())
            .into_owned()
            .collect();

        let ts = params
            .get("ts")
            .or_else(|| params.get("X-Api-Ts"))
            .map(|s| s.as_str());
        let sig = params
            .get("sig")
            .or_else(|| params.get("X-Api-Sign"))
            .map(|s| s.as_str());

        match (ts, sig) {
            (Some(ts), Some(sig)) => {
                match verify_signature(secret, ts, sig, Utc::now().timestamp()) {
                    Ok(()) => Ok(response),
                    Err(reason) => {
                        warn!("Rejected handshake from {}: {}", peer, reason);
                        Err(unauthorized(reason))
                    }
                }
            }
            _ => Err(unauthorized("missing ts/sig")),
        }
    };

    match accept_hdr_async_with_config(stream, auth_callback, Some(ws_config())).await {
        Ok(ws) => {
            handle_connection(peer, ws, context).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

async fn send_message<T>(tx: &mut T, msg: &ServerMessage) -> Result<(), Box<dyn Error + Send + Sync>>
    where T: Sink<Message> + Unpin, T::Error: Display
{
    let json = serde_json::to_string(msg)?;
    tx.send(Message::Text(json)).await.map_err(|e| -> Box<dyn Error + Send + Sync> {
        format!("Failed to send message: {}", e).into()
    })
}

fn session_message(session: &ChatSession, ui: &UiConfig) -> ServerMessage {
    let conversation = session.conversation();
    ServerMessage::Session {
        thread_id: conversation.thread_id().to_string(),
        thread_label: conversation.short_thread_id(),
        title: ui.heading(),
        caption: ui.caption.clone(),
        samples: ui.samples.clone(),
    }
}

fn response_message(outcome: TurnOutcome) -> ServerMessage {
    ServerMessage::Response {
        content: outcome.text,
        tool_calls: outcome.tool_calls,
        timestamp: outcome.timestamp,
    }
}

/// Applies one client command to the session. Questions are only queued
/// here; [`drain_pending`] asks them.
fn apply_client_message(
    session: &mut ChatSession,
    ui: &UiConfig,
    message: ClientMessage
) -> Option<ServerMessage> {
    match message {
        ClientMessage::Chat { content } => {
            if content.trim().is_empty() {
                return Some(ServerMessage::Error { message: "Empty message".to_string() });
            }
            session.queue_question(content);
            None
        }
        ClientMessage::Sample { index } =>
            match ui.sample(index) {
                Some(question) => {
                    session.queue_question(question);
                    None
                }
                None =>
                    Some(ServerMessage::Error {
                        message: format!("Unknown sample question #{}", index),
                    }),
            }
        ClientMessage::Reset => {
            session.reset();
            info!("Conversation reset, new thread {}", session.conversation().thread_id());
            Some(session_message(session, ui))
        }
        ClientMessage::History => {
            let conversation = session.conversation();
            Some(ServerMessage::History {
                thread_id: conversation.thread_id().to_string(),
                messages: conversation.messages().to_vec(),
            })
        }
    }
}

async fn drain_pending<T>(
    session: &mut ChatSession,
    agent: &ChatAgent,
    tx: &mut T
) -> Result<(), Box<dyn Error + Send + Sync>>
    where T: Sink<Message> + Unpin, T::Error: Display
{
    while session.has_pending() {
        send_message(tx, &ServerMessage::Processing).await?;
        if let Some(outcome) = session.ask_pending(agent).await {
            send_message(tx, &response_message(outcome)).await?;
        }
    }
    Ok(())
}

/// Serves one client. The connection owns its session outright and awaits
/// every turn before reading the next frame, so turns never overlap.
pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    context: Arc<ChatContext>
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    info!("New WebSocket connection: {}", peer);

    let (mut tx, mut rx) = websocket.split();
    let mut session = ChatSession::start();
    info!("Assigned thread {} to {}", session.conversation().thread_id(), peer);

    if let Err(e) = send_message(&mut tx, &session_message(&session, &context.ui)).await {
        error!("Error sending session info to {}: {}", peer, e);
        return;
    }

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(message) => {
                if message.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Message from {} exceeds size limit ({} > {})",
                        peer,
                        message.len(),
                        MAX_MESSAGE_SIZE
                    );
                    let error_msg = ServerMessage::Error {
                        message: "Message too large".to_string(),
                    };
                    if send_message(&mut tx, &error_msg).await.is_err() {
                        error!("Failed to send size limit error to {}", peer);
                    }
                    break;
                }

                match message {
                    Message::Text(text) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                debug!("Client message from {}: {:?}", peer, client_msg);
                                apply_client_message(&mut session, &context.ui, client_msg)
                            }
                            Err(e) => {
                                error!("Failed to parse message from {}: {}", peer, e);
                                Some(ServerMessage::Error {
                                    message: format!("Failed to parse message: {}", e),
                                })
                            }
                        };

                        if let Some(reply) = reply {
                            if let Err(e) = send_message(&mut tx, &reply).await {
                                error!("Error sending reply to {}: {}", peer, e);
                                break;
                            }
                        }

                        if let Err(e) = drain_pending(&mut session, &context.agent, &mut tx).await {
                            error!("Error sending response to {}: {}", peer, e);
                            break;
                        }
                    }
                    Message::Close(_) => {
                        info!("Received close frame from {}", peer);
                        break;
                    }
                    Message::Ping(ping_data) => {
                        if tx.send(Message::Pong(ping_data)).await.is_err() {
                            error!("Failed to send pong to {}", peer);
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    Message::Frame(_) => {}
                }
            }
            Err(e) => {
                match e {
                    | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::Protocol(_)
                    | tokio_tungstenite::tungstenite::Error::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    tokio_tungstenite::tungstenite::Error::Capacity(ref cap_err) => {
                        error!("WebSocket capacity error for {}: {}", peer, cap_err);
                        let error_msg = ServerMessage::Error {
                            message: "Server capacity error".to_string(),
                        };
                        let _ = send_message(&mut tx, &error_msg).await;
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        }
    }
    info!(
        "WebSocket connection closed for {} (thread: {}, {} messages)",
        peer,
        session.conversation().thread_id(),
        session.conversation().len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, ts: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(ts.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn socket_limits_match_the_message_cap() {
        let config = ws_config();
        assert_eq!(config.max_message_size, Some(1024 * 1024));
        assert_eq!(config.max_frame_size, Some(1024 * 1024));
    }

    #[test]
    fn valid_signature_passes() {
        let sig = sign("k3y", "1700000000");
        assert_eq!(verify_signature("k3y", "1700000000", &sig, 1700000100), Ok(()));
    }

    #[test]
    fn stale_or_forged_signatures_fail() {
        let sig = sign("k3y", "1700000000");
        assert_eq!(
            verify_signature("k3y", "1700000000", &sig, 1700000301),
            Err("timestamp out of range")
        );
        assert_eq!(verify_signature("other", "1700000000", &sig, 1700000000), Err("bad signature"));
        assert_eq!(verify_signature("k3y", "1700000000", "zz", 1700000000), Err("bad signature"));
        assert_eq!(verify_signature("k3y", "soon", &sig, 1700000000), Err("invalid timestamp"));
    }

    #[test]
    fn sample_selection_queues_the_question() {
        let ui = UiConfig::default();
        let mut session = ChatSession::start();

        let reply = apply_client_message(&mut session, &ui, ClientMessage::Sample { index: 1 });
        assert!(reply.is_none());
        assert_eq!(session.take_pending().as_deref(), Some("Show me the top 5 sales reps by revenue"));

        let reply = apply_client_message(&mut session, &ui, ClientMessage::Sample { index: 99 });
        assert!(matches!(reply, Some(ServerMessage::Error { .. })));
        assert!(!session.has_pending());
    }

    #[test]
    fn blank_chat_is_refused() {
        let ui = UiConfig::default();
        let mut session = ChatSession::start();
        let reply = apply_client_message(&mut session, &ui, ClientMessage::Chat {
            content: "   ".into(),
        });
        assert!(matches!(reply, Some(ServerMessage::Error { .. })));
        assert!(!session.has_pending());
    }

    #[test]
    fn reset_reports_new_thread() {
        let ui = UiConfig::default();
        let mut session = ChatSession::start();
        let before = session.conversation().thread_id().to_string();

        match apply_client_message(&mut session, &ui, ClientMessage::Reset) {
            Some(ServerMessage::Session { thread_id, thread_label, samples, .. }) => {
                assert_ne!(thread_id, before);
                assert!(thread_id.starts_with(thread_label.trim_end_matches("...")));
                assert_eq!(samples.len(), ui.samples.len());
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
