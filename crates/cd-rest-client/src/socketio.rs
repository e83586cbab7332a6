//! Socket.IO push stream carrying channel events
//!
//! The backend serves its push channel as Socket.IO v5 over Engine.IO v4.
//! Only the websocket transport is used: the client opens the socket,
//! waits for the engine handshake, joins the default namespace and then
//! turns every `42["name", data]` frame into a validated [`ChannelEvent`].
//! Engine pings are answered here, and a dropped socket is reopened with
//! backoff until the consumer drops the stream.

use std::time::Duration;

use cd_api_contract::ChannelEvent;
use futures::stream::{self, BoxStream, StreamExt};
use futures::SinkExt;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::AuthConfig;
use crate::error::{RestClientError, RestClientResult};

/// Default mount path of the backend Socket.IO endpoint
pub const DEFAULT_SOCKET_PATH: &str = "/socket.io/";

const ENGINE_PONG: &str = "3";
const NAMESPACE_CONNECT: &str = "40";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Engine.IO open packet payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    pub ping_timeout: u64,
}

impl OpenInfo {
    /// How long the socket may stay silent before it counts as dead
    fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

/// A decoded text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace joined
    Connect,
    /// Namespace left by the server
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(String),
    /// Acks and binary frames; the backend sends neither
    Other,
}

/// Decode one websocket text frame
pub fn decode(frame: &str) -> RestClientResult<Packet> {
    let mut chars = frame.chars();
    let engine_type = chars.next().ok_or_else(|| malformed(frame, "empty frame"))?;
    let body = chars.as_str();

    match engine_type {
        '0' => {
            let info: OpenInfo =
                serde_json::from_str(body).map_err(|e| malformed(frame, &e.to_string()))?;
            Ok(Packet::Open(info))
        }
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_message(frame, body),
        '6' => Ok(Packet::Noop),
        _ => Err(malformed(frame, "unknown engine packet type")),
    }
}

fn decode_message(frame: &str, body: &str) -> RestClientResult<Packet> {
    let mut chars = body.chars();
    let socket_type = chars
        .next()
        .ok_or_else(|| malformed(frame, "empty message"))?;
    let payload = strip_namespace(chars.as_str());

    match socket_type {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            // an ack id may sit between the namespace and the array
            let payload = payload.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut items: Vec<Value> =
                serde_json::from_str(payload).map_err(|e| malformed(frame, &e.to_string()))?;
            if items.is_empty() {
                return Err(malformed(frame, "event without a name"));
            }
            let data = if items.len() > 1 {
                items.swap_remove(1)
            } else {
                Value::Null
            };
            match items.swap_remove(0) {
                Value::String(name) => Ok(Packet::Event { name, data }),
                _ => Err(malformed(frame, "event name is not a string")),
            }
        }
        '4' => {
            let message = serde_json::from_str::<Value>(payload)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| payload.to_string());
            Ok(Packet::ConnectError(message))
        }
        '3' | '5' | '6' => Ok(Packet::Other),
        _ => Err(malformed(frame, "unknown socket packet type")),
    }
}

fn strip_namespace(payload: &str) -> &str {
    if payload.starts_with('/') {
        match payload.find(',') {
            Some(idx) => &payload[idx + 1..],
            None => "",
        }
    } else {
        payload
    }
}

fn malformed(frame: &str, reason: &str) -> RestClientError {
    RestClientError::Socket {
        endpoint: "socket.io".to_string(),
        message: format!("malformed frame {frame:?}: {reason}"),
    }
}

/// Websocket URL of the Socket.IO endpoint mounted at `path` under `base`
pub fn socket_url(base: &Url, path: &str) -> RestClientResult<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| RestClientError::InvalidBaseUrl(base.to_string()))?;
        segments
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()))
            .push("");
    }

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(RestClientError::InvalidBaseUrl(base.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| RestClientError::InvalidBaseUrl(base.to_string()))?;
    url.set_query(Some("EIO=4&transport=websocket"));
    url.set_fragment(None);
    Ok(url)
}

/// Open the Socket.IO stream at `url` and keep it open
///
/// The first connection is made before returning, so an unreachable
/// backend surfaces as an error here. Later drops are reported as stream
/// errors while the socket is reopened in the background.
pub async fn connect(
    url: &Url,
    auth: &AuthConfig,
) -> RestClientResult<BoxStream<'static, RestClientResult<ChannelEvent>>> {
    let headers = auth
        .headers()
        .map_err(|e| RestClientError::Auth(e.to_string()))?;
    let endpoint = url.to_string();

    info!(%endpoint, "subscribing to backend socket");
    let session = open_session(url, &headers).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(socket_loop(url.clone(), headers, session, tx));

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    Ok(events.boxed())
}

struct Session {
    ws: Socket,
    heartbeat: Duration,
}

fn build_request(url: &Url, headers: &HeaderMap) -> RestClientResult<Request> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| socket_error(url, e))?;
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|e| RestClientError::Auth(e.to_string()))?;
        let value = HeaderValue::from_bytes(value.as_bytes())
            .map_err(|e| RestClientError::Auth(e.to_string()))?;
        request.headers_mut().insert(name, value);
    }
    Ok(request)
}

async fn open_session(url: &Url, headers: &HeaderMap) -> RestClientResult<Session> {
    let request = build_request(url, headers)?;
    let attempt = async {
        let (mut ws, _) = connect_async(request)
            .await
            .map_err(|e| socket_error(url, e))?;
        let heartbeat = handshake(url, &mut ws).await?;
        Ok::<_, RestClientError>(Session { ws, heartbeat })
    };
    tokio::time::timeout(HANDSHAKE_TIMEOUT, attempt)
        .await
        .map_err(|_| socket_error(url, "handshake timed out"))?
}

/// Wait for the engine open packet, then join the default namespace
async fn handshake(url: &Url, ws: &mut Socket) -> RestClientResult<Duration> {
    let mut heartbeat = None;
    while let Some(message) = ws.next().await {
        let text = match message.map_err(|e| socket_error(url, e))? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match decode(&text)? {
            Packet::Open(info) => {
                debug!(sid = %info.sid, "engine session opened");
                heartbeat = Some(info.heartbeat());
                ws.send(Message::Text(NAMESPACE_CONNECT.to_string()))
                    .await
                    .map_err(|e| socket_error(url, e))?;
            }
            Packet::Ping => {
                ws.send(Message::Text(ENGINE_PONG.to_string()))
                    .await
                    .map_err(|e| socket_error(url, e))?;
            }
            Packet::Connect => {
                return heartbeat.ok_or_else(|| socket_error(url, "namespace joined before open"));
            }
            Packet::ConnectError(message) => return Err(socket_error(url, message)),
            other => debug!(packet = ?other, "ignoring frame during handshake"),
        }
    }
    Err(socket_error(url, "socket closed during handshake"))
}

async fn socket_loop(
    url: Url,
    headers: HeaderMap,
    mut session: Session,
    tx: mpsc::UnboundedSender<RestClientResult<ChannelEvent>>,
) {
    let mut backoff = Duration::from_secs(1);
    loop {
        match pump(&url, &mut session, &tx).await {
            Ok(()) => {
                debug!("event stream dropped by consumer");
                let _ = session.ws.close(None).await;
                return;
            }
            Err(e) => {
                warn!(error = %e, "backend socket lost");
                if tx.send(Err(e)).is_err() {
                    return;
                }
            }
        }

        session = loop {
            tokio::select! {
                _ = tx.closed() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            match open_session(&url, &headers).await {
                Ok(session) => {
                    info!("backend socket reconnected");
                    backoff = Duration::from_secs(1);
                    break session;
                }
                Err(e) => {
                    backoff = next_backoff(backoff);
                    if tx.send(Err(e)).is_err() {
                        return;
                    }
                }
            }
        };
    }
}

/// Forward events until the consumer goes away (`Ok`) or the socket fails
async fn pump(
    url: &Url,
    session: &mut Session,
    tx: &mpsc::UnboundedSender<RestClientResult<ChannelEvent>>,
) -> RestClientResult<()> {
    loop {
        let message = tokio::select! {
            _ = tx.closed() => return Ok(()),
            message = tokio::time::timeout(session.heartbeat, session.ws.next()) => message,
        };
        let message = match message {
            Err(_) => return Err(socket_error(url, "no ping from server")),
            Ok(None) => return Err(socket_error(url, "socket closed")),
            Ok(Some(message)) => message.map_err(|e| socket_error(url, e))?,
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => return Err(socket_error(url, "socket closed")),
            _ => continue,
        };

        let item = match decode(&text) {
            Ok(Packet::Ping) => {
                session
                    .ws
                    .send(Message::Text(ENGINE_PONG.to_string()))
                    .await
                    .map_err(|e| socket_error(url, e))?;
                continue;
            }
            Ok(Packet::Event { name, data }) => {
                if !ChannelEvent::NAMES.contains(&name.as_str()) {
                    debug!(event = %name, "ignoring untracked socket event");
                    continue;
                }
                ChannelEvent::from_wire(&name, data).map_err(RestClientError::from)
            }
            Ok(Packet::Close) | Ok(Packet::Disconnect) => {
                return Err(socket_error(url, "server closed the session"));
            }
            Ok(Packet::ConnectError(message)) => return Err(socket_error(url, message)),
            Ok(_) => continue,
            Err(e) => Err(e),
        };
        if tx.send(item).is_err() {
            return Ok(());
        }
    }
}

fn socket_error(url: &Url, message: impl ToString) -> RestClientError {
    RestClientError::Socket {
        endpoint: url.to_string(),
        message: message.to_string(),
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}
