use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::protocol::{WsIncomingMessage, WS_APP_PROTOCOL};
use crate::assistant::PreparedAsk;
use crate::core::errors::ApiError;
use crate::server::router::allowed_origins;
use crate::state::AppState;
use crate::stream::{ResponseStream, StreamFragment};

type WsSender = SplitSink<WebSocket, Message>;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let origin_ok = validate_origin(&headers, &state);

    ws.protocols([WS_APP_PROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, state, origin_ok))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, origin_ok: bool) {
    let (mut sender, mut receiver) = socket.split();

    if !origin_ok {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: 4003,
                reason: "Forbidden: Invalid Origin".into(),
            })))
            .await;
        return;
    }

    // Frames are read on a separate task so a stop frame (or a disconnect)
    // is seen while a response is still streaming.
    let (tx, mut rx) = mpsc::unbounded_channel::<WsIncomingMessage>();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<WsIncomingMessage>(&text) {
                    Ok(incoming) => {
                        if tx.send(incoming).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::debug!(error = %err, "Ignoring malformed WebSocket frame"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    while let Some(incoming) = rx.recv().await {
        if let Err(err) = handle_message(&mut sender, &state, &mut rx, incoming).await {
            if send_json(&mut sender, error_frame(err.to_string())).await.is_err() {
                break;
            }
        }
    }

    reader.abort();
}

async fn handle_message(
    sender: &mut WsSender,
    state: &Arc<AppState>,
    control: &mut mpsc::UnboundedReceiver<WsIncomingMessage>,
    data: WsIncomingMessage,
) -> Result<(), ApiError> {
    match data.msg_type.as_deref().unwrap_or("") {
        "chat" => stream_chat(sender, state, control, &data).await,
        "stop" => send_json(sender, json!({"type": "stopped"})).await,
        other => Err(ApiError::BadRequest(format!(
            "unknown message type '{}'",
            other
        ))),
    }
}

async fn stream_chat(
    sender: &mut WsSender,
    state: &Arc<AppState>,
    control: &mut mpsc::UnboundedReceiver<WsIncomingMessage>,
    data: &WsIncomingMessage,
) -> Result<(), ApiError> {
    let request = data.to_ask_request();
    let prepared = state.assistant.prepare_ask(&request).await?;
    let stream = state.assistant.stream(&prepared).await?;
    relay_stream(sender, &prepared, stream, control).await
}

/// Forwards fragments as `chunk` frames ending in one `done` or `error`
/// frame. A `stop` frame or a disconnect cancels the stream.
async fn relay_stream<S>(
    sender: &mut S,
    prepared: &PreparedAsk,
    mut stream: ResponseStream,
    control: &mut mpsc::UnboundedReceiver<WsIncomingMessage>,
) -> Result<(), ApiError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    loop {
        tokio::select! {
            fragment = stream.next() => {
                let Some(fragment) = fragment else {
                    break;
                };
                let frame = match &fragment {
                    StreamFragment::Done => json!({
                        "type": "done",
                        "status": prepared.status,
                        "sources": prepared.sources,
                        "warnings": prepared.warnings,
                    }),
                    other => serde_json::to_value(other).map_err(ApiError::internal)?,
                };
                send_json(sender, frame).await?;
                if fragment.is_terminal() {
                    break;
                }
            }
            incoming = control.recv() => match incoming {
                Some(msg) if msg.msg_type.as_deref() == Some("stop") => {
                    stream.cancel();
                    send_json(sender, json!({"type": "stopped"})).await?;
                    break;
                }
                Some(_) => {
                    send_json(sender, error_frame("a response is already streaming".to_string())).await?;
                }
                None => {
                    tracing::info!("WebSocket client disconnected mid-stream");
                    stream.cancel();
                    break;
                }
            }
        }
    }

    Ok(())
}

fn error_frame(message: String) -> Value {
    serde_json::to_value(StreamFragment::Error(message))
        .unwrap_or_else(|_| json!({"type": "error"}))
}

async fn send_json<S>(sender: &mut S, payload: Value) -> Result<(), ApiError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    sender
        .send(Message::Text(payload.to_string()))
        .await
        .map_err(ApiError::internal)
}

/// Browsers always send `Origin`; other clients may omit it.
fn validate_origin(headers: &HeaderMap, state: &AppState) -> bool {
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        return true;
    };
    allowed_origins(&state.settings.server)
        .iter()
        .any(|allowed| allowed == origin)
}
