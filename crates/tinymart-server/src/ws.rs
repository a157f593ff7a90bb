//! WebSocket transport for subscription sessions.

use std::fmt;
use std::future;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tinymart_proto::{ProtocolError, ServerMessage, SUBPROTOCOL};

use crate::error::ServerError;
use crate::session::SubscriptionSession;
use crate::state::AppState;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Inbound frame after transport-level handling.
#[derive(Debug, PartialEq)]
enum Frame {
    Text(String),
    /// Answered with an `error` message without reaching the session.
    Rejected(ProtocolError),
    Skip,
    End,
}

/// WebSocket upgrade handler for subscription connections
pub async fn ws_subscriptions(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if !state.config.origin_allowed(origin) {
        let origin = origin.unwrap_or("<none>").to_string();
        tracing::warn!(origin = %origin, "websocket origin rejected");
        return ServerError::OriginNotAllowed(origin).into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "websocket upgrade rejected");
            return rejection.into_response();
        }
    };

    ws.protocols([SUBPROTOCOL])
        .on_failed_upgrade(|err| tracing::warn!(error = %err, "websocket upgrade failed"))
        .on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    serve_connection(sink, stream, state).await;
}

/// Run one subscription connection to completion.
///
/// A failed write cancels the read side, so the session tears down and
/// releases its registrations as soon as the peer stops accepting frames.
async fn serve_connection<Si, St>(sink: Si, stream: St, state: AppState)
where
    Si: Sink<Message> + Send + 'static,
    Si::Error: fmt::Display + Send,
    St: Stream<Item = Result<Message, axum::Error>>,
{
    let connection = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    let session_config = state.config.session.clone();
    tracing::info!(connection, "subscription connection opened");

    let (outbound_tx, outbound_rx) = mpsc::channel(session_config.outbound_buffer.max(1));
    let writer_failed = CancellationToken::new();
    let writer = tokio::spawn(write_frames(
        connection,
        sink,
        outbound_rx,
        writer_failed.clone(),
    ));

    let rejections = outbound_tx.clone();
    let inbound = stream
        .take_until(writer_failed.cancelled_owned())
        .map(read_frame)
        .take_while(|frame| future::ready(!matches!(frame, Frame::End)))
        .filter_map(move |frame| {
            let rejections = rejections.clone();
            async move {
                match frame {
                    Frame::Text(text) => Some(text),
                    Frame::Rejected(err) => {
                        tracing::debug!(connection, error = %err, "frame rejected");
                        let _ = rejections.send(err.to_message()).await;
                        None
                    }
                    Frame::Skip | Frame::End => None,
                }
            }
        });

    let grace = session_config.shutdown_grace;
    let session = SubscriptionSession::new(state.registry.clone(), outbound_tx, session_config)
        .with_serializer(Arc::clone(&state.serializer));
    let report = session.run(inbound).await;

    if tokio::time::timeout(grace, writer).await.is_err() {
        tracing::warn!(connection, "writer did not drain before timeout");
    }

    tracing::info!(
        connection,
        cancelled = report.cancelled,
        timed_out = report.timed_out,
        "subscription connection closed"
    );
}

fn read_frame(frame: Result<Message, axum::Error>) -> Frame {
    match frame {
        Ok(Message::Text(text)) => Frame::Text(text),
        Ok(Message::Binary(data)) => match String::from_utf8(data) {
            Ok(text) => Frame::Text(text),
            Err(e) => Frame::Rejected(ProtocolError::InvalidEnvelope(format!(
                "binary frame is not UTF-8: {}",
                e
            ))),
        },
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Frame::Skip,
        Ok(Message::Close(_)) => Frame::End,
        Err(e) => {
            tracing::warn!(error = %e, "websocket read error");
            Frame::End
        }
    }
}

/// Drain the session's outbound queue into the socket.
async fn write_frames<Si>(
    connection: u64,
    sink: Si,
    mut outbound: mpsc::Receiver<ServerMessage>,
    failed: CancellationToken,
) where
    Si: Sink<Message>,
    Si::Error: fmt::Display,
{
    let mut sink = pin!(sink);
    while let Some(message) = outbound.recv().await {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(connection, error = %e, "failed to encode message");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            tracing::warn!(connection, error = %e, "websocket write error");
            failed.cancel();
            return;
        }
    }
    let _ = sink.close().await;
}
