//! Lifecycle of one socket: upgrade, inbound dispatch, outbound writer, teardown.

use super::broker::Broker;
use super::connection::{ConnectionHandle, ConnectionId};
use crate::startup::AppState;
use axum::{
    extract::{
        Extension,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span};

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Frames that may queue for a slow client before new ones are dropped.
    pub outbound_buffer: usize,
    pub ping_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbound_buffer: 64,
            ping_interval: Duration::from_secs(30),
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(app_state): Extension<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        run_session(app_state.broker, app_state.session, sink, stream).await;
    })
}

/// Releases the connection's subscriptions when the session ends, whether the
/// read loop finished, the task was aborted or it panicked.
struct Disconnect {
    broker: Arc<Broker>,
    id: ConnectionId,
}

impl Drop for Disconnect {
    fn drop(&mut self) {
        let released = self.broker.disconnect(self.id);
        info!(released, "client disconnected");
    }
}

/// Drives one connection until its inbound stream ends.
///
/// Frames are handed to the broker one at a time, so a client's actions are
/// applied in the order it sent them. Outbound frames go through a bounded
/// outbox drained by a separate writer task.
pub async fn run_session<Si, St>(
    broker: Arc<Broker>,
    settings: SessionSettings,
    sink: Si,
    mut stream: St,
) where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display + Send,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let (outbox, outbox_rx) = mpsc::channel(settings.outbound_buffer.max(1));
    let handle = ConnectionHandle::new(outbox);
    let span = info_span!("ws", conn_id = %handle.id());

    async move {
        info!("client connected");
        let _disconnect = Disconnect {
            broker: broker.clone(),
            id: handle.id(),
        };

        let writer = tokio::spawn(
            write_loop(sink, outbox_rx, settings.ping_interval)
                .instrument(tracing::Span::current()),
        );

        while let Some(message) = stream.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!("ignoring non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("client sent close frame");
                    break;
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Err(e) => {
                    debug!(error = %e, "transport closed");
                    break;
                }
            };

            broker.handle_frame(&handle, &text).await;
        }

        writer.abort();
    }
    .instrument(span)
    .await
}

async fn write_loop<Si>(
    mut sink: Si,
    mut outbox: mpsc::Receiver<Arc<str>>,
    ping_interval: Duration,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: Display + Send,
{
    let mut ping = tokio::time::interval(ping_interval);
    ping.tick().await;

    loop {
        tokio::select! {
            frame = outbox.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                    debug!(error = %e, "write failed, stopping writer");
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = sink.close().await;
}
