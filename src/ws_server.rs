// WebSocket transport for client requests and subscribed event relay.
//
// Each accepted connection gets a reader loop and a writer task joined by
// an mpsc channel; request handling is delegated to `app::dispatch`. The
// message pump is generic over the stream type so protocol behavior is
// unit-testable without opening TCP ports.

use std::sync::Arc;

use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{info, warn};

use crate::app::{self, AppState};
use crate::events::Event;
use crate::protocol::{Request, Response};

/// Accept connections forever, spawning a handler per client.
pub async fn run(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    loop {
        let (stream, addr) = listener.accept().await?;
        let addr_str = addr.to_string();
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => {
                    info!("client connected from {addr_str}");
                    handle_connection(ws, &addr_str, state).await;
                    info!("client {addr_str} disconnected");
                }
                Err(e) => warn!("WebSocket handshake failed for {addr_str}: {e}"),
            }
        });
    }
}

/// Drive one connection: split the socket, pump outbound text through a
/// writer task, and feed inbound messages to the request processor.
pub async fn handle_connection<S>(ws: WebSocketStream<S>, addr: &str, state: Arc<AppState>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, read) = ws.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    process_requests(read, &state, &out_tx, addr).await;

    // Reader is done, so no more responses are coming; tear down the
    // writer. Any event relay holding a sender clone exits on its next
    // failed send.
    writer.abort();
    let _ = writer.await;
}

/// Process inbound WebSocket messages from any [`Stream`] of [`Message`]
/// results, replying through `out`. Returns when the stream ends, the
/// client closes, or the outbound channel is gone. This is the pure-logic
/// unit-test target.
pub async fn process_requests<St>(
    mut stream: St,
    state: &AppState,
    out: &mpsc::Sender<String>,
    addr: &str,
) where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let mut subscribed = false;

    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let response = match serde_json::from_str::<Request>(&text) {
                    Ok(Request::Subscribe) => {
                        if !subscribed {
                            subscribed = true;
                            // Subscribe here, not inside the relay task, so
                            // no event emitted after the ack can be missed.
                            spawn_event_relay(state.events.subscribe(), out.clone(), addr);
                        }
                        Response::Subscribed
                    }
                    Ok(request) => app::dispatch(state, request).await,
                    Err(e) => Response::Error {
                        kind: "BAD_REQUEST".into(),
                        message: e.to_string(),
                    },
                };
                match serde_json::to_string(&response) {
                    Ok(json) => {
                        if out.send(json).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("failed to serialize response for {addr}: {e}"),
                }
            }
            Ok(Message::Close(_)) => {
                info!("client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
}

/// Forward bus events to one connection until either side goes away.
fn spawn_event_relay(
    mut events: broadcast::Receiver<Event>,
    out: mpsc::Sender<String>,
    addr: &str,
) {
    let addr = addr.to_string();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("failed to serialize event for {addr}: {e}");
                            continue;
                        }
                    };
                    if out.send(json).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event subscriber {addr} lagged by {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
