//! WebSocket fan-out hub.
//!
//! Holds a handle per connected client and pushes every broker-delivered
//! event to all of them. Each client gets a bounded outbound queue; a slow
//! client loses frames rather than stalling the broadcast, and a closed
//! client is dropped from the set during the broadcast that discovers it.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use flightdeck_core::FlightEvent;

/// Per-client outbound queue depth. A client this far behind starts losing
/// frames.
const CLIENT_BUFFER: usize = 32;
/// Keepalive ping period.
const PING_PERIOD: Duration = Duration::from_secs(30);

struct ClientHandle {
    id: Uuid,
    sender: mpsc::Sender<String>,
}

/// Registry of live WebSocket clients.
#[derive(Default)]
pub struct FanoutHub {
    clients: RwLock<Vec<ClientHandle>>,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client; returns its id and the receiving end of its queue.
    pub fn register(&self) -> (Uuid, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(CLIENT_BUFFER);
        let id = Uuid::new_v4();
        self.clients.write().push(ClientHandle { id, sender });
        (id, receiver)
    }

    /// Remove a client. Unknown ids are a no-op, so disconnect paths can
    /// call this unconditionally.
    pub fn unregister(&self, id: Uuid) {
        self.clients.write().retain(|client| client.id != id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Push an event to every connected client.
    ///
    /// The payload is serialized once. A full queue skips that client for
    /// this frame; a closed queue evicts the client. Returns the number of
    /// clients the frame was queued for.
    pub fn broadcast(&self, event: &FlightEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Event serialization failed, dropping broadcast");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut closed: Vec<Uuid> = Vec::new();

        {
            let clients = self.clients.read();
            for client in clients.iter() {
                match client.sender.try_send(payload.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(client_id = %client.id, "Client queue full, dropping frame");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(client.id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut clients = self.clients.write();
            clients.retain(|client| !closed.contains(&client.id));
            tracing::debug!(evicted = closed.len(), "Evicted closed clients");
        }

        tracing::debug!(
            flight_number = %event.flight_number,
            delivered = delivered,
            "Broadcast event"
        );
        delivered
    }
}

/// Drive one WebSocket connection until it closes.
///
/// Frames arrive through the hub queue; inbound traffic is protocol-only
/// (ping/pong, close). The client is unregistered on every exit path.
pub async fn handle_socket(hub: Arc<FanoutHub>, socket: WebSocket) {
    let (client_id, mut queue) = hub.register();
    tracing::info!(
        client_id = %client_id,
        clients = hub.client_count(),
        "WebSocket client connected"
    );

    let (mut sink, mut stream) = socket.split();
    let mut ping = tokio::time::interval(PING_PERIOD);
    ping.tick().await;

    loop {
        tokio::select! {
            frame = queue.recv() => match frame {
                Some(payload) => {
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Ping(data))) => {
                    if sink.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Client-to-server data frames carry no meaning here.
                }
                Some(Err(e)) => {
                    tracing::debug!(client_id = %client_id, error = %e, "WebSocket read error");
                    break;
                }
            },
            _ = ping.tick() => {
                if sink.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.unregister(client_id);
    tracing::info!(
        client_id = %client_id,
        clients = hub.client_count(),
        "WebSocket client disconnected"
    );
}
