use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::{collaborators::Broadcaster, dto::sse::ServerEvent};

/// Identifier of a connected WebSocket client.
pub type ClientId = Uuid;

/// Fan-out hub shared by the SSE stream and the WebSocket clients.
///
/// SSE subscribers read from a Tokio broadcast channel; WebSocket clients each
/// register an unbounded sender drained by their writer task.
pub struct EventHub {
    sender: broadcast::Sender<ServerEvent>,
    clients: DashMap<ClientId, mpsc::UnboundedSender<ServerEvent>>,
}

impl EventHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self {
            sender,
            clients: DashMap::new(),
        }
    }

    /// Register a new SSE subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Attach a WebSocket client, returning its id and the receiving end of its queue.
    pub fn connect(&self) -> (ClientId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.clients.insert(id, tx);
        (id, rx)
    }

    /// Detach a WebSocket client.
    pub fn disconnect(&self, client: ClientId) {
        self.clients.remove(&client);
    }

    /// Number of attached WebSocket clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Broadcaster for EventHub {
    fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event.clone());
        // Clients whose writer is gone are pruned on the way.
        self.clients
            .retain(|client, tx| match tx.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!(client = %client, "dropping closed client");
                    false
                }
            });
    }

    fn send_to(&self, client: ClientId, event: ServerEvent) -> bool {
        match self.clients.get(&client) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> ServerEvent {
        ServerEvent::json(Some(name.to_string()), &serde_json::json!({})).unwrap()
    }

    #[tokio::test]
    async fn broadcast_reaches_sse_and_clients() {
        let hub = EventHub::new(8);
        let mut sse = hub.subscribe();
        let (_id, mut client) = hub.connect();

        hub.broadcast(event("game_ready"));

        assert_eq!(sse.recv().await.unwrap().event.as_deref(), Some("game_ready"));
        assert_eq!(client.recv().await.unwrap().event.as_deref(), Some("game_ready"));
    }

    #[tokio::test]
    async fn unicast_targets_one_client() {
        let hub = EventHub::new(8);
        let (first, mut first_rx) = hub.connect();
        let (_second, mut second_rx) = hub.connect();

        assert!(hub.send_to(first, event("registered")));
        assert!(first_rx.recv().await.is_some());
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn closed_clients_are_pruned() {
        let hub = EventHub::new(8);
        let (id, rx) = hub.connect();
        drop(rx);
        hub.broadcast(event("buzzer_status"));
        assert_eq!(hub.client_count(), 0);
        assert!(!hub.send_to(id, event("buzzer_status")));
    }
}
