use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        sse::{ErrorEvent, ServerEvent},
        state::StateView,
        ws::{BuzzFeedback, PlayerInboundMessage, RegistrationAck},
    },
    services::events::{
        EVENT_BUZZ_FEEDBACK, EVENT_ERROR, EVENT_GAME_STATE, EVENT_REGISTERED, send_client_event,
    },
    state::{ClientId, SharedState},
};

/// Per-connection bookkeeping.
#[derive(Debug, Default)]
pub struct PlayerSession {
    /// Name registered over this connection.
    pub name: Option<String>,
}

/// Handle the full lifecycle of one player or display WebSocket connection.
///
/// Every hub event is forwarded as a `{"type", "payload"}` frame; inbound frames
/// drive registration, buzzes, chat and narration completion.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let (client, events) = state.hub().connect();
    send_game_state(&state, client);
    let forward_task = tokio::spawn(forward_events(events, outbound_tx.clone()));
    info!(client = %client, "websocket client connected");

    let mut session = PlayerSession::default();
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(client = %client, payload = %text, "received client message");
                match serde_json::from_str::<PlayerInboundMessage>(&text) {
                    Ok(inbound) => handle_message(&state, client, &mut session, inbound).await,
                    Err(err) => {
                        warn!(client = %client, error = %err, "failed to parse client message");
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(client = %client, error = %err, "websocket error");
                break;
            }
        }
    }

    state.hub().disconnect(client);
    forward_task.abort();
    info!(client = %client, player = ?session.name, "websocket client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Catch a freshly connected client up with the current game: question, scores,
/// buzzer and control.
pub fn send_game_state(state: &SharedState, client: ClientId) {
    let view = StateView::from(&state.host().snapshot());
    send_client_event(state.hub().as_ref(), client, EVENT_GAME_STATE, &view);
}

/// Turn hub events into text frames until either side goes away.
async fn forward_events(
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    outbound_tx: mpsc::UnboundedSender<Message>,
) {
    while let Some(event) = events.recv().await {
        let frame = match event.to_ws_frame() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(event = ?event.event, error = %err, "failed to frame event");
                continue;
            }
        };
        if outbound_tx.send(Message::Text(frame.into())).is_err() {
            break;
        }
    }
}

/// Route one parsed client message to the host.
pub async fn handle_message(
    state: &SharedState,
    client: ClientId,
    session: &mut PlayerSession,
    message: PlayerInboundMessage,
) {
    let host = state.host();
    let hub = state.hub().as_ref();
    match message {
        PlayerInboundMessage::Register(request) => {
            let requested = request.name.trim().to_string();
            let ack = if let Some(name) = &session.name {
                RegistrationAck {
                    name: requested,
                    accepted: false,
                    reason: Some(format!("this connection is already registered as {name}")),
                }
            } else {
                match host.register_player(&request).await {
                    Ok(_) => {
                        session.name = Some(requested.clone());
                        RegistrationAck {
                            name: requested,
                            accepted: true,
                            reason: None,
                        }
                    }
                    Err(err) => {
                        info!(client = %client, error = %err, "registration refused");
                        RegistrationAck {
                            name: requested,
                            accepted: false,
                            reason: Some(err.to_string()),
                        }
                    }
                }
            };
            send_client_event(hub, client, EVENT_REGISTERED, &ack);
        }
        PlayerInboundMessage::Buzz => {
            let player = session.name.as_deref().unwrap_or_default();
            let feedback = match host.handle_buzz(player).await {
                Ok(_) => BuzzFeedback {
                    can_answer: true,
                    reason: None,
                },
                Err(rejection) => BuzzFeedback {
                    can_answer: false,
                    reason: Some(rejection.to_string()),
                },
            };
            send_client_event(hub, client, EVENT_BUZZ_FEEDBACK, &feedback);
        }
        PlayerInboundMessage::Chat { message } => {
            let Some(name) = session.name.as_deref() else {
                send_client_event(
                    hub,
                    client,
                    EVENT_ERROR,
                    &ErrorEvent {
                        message: "register before chatting".into(),
                    },
                );
                return;
            };
            if let Err(err) = host.handle_chat(name, &message).await {
                warn!(player = name, error = %err, "chat handling failed");
            }
        }
        PlayerInboundMessage::AudioComplete { audio_id } => {
            if !host.audio_completed(&audio_id) {
                debug!(audio_id, "completion for unknown or finished clip");
            }
        }
        PlayerInboundMessage::Unknown => {
            warn!(client = %client, "ignoring unknown message type");
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
