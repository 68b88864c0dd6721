//! WebSocket connection lifecycle and client message dispatch.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        event::{ConnectionReadyEvent, ErrorEvent, EventEnvelope, ServerEvent},
        validation::{normalize_lobby_code, validate_lobby_code},
        ws::ClientMessage,
    },
    error::ServiceError,
    services::{answer_service, auth_service, auth_service::Identity, event_service, lobby_service},
    state::{ClientConnection, ConnectionId, SharedState, fanout::lobby_topic},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle for an individual client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let identify = match ClientMessage::from_json_str(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "failed to parse client message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let ClientMessage::Identify {
        user_id,
        display_name,
        token,
    } = identify
    else {
        warn!("first message was not identification");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let identity =
        match auth_service::resolve_identity(&state, token, &user_id, &display_name).await {
            Ok(identity) => identity,
            Err(err) => {
                warn!(user = %user_id, error = %err, "websocket identification rejected");
                send_event(&outbound_tx, &error_event(&err));
                let _ = outbound_tx.send(Message::Close(None));
                finalize(writer_task, outbound_tx).await;
                return;
            }
        };

    let connection_id: ConnectionId = Uuid::new_v4();
    state.registry().register(ClientConnection {
        id: connection_id,
        user_id: identity.user_id.clone(),
        tx: outbound_tx.clone(),
    });

    send_event(
        &outbound_tx,
        &ServerEvent::ConnectionReady(ConnectionReadyEvent {
            connection_id: connection_id.to_string(),
            user_id: identity.user_id.clone(),
        }),
    );
    info!(user = %identity.user_id, connection = %connection_id, "client connected");

    // The relay task forwards fanout events of the joined lobby down this
    // socket; it is replaced on every join and aborted on leave/disconnect.
    let mut relay: Option<JoinHandle<()>> = None;
    let idle_bound = state.config().connection_idle();

    loop {
        let message = match tokio::time::timeout(idle_bound, receiver.next()).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(_) => {
                info!(user = %identity.user_id, "connection idle past grace period; closing");
                let _ = outbound_tx.send(Message::Close(None));
                break;
            }
        };

        match message {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(&text) {
                Ok(client_message) => {
                    if let Err(err) = dispatch(
                        &state,
                        &identity,
                        connection_id,
                        &outbound_tx,
                        &mut relay,
                        client_message,
                    )
                    .await
                    {
                        warn!(user = %identity.user_id, error = %err, "client operation failed");
                        send_event(&outbound_tx, &error_event(&err));
                    }
                }
                Err(err) => {
                    warn!(user = %identity.user_id, error = %err, "failed to parse client message");
                    send_event(
                        &outbound_tx,
                        &ServerEvent::Error(ErrorEvent {
                            kind: "validation".into(),
                            message: "malformed message".into(),
                        }),
                    );
                }
            },
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
                warn!(user = %identity.user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    if let Some(task) = relay.take() {
        task.abort();
    }
    if let Some(code) = state.registry().unregister(&connection_id) {
        lobby_service::handle_disconnect(&state, &code, &identity.user_id, connection_id).await;
    }
    info!(user = %identity.user_id, connection = %connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Route one parsed client message to the matching service operation.
async fn dispatch(
    state: &SharedState,
    identity: &Identity,
    connection_id: ConnectionId,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    relay: &mut Option<JoinHandle<()>>,
    message: ClientMessage,
) -> Result<(), ServiceError> {
    match message {
        ClientMessage::Identify { .. } => {
            warn!(user = %identity.user_id, "ignoring duplicate identification message");
            Ok(())
        }
        ClientMessage::JoinLobby { lobby_code } => {
            let code = normalize_lobby_code(&lobby_code);
            validate_lobby_code(&code)
                .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
            lobby_service::join_lobby(state, &code, identity, Some(connection_id)).await?;

            // Re-point the relay at the new topic before sending the
            // snapshot so no subsequent event is missed.
            if let Some(previous) = relay.take() {
                previous.abort();
            }
            let receiver = state.fanout().subscribe(&lobby_topic(&code));
            *relay = Some(spawn_relay(
                receiver,
                identity.user_id.clone(),
                outbound_tx.clone(),
            ));
            state.registry().bind_lobby(connection_id, &code);

            if let Some(cell) = state.lobby_cell(&code) {
                let locked = cell.lock().await;
                send_event(outbound_tx, &event_service::lobby_update_event(&locked.lobby));
            }

            for chat in lobby_service::chat_history(state, &code).await {
                send_event(outbound_tx, &chat);
            }
            Ok(())
        }
        ClientMessage::LeaveLobby { lobby_code } => {
            let code = normalize_lobby_code(&lobby_code);
            if let Some(task) = relay.take() {
                task.abort();
            }
            state.registry().clear_lobby(&connection_id);
            lobby_service::leave_lobby(state, &code, &identity.user_id).await?;
            send_event(outbound_tx, &ServerEvent::LobbyLeft { lobby_code: code });
            Ok(())
        }
        ClientMessage::StartGame { lobby_code } => {
            lobby_service::start_game(state, &lobby_code, &identity.user_id).await?;
            Ok(())
        }
        ClientMessage::SubmitAnswer {
            lobby_code,
            answer,
            time_remaining,
        } => {
            let code = normalize_lobby_code(&lobby_code);
            let question_index = answer_service::submit_answer(
                state,
                &code,
                &identity.user_id,
                &answer,
                time_remaining,
            )
            .await?;
            send_event(outbound_tx, &ServerEvent::AnswerAccepted { question_index });
            Ok(())
        }
        ClientMessage::Chat {
            lobby_code,
            message,
        } => lobby_service::post_chat(state, &lobby_code, identity, &message).await,
        ClientMessage::Unknown => {
            warn!(user = %identity.user_id, "ignoring unknown client message kind");
            Ok(())
        }
    }
}

/// Forward a lobby topic to one connection, honouring per-player targeting.
fn spawn_relay(
    receiver: tokio::sync::broadcast::Receiver<EventEnvelope>,
    user_id: String,
    tx: mpsc::UnboundedSender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = BroadcastStream::new(receiver);
        while let Some(item) = stream.next().await {
            match item {
                Ok(envelope) => {
                    if envelope
                        .target
                        .as_deref()
                        .is_some_and(|target| target != user_id)
                    {
                        continue;
                    }
                    if !send_event(&tx, &envelope.event) {
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(user = %user_id, skipped, "relay lagged; events skipped");
                }
            }
        }
    })
}

/// Serialize an event and push it onto the connection's writer channel.
///
/// Returns `false` when the writer is closed. Serialization failures are
/// logged and swallowed; they indicate a bug, not a connection problem.
pub(crate) fn send_event(tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(payload) => tx.send(Message::Text(payload.into())).is_ok(),
        Err(err) => {
            warn!(error = %err, "failed to serialize event `{event:?}`");
            true
        }
    }
}

fn error_event(err: &ServiceError) -> ServerEvent {
    ServerEvent::Error(ErrorEvent {
        kind: err.kind().into(),
        message: err.to_string(),
    })
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
