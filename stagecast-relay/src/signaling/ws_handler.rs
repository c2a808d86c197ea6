use crate::room::{ConnectionId, RoomCommand};
use crate::signaling::RelayState;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::extract::ws::{Message, WebSocket};
use axum::response::IntoResponse;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use stagecast_core::{ParticipantId, RoomId, SignalMessage};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Room membership established by this socket's `join`.
struct Membership {
    room: RoomId,
    id: ParticipantId,
}

async fn handle_socket(socket: WebSocket, state: RelayState) {
    let conn = state.next_connection_id();
    info!("New signaling connection #{}", conn);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SignalMessage>();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match msg.encode() {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize signal message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut membership: Option<Membership> = None;

    tokio::select! {
        _ = &mut send_task => {},
        _ = read_signals(&mut receiver, &state, conn, &tx, &mut membership) => send_task.abort(),
    }

    if let Some(Membership { room, id }) = membership {
        debug!("Connection #{} dropped without leave, leaving '{}'", conn, room);
        state
            .rooms
            .dispatch(&room, RoomCommand::Leave { id, conn })
            .await;
    }

    info!("Signaling connection #{} closed", conn);
}

async fn read_signals(
    receiver: &mut SplitStream<WebSocket>,
    state: &RelayState,
    conn: ConnectionId,
    outbound: &mpsc::UnboundedSender<SignalMessage>,
    membership: &mut Option<Membership>,
) {
    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let signal = match SignalMessage::decode(text.as_str()) {
            Ok(signal) => signal,
            Err(e) => {
                warn!("Dropping message from connection #{}: {}", conn, e);
                continue;
            }
        };

        let Some(current) = membership.as_ref() else {
            match signal {
                SignalMessage::Join { room, id } => {
                    info!("Connection #{} joins '{}' as {}", conn, room, id);
                    let cmd = RoomCommand::Join {
                        id: id.clone(),
                        conn,
                        outbound: outbound.clone(),
                    };
                    state.rooms.dispatch(&room, cmd).await;
                    *membership = Some(Membership { room, id });
                }
                other => debug!(
                    "Connection #{} sent {} before joining, ignoring",
                    conn,
                    other.kind()
                ),
            }
            continue;
        };

        match signal {
            SignalMessage::Join { room, .. } => {
                warn!(
                    "Connection #{} already joined '{}', ignoring join for '{}'",
                    conn, current.room, room
                );
            }

            SignalMessage::Leave => {
                if let Some(Membership { room, id }) = membership.take() {
                    state
                        .rooms
                        .dispatch(&room, RoomCommand::Leave { id, conn })
                        .await;
                }
            }

            message => {
                let cmd = RoomCommand::Signal {
                    from: current.id.clone(),
                    conn,
                    message,
                };
                state.rooms.dispatch(&current.room, cmd).await;
            }
        }
    }
}
