use crate::room::{RelayRoom, RoomCommand};
use dashmap::DashMap;
use stagecast_core::RoomId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tracing::{debug, info};

const ROOM_QUEUE_CAPACITY: usize = 100;

/// Registry of live room actors, spawned on first use.
#[derive(Clone, Default)]
pub struct RoomManager {
    rooms: Arc<DashMap<RoomId, mpsc::Sender<RoomCommand>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn get_room_sender(&self, room: &RoomId) -> mpsc::Sender<RoomCommand> {
        if let Some(sender) = self.rooms.get(room) {
            return sender.clone();
        }

        self.rooms
            .entry(room.clone())
            .or_insert_with(|| {
                info!("Creating new room: {}", room);
                let (tx, rx) = mpsc::channel(ROOM_QUEUE_CAPACITY);
                let actor = RelayRoom::new(room.clone(), rx, self.clone());
                tokio::spawn(actor.run());
                tx
            })
            .clone()
    }

    /// Delivers `cmd` to the room, respawning it if the previous actor
    /// stopped in the meantime.
    pub async fn dispatch(&self, room: &RoomId, cmd: RoomCommand) {
        let mut cmd = cmd;
        loop {
            let sender = self.get_room_sender(room);
            match sender.send(cmd).await {
                Ok(()) => return,
                Err(SendError(returned)) => {
                    debug!("Room '{}' stopped, respawning", room);
                    self.rooms
                        .remove_if(room, |_, current| current.same_channel(&sender));
                    cmd = returned;
                }
            }
        }
    }

    /// Called by a room actor that closed its queue.
    pub(crate) fn forget(&self, room: &RoomId) {
        if self
            .rooms
            .remove_if(room, |_, sender| sender.is_closed())
            .is_some()
        {
            info!("Room '{}' removed", room);
        }
    }
}
