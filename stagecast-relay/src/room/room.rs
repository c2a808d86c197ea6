use crate::room::{ConnectionId, MemberSender, RoomCommand, RoomManager};
use stagecast_core::{IceCandidate, ParticipantId, RoomId, SignalMessage};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct Member {
    conn: ConnectionId,
    outbound: MemberSender,
}

/// Offer of the current broadcaster, replayed to members that join late.
#[derive(Default)]
struct CachedOffer {
    sdp: String,
    candidates: Vec<IceCandidate>,
}

/// Actor owning the members of one room and routing signaling between them.
pub struct RelayRoom {
    id: RoomId,
    command_rx: mpsc::Receiver<RoomCommand>,
    manager: RoomManager,
    members: HashMap<ParticipantId, Member>,
    broadcaster: Option<ParticipantId>,
    /// The viewer whose answer the broadcaster accepted.
    paired: Option<ParticipantId>,
    offer: Option<CachedOffer>,
}

impl RelayRoom {
    pub fn new(id: RoomId, command_rx: mpsc::Receiver<RoomCommand>, manager: RoomManager) -> Self {
        Self {
            id,
            command_rx,
            manager,
            members: HashMap::new(),
            broadcaster: None,
            paired: None,
            offer: None,
        }
    }

    pub async fn run(mut self) {
        info!("Room '{}' event loop started", self.id);

        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd);

            if self.members.is_empty() {
                break;
            }
        }

        self.shutdown().await;
        info!("Room '{}' event loop finished", self.id);
    }

    fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { id, conn, outbound } => self.join(id, conn, outbound),

            RoomCommand::Signal {
                from,
                conn,
                message,
            } => {
                if !self.is_member(&from, conn) {
                    debug!("Dropping signal from non-member {} in '{}'", from, self.id);
                    return;
                }
                self.route(from, message);
            }

            RoomCommand::Leave { id, conn } => {
                if self.is_member(&id, conn) {
                    self.leave(&id);
                }
            }
        }
    }

    fn join(&mut self, id: ParticipantId, conn: ConnectionId, outbound: MemberSender) {
        if self.members.contains_key(&id) {
            warn!("Participant {} is already in room '{}'", id, self.id);
            return;
        }

        info!("Participant {} joined room '{}'", id, self.id);

        if let Some(offer) = &self.offer {
            debug!("Replaying cached offer to late joiner {}", id);
            let _ = outbound.send(SignalMessage::Offer {
                sdp: offer.sdp.clone(),
            });
            for candidate in &offer.candidates {
                let _ = outbound.send(SignalMessage::Candidate {
                    candidate: candidate.clone(),
                });
            }
        }

        self.members.insert(id, Member { conn, outbound });
    }

    fn route(&mut self, from: ParticipantId, message: SignalMessage) {
        let from_broadcaster = self.broadcaster.as_ref() == Some(&from);

        match message {
            SignalMessage::Offer { sdp } => {
                if self.broadcaster.is_some() && !from_broadcaster {
                    warn!(
                        "Room '{}' already has a broadcaster, dropping offer from {}",
                        self.id, from
                    );
                    return;
                }

                info!("Participant {} is broadcasting in '{}'", from, self.id);
                self.offer = Some(CachedOffer {
                    sdp: sdp.clone(),
                    candidates: Vec::new(),
                });
                self.broadcaster = Some(from.clone());
                self.paired = None;
                self.send_to_others(&from, SignalMessage::Offer { sdp });
            }

            SignalMessage::Answer { sdp } => {
                if from_broadcaster {
                    debug!("Dropping answer sent by the broadcaster of '{}'", self.id);
                    return;
                }
                if self.broadcaster.is_none() {
                    debug!("No broadcaster in '{}' for answer from {}", self.id, from);
                    return;
                }
                if let Some(paired) = self.paired.as_ref().filter(|paired| **paired != from) {
                    warn!(
                        "Broadcaster of '{}' is paired with {}, dropping answer from {}",
                        self.id, paired, from
                    );
                    return;
                }
                if self.paired.is_none() {
                    info!("Viewer {} is paired with the broadcaster of '{}'", from, self.id);
                    self.paired = Some(from);
                }
                self.send_to_broadcaster(SignalMessage::Answer { sdp });
            }

            SignalMessage::Candidate { candidate } => {
                if from_broadcaster {
                    if let Some(offer) = self.offer.as_mut() {
                        offer.candidates.push(candidate.clone());
                    }
                    self.send_to_others(&from, SignalMessage::Candidate { candidate });
                } else if self.is_paired(&from) {
                    self.send_to_broadcaster(SignalMessage::Candidate { candidate });
                } else {
                    debug!("Dropping candidate from unpaired viewer {}", from);
                }
            }

            SignalMessage::Join { .. } | SignalMessage::Leave => {
                debug!("Ignoring {} routed as a signal", message.kind());
            }
        }
    }

    fn leave(&mut self, id: &ParticipantId) {
        self.members.remove(id);
        info!("Participant {} left room '{}'", id, self.id);

        if self.broadcaster.as_ref() == Some(id) {
            self.broadcaster = None;
            self.paired = None;
            self.offer = None;
            self.send_to_others(id, SignalMessage::Leave);
        } else if self.is_paired(id) {
            self.paired = None;
            self.send_to_broadcaster(SignalMessage::Leave);
        }
    }

    fn is_paired(&self, id: &ParticipantId) -> bool {
        self.paired.as_ref() == Some(id)
    }

    fn is_member(&self, id: &ParticipantId, conn: ConnectionId) -> bool {
        self.members
            .get(id)
            .is_some_and(|member| member.conn == conn)
    }

    fn send_to_others(&self, from: &ParticipantId, message: SignalMessage) {
        for (id, member) in self.members.iter().filter(|(id, _)| *id != from) {
            if member.outbound.send(message.clone()).is_err() {
                debug!("Member {} of '{}' is gone", id, self.id);
            }
        }
    }

    fn send_to_broadcaster(&self, message: SignalMessage) {
        let Some(member) = self
            .broadcaster
            .as_ref()
            .and_then(|id| self.members.get(id))
        else {
            debug!(
                "No broadcaster in '{}' for {}, dropping",
                self.id,
                message.kind()
            );
            return;
        };
        let _ = member.outbound.send(message);
    }

    /// Closes the queue and hands anything that raced in to a fresh actor.
    async fn shutdown(&mut self) {
        self.command_rx.close();
        self.manager.forget(&self.id);

        let mut leftovers = Vec::new();
        while let Ok(cmd) = self.command_rx.try_recv() {
            leftovers.push(cmd);
        }

        for cmd in leftovers {
            self.manager.dispatch(&self.id, cmd).await;
        }
    }
}
