use crate::model::participant::ParticipantId;
use crate::model::room::RoomId;
use crate::utils::{DEFAULT_STUN_ADDR, DEFAULT_STUN_ADDR_2};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

pub fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![
        IceServerConfig::stun(DEFAULT_STUN_ADDR),
        IceServerConfig::stun(DEFAULT_STUN_ADDR_2),
    ]
}

/// ICE candidate payload, in the camelCase shape browsers put on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Join,
    Offer,
    Answer,
    Candidate,
    Leave,
}

const ALL_FIELDS: [&str; 4] = ["room", "id", "sdp", "candidate"];

impl MessageKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "join" => Some(Self::Join),
            "offer" => Some(Self::Offer),
            "answer" => Some(Self::Answer),
            "candidate" => Some(Self::Candidate),
            "leave" => Some(Self::Leave),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::Leave => "leave",
        }
    }

    /// Payload fields owned by this kind.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Join => &["room", "id"],
            Self::Offer | Self::Answer => &["sdp"],
            Self::Candidate => &["candidate"],
            Self::Leave => &[],
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    Join { room: RoomId, id: ParticipantId },
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate { candidate: IceCandidate },
    Leave,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a JSON object: {0}")]
    NotJson(String),

    #[error("message has no `type` field")]
    MissingType,

    #[error("unknown message type `{0}`")]
    UnknownKind(String),

    #[error("malformed `{kind}` message: {reason}")]
    Malformed { kind: MessageKind, reason: String },
}

impl DecodeError {
    /// Only a recognized kind with an inconsistent payload is worth failing a session over.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::Malformed { .. })
    }
}

impl SignalMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            SignalMessage::Join { .. } => MessageKind::Join,
            SignalMessage::Offer { .. } => MessageKind::Offer,
            SignalMessage::Answer { .. } => MessageKind::Answer,
            SignalMessage::Candidate { .. } => MessageKind::Candidate,
            SignalMessage::Leave => MessageKind::Leave,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| DecodeError::NotJson(e.to_string()))?;

        let Value::Object(map) = &value else {
            return Err(DecodeError::NotJson(format!("expected object, got {}", text)));
        };

        let kind = match map.get("type") {
            Some(Value::String(kind)) => kind.as_str(),
            _ => return Err(DecodeError::MissingType),
        };

        let Some(kind) = MessageKind::parse(kind) else {
            return Err(DecodeError::UnknownKind(kind.to_owned()));
        };

        let owned = kind.fields();
        if let Some(foreign) = ALL_FIELDS
            .iter()
            .find(|field| map.contains_key(**field) && !owned.contains(*field))
        {
            return Err(DecodeError::Malformed {
                kind,
                reason: format!("field `{}` belongs to another message type", foreign),
            });
        }

        let message: SignalMessage =
            serde_json::from_value(value).map_err(|e| DecodeError::Malformed {
                kind,
                reason: e.to_string(),
            })?;

        if let SignalMessage::Join { room, id } = &message {
            if room.is_empty() || id.as_str().trim().is_empty() {
                return Err(DecodeError::Malformed {
                    kind,
                    reason: "room and id must not be empty".to_owned(),
                });
            }
        }

        Ok(message)
    }
}
