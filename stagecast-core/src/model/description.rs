use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description exchanged during offer/answer negotiation.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Structural check only; the media layer does the real parsing.
    pub fn validate(&self) -> Result<(), String> {
        if self.sdp.trim().is_empty() {
            return Err(format!("{:?} carries an empty SDP", self.kind));
        }
        Ok(())
    }
}
