mod media_session;
mod negotiator;
mod rtc_session;

pub use media_session::{LocalTrack, MediaBackend, MediaEvent, MediaKind, MediaSession, RemoteTrack};
pub use negotiator::{NegotiatorState, SessionNegotiator};
pub use rtc_session::{RtcMediaBackend, RtcMediaSession};
