
pub use fake_channel::*;
pub use fake_media::*;
pub use session_helpers::*;
