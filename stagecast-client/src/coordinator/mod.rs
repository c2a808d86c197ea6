mod coordinator;
mod event;
mod retry;
mod session;
mod state;

pub use coordinator::SignalingCoordinator;
pub use event::{CloseReason, SessionEvent};
pub use retry::{RetryPolicy, connect_with_retry};
pub use session::{ConnectOptions, SessionHandle, connect};
pub use state::SessionState;
