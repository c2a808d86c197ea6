/// Lifecycle of a signaling session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Joining,
    Negotiating,
    Active,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, Joining) | (Joining, Negotiating) | (Negotiating, Active)
        ) || (next == Closed && self != Closed)
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}
