//! Channel session state management

use std::time::Instant;

/// Session state machine
///
/// Tracks one endpoint's view of the session. A Media side that announces
/// itself unprompted goes straight from `Idle` to `Ready`; a Controller that
/// sends `init` waits in `AwaitingReady` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Attached, nothing exchanged yet
    Idle,

    /// `init` sent, waiting for the peer's `ready`
    AwaitingReady {
        /// When the current handshake attempt began
        since: Instant,
    },

    /// Handshake complete, steady-state commands flow
    Ready {
        /// When the peer became ready
        since: Instant,
    },

    /// Torn down; every operation is a no-op
    Closed,
}

impl SessionState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        use SessionState::*;

        match (self, target) {
            (Closed, _) => false,
            (_, Closed) => true,

            (Idle, AwaitingReady { .. }) => true,
            (Idle, Ready { .. }) => true,

            (AwaitingReady { .. }, AwaitingReady { .. }) => true, // retry
            (AwaitingReady { .. }, Ready { .. }) => true,

            // A new media source re-runs the handshake
            (Ready { .. }, AwaitingReady { .. }) => true,
            (Ready { .. }, Ready { .. }) => true,

            (a, b) if a == b => true,

            _ => false,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::AwaitingReady { .. } => "AwaitingReady",
            SessionState::Ready { .. } => "Ready",
            SessionState::Closed => "Closed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Time spent in the current handshake attempt, if one is pending
    pub fn waiting_duration(&self) -> Option<std::time::Duration> {
        if let SessionState::AwaitingReady { since } = self {
            Some(since.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let idle = SessionState::Idle;
        let awaiting = SessionState::AwaitingReady {
            since: Instant::now(),
        };
        let ready = SessionState::Ready {
            since: Instant::now(),
        };

        assert!(idle.can_transition_to(&awaiting));
        assert!(idle.can_transition_to(&ready));
        assert!(awaiting.can_transition_to(&awaiting));
        assert!(awaiting.can_transition_to(&ready));
        assert!(ready.can_transition_to(&awaiting));
        assert!(idle.can_transition_to(&SessionState::Closed));
        assert!(ready.can_transition_to(&SessionState::Closed));
    }

    #[test]
    fn test_closed_is_terminal() {
        let closed = SessionState::Closed;

        assert!(!closed.can_transition_to(&SessionState::Idle));
        assert!(!closed.can_transition_to(&SessionState::Ready {
            since: Instant::now()
        }));
        assert!(!closed.can_transition_to(&SessionState::Closed));
        assert!(closed.is_closed());
        assert!(!closed.is_ready());
    }

    #[test]
    fn test_state_checks() {
        let awaiting = SessionState::AwaitingReady {
            since: Instant::now(),
        };

        assert!(awaiting.waiting_duration().is_some());
        assert!(SessionState::Idle.waiting_duration().is_none());
        assert_eq!(awaiting.to_string(), "AwaitingReady");
    }
}
