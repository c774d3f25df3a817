//! Transport connection state, modeled as an explicit transition table
//! instead of matching on raw state strings.

use std::fmt;

use tokio::sync::watch;

use crate::error::TransitionError;

/// Lifecycle of one directional media path to the SFU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        }
    }

    /// The allowed transitions:
    /// `new -> connecting -> connected -> {failed, closed}`, with `closed`
    /// reachable from every live state and `failed` only from a live
    /// handshake. Everything else is rejected.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        matches!(
            (self, next),
            (ConnectionState::New, ConnectionState::Connecting)
                | (ConnectionState::New, ConnectionState::Closed)
                | (ConnectionState::Connecting, ConnectionState::Connected)
                | (ConnectionState::Connecting, ConnectionState::Failed)
                | (ConnectionState::Connecting, ConnectionState::Closed)
                | (ConnectionState::Connected, ConnectionState::Failed)
                | (ConnectionState::Connected, ConnectionState::Closed)
                | (ConnectionState::Failed, ConnectionState::Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies state changes through the transition table and publishes the
/// current state on a watch channel so negotiation branches can await
/// `connected` without polling.
pub struct StateMachine {
    transport_id: String,
    tx: watch::Sender<ConnectionState>,
}

impl StateMachine {
    pub fn new(transport_id: String) -> (Self, watch::Receiver<ConnectionState>) {
        let (tx, rx) = watch::channel(ConnectionState::New);
        (Self { transport_id, tx }, rx)
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Apply one observed state change. Invalid transitions leave the
    /// machine untouched and surface as an error for the caller to log.
    pub fn apply(&self, next: ConnectionState) -> Result<ConnectionState, TransitionError> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(TransitionError { from, to: next });
        }
        self.tx.send_replace(next);
        tracing::debug!(
            target = "transport",
            transport_id = %self.transport_id,
            from = from.as_str(),
            to = next.as_str(),
            "connection state changed"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_allows_the_documented_path() {
        assert!(ConnectionState::New.can_transition_to(ConnectionState::Connecting));
        assert!(ConnectionState::Connecting.can_transition_to(ConnectionState::Connected));
        assert!(ConnectionState::Connected.can_transition_to(ConnectionState::Failed));
        assert!(ConnectionState::Connected.can_transition_to(ConnectionState::Closed));
        assert!(ConnectionState::Failed.can_transition_to(ConnectionState::Closed));
    }

    #[test]
    fn table_rejects_backwards_and_out_of_band_moves() {
        assert!(!ConnectionState::New.can_transition_to(ConnectionState::Connected));
        assert!(!ConnectionState::New.can_transition_to(ConnectionState::Failed));
        assert!(!ConnectionState::Connected.can_transition_to(ConnectionState::Connecting));
        assert!(!ConnectionState::Closed.can_transition_to(ConnectionState::Connecting));
        assert!(!ConnectionState::Failed.can_transition_to(ConnectionState::Connected));
    }

    #[test]
    fn machine_rejects_invalid_transition_and_keeps_state() {
        let (machine, rx) = StateMachine::new("t-1".into());
        machine.apply(ConnectionState::Connecting).expect("valid");

        let err = machine.apply(ConnectionState::New).expect_err("invalid");
        assert_eq!(err.from, ConnectionState::Connecting);
        assert_eq!(err.to, ConnectionState::New);
        assert_eq!(*rx.borrow(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn watchers_observe_connected() {
        let (machine, mut rx) = StateMachine::new("t-2".into());
        machine.apply(ConnectionState::Connecting).expect("valid");
        machine.apply(ConnectionState::Connected).expect("valid");

        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow(), ConnectionState::Connected);
    }
}
