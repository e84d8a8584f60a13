//! Connection state machine.
//!
//! Single source of truth for connectivity. State and last error are only
//! mutated through [`ConnectionStateMachine::mark_connected`] and the two
//! `mark_disconnected` setters, so they can never drift apart.

use crate::error::TransportError;
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the notification channels. Slow subscribers observe `Lagged`.
const EVENT_BUFFER_SIZE: usize = 64;

/// Transport connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// An actual state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub old_state: ConnectionState,
    pub new_state: ConnectionState,
}

#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    last_error: Option<TransportError>,
    state_tx: broadcast::Sender<StateChange>,
    error_tx: broadcast::Sender<TransportError>,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        let (error_tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            state: ConnectionState::Disconnected,
            last_error: None,
            state_tx,
            error_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The error that caused the most recent disconnect, if it was error-driven.
    pub fn last_error(&self) -> Option<&TransportError> {
        self.last_error.as_ref()
    }

    /// Receive every state transition from now on, in the order they happen.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Receive every error recorded by [`Self::mark_disconnected_with`].
    pub fn subscribe_errors(&self) -> broadcast::Receiver<TransportError> {
        self.error_tx.subscribe()
    }

    /// Clear the last error and move to `Connected`.
    pub fn mark_connected(&mut self) -> Option<StateChange> {
        self.last_error = None;
        self.set_state(ConnectionState::Connected)
    }

    /// Orderly disconnect: clear the last error and move to `Disconnected`.
    pub fn mark_disconnected(&mut self) -> Option<StateChange> {
        self.last_error = None;
        self.set_state(ConnectionState::Disconnected)
    }

    /// Orderly disconnect, but only from `Connected`.
    ///
    /// When already disconnected nothing changes, so an error recorded by an
    /// earlier failure survives.
    pub fn mark_disconnected_if_connected(&mut self) -> Option<StateChange> {
        if self.state != ConnectionState::Connected {
            return None;
        }
        self.mark_disconnected()
    }

    /// Record `error` and move to `Disconnected`.
    ///
    /// The error is recorded even when already disconnected.
    pub fn mark_disconnected_with(&mut self, error: TransportError) -> Option<StateChange> {
        self.last_error = Some(error.clone());
        let _ = self.error_tx.send(error);
        self.set_state(ConnectionState::Disconnected)
    }

    fn set_state(&mut self, new_state: ConnectionState) -> Option<StateChange> {
        let old_state = self.state;
        if old_state == new_state {
            return None;
        }

        self.state = new_state;
        let change = StateChange {
            old_state,
            new_state,
        };
        debug!(from = %old_state, to = %new_state, "connection state changed");
        let _ = self.state_tx.send(change);
        Some(change)
    }
}
