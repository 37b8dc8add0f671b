use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use super::events::{CandidateCounters, SessionEvent};
use crate::peer::{ConnectionState, IceConnectionState, IceGatheringState};

/// Folds the transport's two state signals into one [`ConnectionState`]
///
/// The last raw connection state reported wins. An ICE failure is
/// promoted to `failed` when the connection state has not caught up yet.
pub(crate) struct ConnectionTracker {
    state: Arc<RwLock<ConnectionState>>,
    events: broadcast::Sender<SessionEvent>,
    counters: Arc<CandidateCounters>,
}

impl ConnectionTracker {
    pub fn new(
        state: Arc<RwLock<ConnectionState>>,
        events: broadcast::Sender<SessionEvent>,
        counters: Arc<CandidateCounters>,
    ) -> Self {
        Self {
            state,
            events,
            counters,
        }
    }

    /// Returns the state when it is terminal
    pub async fn on_connection_state(&self, raw: ConnectionState) -> Option<ConnectionState> {
        let previous = std::mem::replace(&mut *self.state.write().await, raw);
        tracing::info!("Connection state: {}", raw);
        let _ = self.events.send(SessionEvent::ConnectionStateChange(raw));

        if !raw.is_terminal() {
            return None;
        }

        if previous != raw {
            tracing::error!("Connection {}", raw);
            let _ = self.events.send(SessionEvent::Error(format!("Connection {}", raw)));
        }
        Some(raw)
    }

    /// Returns `failed` when this ICE failure moved the unified state there
    pub async fn on_ice_connection_state(&self, raw: IceConnectionState) -> Option<ConnectionState> {
        let stats = self.counters.snapshot();
        tracing::info!(
            "ICE connection state: {} (local: {}, remote: {} candidates)",
            raw,
            stats.local_generated,
            stats.remote_received
        );

        match raw {
            IceConnectionState::Failed => {
                tracing::error!(
                    "ICE connection failed after {} local and {} remote candidates",
                    stats.local_generated,
                    stats.remote_received
                );
            }
            IceConnectionState::Checking => {
                tracing::debug!("ICE is checking connectivity between candidates");
            }
            IceConnectionState::Connected => {
                tracing::info!("ICE connection established");
            }
            _ => {}
        }

        let failed = raw == IceConnectionState::Failed;
        let _ = self.events.send(SessionEvent::IceConnectionStateChange {
            state: raw,
            stats: failed.then_some(stats),
        });

        if !failed {
            return None;
        }

        {
            let mut state = self.state.write().await;
            if state.is_terminal() {
                return None;
            }
            *state = ConnectionState::Failed;
        }

        let _ = self
            .events
            .send(SessionEvent::ConnectionStateChange(ConnectionState::Failed));
        let _ = self
            .events
            .send(SessionEvent::Error("ICE connection failed".to_string()));
        Some(ConnectionState::Failed)
    }

    pub fn on_ice_gathering_state(&self, raw: IceGatheringState) {
        tracing::debug!("ICE gathering state: {}", raw);
        let _ = self.events.send(SessionEvent::IceGatheringStateChange(raw));
    }
}
