use std::sync::atomic::{AtomicU64, Ordering};

use crate::peer::{ConnectionState, IceConnectionState, IceGatheringState, RemoteStream};

/// Observable session events, delivered to every subscriber
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The remote stream became playable (a video track arrived)
    Stream(RemoteStream),
    /// Terminal transport failure
    Error(String),
    ConnectionStateChange(ConnectionState),
    /// Stats are attached only when ICE fails
    IceConnectionStateChange {
        state: IceConnectionState,
        stats: Option<CandidateStats>,
    },
    IceGatheringStateChange(IceGatheringState),
    Disconnected,
}

/// Snapshot of the candidate exchange counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CandidateStats {
    pub local_generated: u64,
    pub remote_received: u64,
}

/// Live counters for one session attempt
#[derive(Debug, Default)]
pub(crate) struct CandidateCounters {
    local_generated: AtomicU64,
    remote_received: AtomicU64,
}

impl CandidateCounters {
    pub fn record_local(&self) -> u64 {
        self.local_generated.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_remote(&self) -> u64 {
        self.remote_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> CandidateStats {
        CandidateStats {
            local_generated: self.local_generated.load(Ordering::Relaxed),
            remote_received: self.remote_received.load(Ordering::Relaxed),
        }
    }
}
