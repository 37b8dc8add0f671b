//! Session negotiation: offer/answer, candidate relay and state tracking

mod events;
mod negotiator;
mod relay;
mod tracker;

pub use events::{CandidateStats, SessionEvent};
pub use negotiator::{SessionNegotiator, DEFAULT_STARTUP_TIMEOUT};
