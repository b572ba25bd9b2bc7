//! Core types for the Tauron outage integration
//!
//! This crate provides the fundamental types shared by the lookup client,
//! the address resolution flow and the outage sensor: Candidate,
//! ResolutionState, AddressRecord, OutageObservation, EntityId and State.

mod address;
mod candidate;
mod clock;
mod entity_id;
mod observation;
mod state;

pub use address::{AddressRecord, IncompleteAddress, ResolutionState, Stage};
pub use candidate::Candidate;
pub use clock::{Clock, MockClock, SystemClock};
pub use entity_id::{EntityId, EntityIdError};
pub use observation::{OutageObservation, NO_OUTAGE};
pub use state::State;

/// Integration domain, used for config entries and flow handlers
pub const DOMAIN: &str = "tauron_dystrybucja";

/// State value used before the first successful observation
pub const STATE_UNKNOWN: &str = "unknown";

/// Maximum length for a state value (longer labels are truncated)
pub const MAX_STATE_LENGTH: usize = 255;
