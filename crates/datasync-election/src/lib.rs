//! Leader election across execution contexts sharing a database.
//!
//! Exactly one context per database name may hold the write lease at any
//! instant. Election is deterministic: among live registered participants
//! the lowest context ID wins, which breaks ties by arrival time. A leader
//! keeps its lease alive by heartbeat; a lease that is not renewed within
//! the configured window expires and any participant may claim it.
//!
//! The current-leader state is owned by the [`ElectionRegistry`] behind an
//! explicit API; participants never share a bare leader variable.

mod broadcast;
mod heartbeat;
mod participant;
mod registry;

pub use broadcast::{ChangeBus, ChangeKind, DataChange};
pub use participant::Participant;
pub use registry::{ElectionRegistry, LeaseRecord};
