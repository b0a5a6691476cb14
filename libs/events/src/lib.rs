//! # regime-events
//!
//! Wire formats for the activities regime engine.
//!
//! ## Outbound domain events
//!
//! Every committed allocation or attendance change is announced with a
//! minimal, id-only event. Consumers re-fetch current state; the event only
//! says *which* record moved.
//!
//! - `activities.prisoner.allocation-amended`
//! - `activities.prisoner.attendance-amended`
//! - `activities.prisoner.attendance-created`
//! - `activities.prisoner.attendance-expired`
//!
//! ## Queue messages
//!
//! Work reaches the engine through a queue carrying either a per-site job
//! message (one sub-task of a distributed job) or a prisoner movement.

mod envelope;
mod error;
mod messages;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use messages::*;
pub use types::*;
