//! Allocation and attendance lifecycle rules.
//!
//! This library holds every decision the lifecycle engine makes, with no I/O:
//!
//! - **Allocation state machine**: which status transitions are legal and what
//!   they record ([`Allocation`]).
//! - **Attendance suspension reconciler**: bringing future attendances in line
//!   with an allocation's suspension state ([`reconcile`]).
//! - **Attendance creation**: what record a session produces for an
//!   allocation ([`plan_attendance`]).
//! - **Expiry detection**: whether an absence has outlived a site's threshold
//!   ([`expiry`]).
//! - **Jobs and pipelines**: job counters and the order in which phases chain
//!   ([`Job`], [`Pipeline`]).
//!
//! # Invariants
//!
//! - ENDED allocations never transition again
//! - Reconciliation is idempotent: re-applying it to a reconciled set changes nothing
//! - A job succeeds exactly once, when its completed count first reaches its total

mod allocation;
mod attendance;
mod creation;
mod error;
pub mod expiry;
mod job;
mod pipeline;
pub mod reconcile;
mod schedule;

pub use allocation::*;
pub use attendance::*;
pub use creation::plan_attendance;
pub use error::{AllocationError, JobStateError};
pub use expiry::{ExpiryDecision, ExpiryPolicy, Movement, PrisonerSnapshot, CustodyStatus};
pub use job::{Job, JobState};
pub use pipeline::{Pipeline, StageCondition};
pub use schedule::*;
