//! # regime-id
//!
//! Stable ID types, parsing, and validation for the activities regime engine.
//!
//! ## Generated IDs
//!
//! Records created by this system (allocations, attendances, jobs, ...) carry
//! a prefixed ULID: `{prefix}_{ulid}`.
//!
//! - `alc_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `att_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `job_01HV4Z4NYPLTRS0JTUA8XDME5F`
//!
//! ## Natural keys
//!
//! Identifiers owned by other systems are validated but never generated:
//!
//! - [`PrisonCode`] identifies a site, e.g. `MDI`
//! - [`PrisonerNumber`] identifies a person, e.g. `A1234BC`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
