//! Expiry detection.
//!
//! Decides whether a person who is not at the site they are allocated at has
//! been away for longer than the site allows. The decision takes two lookups
//! the caller performs: current location for the whole candidate set, then
//! movement history for only those found away.
//!
//! A person with no movement record is never expired and never kept: they are
//! reported separately so an operator can look at them.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regime_id::{PrisonCode, PrisonerNumber};
use serde::{Deserialize, Serialize};

/// Custody status as reported by the identity lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustodyStatus {
    #[serde(rename = "ACTIVE IN")]
    ActiveIn,
    #[serde(rename = "ACTIVE OUT")]
    ActiveOut,
    #[serde(rename = "INACTIVE OUT")]
    InactiveOut,
    #[serde(rename = "INACTIVE TRN")]
    InactiveTransfer,
    #[serde(other)]
    Unknown,
}

/// A person's current identity and location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrisonerSnapshot {
    pub prisoner_number: PrisonerNumber,
    pub prison_code: Option<PrisonCode>,
    pub status: CustodyStatus,
}

impl PrisonerSnapshot {
    /// Whether the person is physically in custody at `prison`.
    pub fn is_at(&self, prison: &PrisonCode) -> bool {
        self.status == CustodyStatus::ActiveIn && self.prison_code.as_ref() == Some(prison)
    }
}

/// One dated movement record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub prisoner_number: PrisonerNumber,
    pub movement_type: String,
    pub movement_date: NaiveDate,
    pub movement_time: NaiveTime,
    pub from_prison: Option<PrisonCode>,
    pub to_prison: Option<PrisonCode>,
}

impl Movement {
    pub fn moved_at(&self) -> NaiveDateTime {
        self.movement_date.and_time(self.movement_time)
    }
}

/// A site's tolerance for absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub max_days_to_expiry: u32,
}

impl ExpiryPolicy {
    pub fn new(max_days_to_expiry: u32) -> Self {
        Self { max_days_to_expiry }
    }

    /// Expired once `max_days_to_expiry` whole days have passed since the move.
    pub fn is_expired(&self, today: NaiveDate, moved_on: NaiveDate) -> bool {
        (today - moved_on).num_days() >= i64::from(self.max_days_to_expiry)
    }

    /// Decides expiry for people already known to be away.
    pub fn decide(
        &self,
        today: NaiveDate,
        absent: &[PrisonerNumber],
        movements: &[Movement],
    ) -> ExpiryDecision {
        let latest = latest_movements(movements);
        let mut decision = ExpiryDecision::default();

        for prisoner in absent {
            match latest.get(prisoner) {
                Some(moved_at) if self.is_expired(today, moved_at.date()) => {
                    decision.expired.push(prisoner.clone());
                }
                Some(_) => decision.retained.push(prisoner.clone()),
                None => decision.no_movements.push(prisoner.clone()),
            }
        }

        decision
    }
}

/// The outcome of an expiry check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiryDecision {
    /// Away for at least the threshold.
    pub expired: Vec<PrisonerNumber>,
    /// Away, but not for long enough.
    pub retained: Vec<PrisonerNumber>,
    /// Away with no movement on record; left unchanged.
    pub no_movements: Vec<PrisonerNumber>,
}

/// Candidates not currently in custody at `prison`.
///
/// A candidate the identity lookup did not return is treated as away; the
/// movement history then decides.
pub fn absent_from(
    prison: &PrisonCode,
    candidates: &[PrisonerNumber],
    snapshots: &[PrisonerSnapshot],
) -> Vec<PrisonerNumber> {
    candidates
        .iter()
        .filter(|candidate| {
            !snapshots
                .iter()
                .any(|s| &s.prisoner_number == *candidate && s.is_at(prison))
        })
        .cloned()
        .collect()
}

/// The most recent movement per person, by date and then time.
pub fn latest_movements(movements: &[Movement]) -> BTreeMap<PrisonerNumber, NaiveDateTime> {
    let mut latest: BTreeMap<PrisonerNumber, NaiveDateTime> = BTreeMap::new();
    for movement in movements {
        let moved_at = movement.moved_at();
        latest
            .entry(movement.prisoner_number.clone())
            .and_modify(|current| {
                if moved_at > *current {
                    *current = moved_at;
                }
            })
            .or_insert(moved_at);
    }
    latest
}
