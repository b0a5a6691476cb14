//! Commit-then-publish for allocation changes.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use regime_domain::{reconcile, Allocation, AttendanceReason};
use regime_id::AttendanceId;

use crate::db::DbError;
use crate::events::EventPublisher;
use crate::ports::{ChangeSet, LifecycleStore};

/// What an allocation change does to its future attendances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceEffect {
    Unchanged,
    /// Complete waiting records with `reason`.
    Suspend {
        reason: AttendanceReason,
        issue_payment: bool,
    },
    /// Undo `reason` on records that carry it.
    Reset { reason: AttendanceReason },
}

/// Writes one change set per call and announces it once committed.
#[derive(Clone)]
pub struct UnitOfWork {
    pub store: Arc<dyn LifecycleStore>,
    pub events: EventPublisher,
}

impl UnitOfWork {
    pub fn new(store: Arc<dyn LifecycleStore>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    /// Commits `changes` in one transaction, then publishes its events.
    ///
    /// Returns the ids of the attendances actually inserted.
    pub async fn commit(&self, changes: ChangeSet) -> Result<Vec<AttendanceId>, DbError> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        let inserted = self.store.commit(&changes).await?;
        self.events
            .publish_after_commit(changes.events(&inserted))
            .await;
        Ok(inserted)
    }

    /// Commits an already-transitioned allocation together with `effect` on
    /// its attendances from `as_of` onwards. Returns how many attendances changed.
    pub async fn apply(
        &self,
        allocation: Allocation,
        effect: AttendanceEffect,
        as_of: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<usize, DbError> {
        let mut changes = ChangeSet::default();

        if effect != AttendanceEffect::Unchanged {
            let mut records = self.store.attendances_from(&allocation, as_of).await?;
            let changed = match effect {
                AttendanceEffect::Suspend {
                    reason,
                    issue_payment,
                } => reconcile::suspend_future_attendances(
                    as_of,
                    now,
                    &allocation,
                    &mut records,
                    reason,
                    issue_payment,
                ),
                AttendanceEffect::Reset { reason } => reconcile::reset_suspended_future_attendances(
                    as_of,
                    now,
                    &allocation,
                    &mut records,
                    reason,
                ),
                AttendanceEffect::Unchanged => Vec::new(),
            };
            changes.touch_attendances(&records, &changed);
        }

        let attendances = changes.updated_attendances.len();
        changes.allocations.push(allocation);
        self.commit(changes).await?;
        Ok(attendances)
    }
}
