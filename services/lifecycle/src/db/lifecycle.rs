//! Allocations, attendances, sessions and the waiting list.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regime_domain::{
    ActivitySchedule, Allocation, AllocationStatus, Attendance, PlannedDeallocation,
    PlannedSuspension, ScheduledSession, SessionAttendance, SessionCancellation, SlotExclusion,
    WaitingListApplication,
};
use regime_id::{ActivityScheduleId, AllocationId, AttendanceId, PrisonCode, PrisonerNumber, ScheduledInstanceId};
use sqlx::{postgres::PgPool, postgres::PgRow, Postgres, Row, Transaction};
use tracing::debug;

use super::{parse_column, DbError};
use crate::ports::{ChangeSet, LifecycleStore};

const ALLOCATION_COLUMNS: &str = r#"
    allocation_id, prison_code, activity_schedule_id, prisoner_number, status,
    start_date, end_date, pay_band, exclusions, planned_suspension, planned_deallocation,
    allocated_by, allocated_at, suspended_by, suspended_at, suspended_reason,
    deallocated_by, deallocated_at, deallocated_reason
"#;

const SESSION_COLUMNS: &str = r#"
    si.scheduled_instance_id, si.activity_schedule_id, s.prison_code, si.session_date,
    si.start_time, si.end_time, si.time_slot, si.cancelled, si.cancelled_reason,
    si.cancelled_issue_payment
"#;

const ATTENDANCE_COLUMNS: &str = r#"
    a.attendance_id, a.prisoner_number, a.status, a.reason, a.issue_payment, a.pay_amount,
    a.recorded_by, a.recorded_at, a.finalised
"#;

// =============================================================================
// Rows
// =============================================================================

/// A row from the allocations table.
#[derive(Debug, Clone)]
struct AllocationRow {
    allocation_id: String,
    prison_code: String,
    activity_schedule_id: String,
    prisoner_number: String,
    status: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    pay_band: Option<String>,
    exclusions: serde_json::Value,
    planned_suspension: Option<serde_json::Value>,
    planned_deallocation: Option<serde_json::Value>,
    allocated_by: String,
    allocated_at: NaiveDateTime,
    suspended_by: Option<String>,
    suspended_at: Option<NaiveDateTime>,
    suspended_reason: Option<String>,
    deallocated_by: Option<String>,
    deallocated_at: Option<NaiveDateTime>,
    deallocated_reason: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for AllocationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            allocation_id: row.try_get("allocation_id")?,
            prison_code: row.try_get("prison_code")?,
            activity_schedule_id: row.try_get("activity_schedule_id")?,
            prisoner_number: row.try_get("prisoner_number")?,
            status: row.try_get("status")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            pay_band: row.try_get("pay_band")?,
            exclusions: row.try_get("exclusions")?,
            planned_suspension: row.try_get("planned_suspension")?,
            planned_deallocation: row.try_get("planned_deallocation")?,
            allocated_by: row.try_get("allocated_by")?,
            allocated_at: row.try_get("allocated_at")?,
            suspended_by: row.try_get("suspended_by")?,
            suspended_at: row.try_get("suspended_at")?,
            suspended_reason: row.try_get("suspended_reason")?,
            deallocated_by: row.try_get("deallocated_by")?,
            deallocated_at: row.try_get("deallocated_at")?,
            deallocated_reason: row.try_get("deallocated_reason")?,
        })
    }
}

impl TryFrom<AllocationRow> for Allocation {
    type Error = DbError;

    fn try_from(row: AllocationRow) -> Result<Self, Self::Error> {
        let exclusions: Vec<SlotExclusion> = serde_json::from_value(row.exclusions)?;
        let planned_suspension: Option<PlannedSuspension> = row
            .planned_suspension
            .map(serde_json::from_value)
            .transpose()?;
        let planned_deallocation: Option<PlannedDeallocation> = row
            .planned_deallocation
            .map(serde_json::from_value)
            .transpose()?;

        Ok(Allocation {
            allocation_id: parse_column("allocation_id", &row.allocation_id)?,
            prison_code: parse_column("prison_code", &row.prison_code)?,
            activity_schedule_id: parse_column("activity_schedule_id", &row.activity_schedule_id)?,
            prisoner_number: parse_column("prisoner_number", &row.prisoner_number)?,
            status: parse_column("status", &row.status)?,
            start_date: row.start_date,
            end_date: row.end_date,
            pay_band: row.pay_band,
            exclusions,
            planned_suspension,
            planned_deallocation,
            allocated_by: row.allocated_by,
            allocated_at: row.allocated_at,
            suspended_by: row.suspended_by,
            suspended_at: row.suspended_at,
            suspended_reason: row.suspended_reason,
            deallocated_by: row.deallocated_by,
            deallocated_at: row.deallocated_at,
            deallocated_reason: row
                .deallocated_reason
                .map(|r| parse_column("deallocated_reason", &r))
                .transpose()?,
        })
    }
}

fn session_from_row(row: &PgRow) -> Result<ScheduledSession, DbError> {
    let instance_id: String = row.try_get("scheduled_instance_id").map_err(DbError::Query)?;
    let schedule_id: String = row.try_get("activity_schedule_id").map_err(DbError::Query)?;
    let prison_code: String = row.try_get("prison_code").map_err(DbError::Query)?;
    let time_slot: String = row.try_get("time_slot").map_err(DbError::Query)?;
    let cancelled: bool = row.try_get("cancelled").map_err(DbError::Query)?;
    let cancelled_reason: Option<String> = row.try_get("cancelled_reason").map_err(DbError::Query)?;
    let cancelled_issue_payment: Option<bool> =
        row.try_get("cancelled_issue_payment").map_err(DbError::Query)?;
    let start_time: NaiveTime = row.try_get("start_time").map_err(DbError::Query)?;
    let end_time: NaiveTime = row.try_get("end_time").map_err(DbError::Query)?;

    Ok(ScheduledSession {
        scheduled_instance_id: parse_column("scheduled_instance_id", &instance_id)?,
        activity_schedule_id: parse_column("activity_schedule_id", &schedule_id)?,
        prison_code: parse_column("prison_code", &prison_code)?,
        session_date: row.try_get("session_date").map_err(DbError::Query)?,
        start_time,
        end_time,
        time_slot: parse_column("time_slot", &time_slot)?,
        cancellation: cancelled.then(|| SessionCancellation {
            reason: cancelled_reason.unwrap_or_default(),
            issue_payment: cancelled_issue_payment.unwrap_or(false),
        }),
    })
}

fn attendance_from_row(row: &PgRow, session: ScheduledInstanceId) -> Result<Attendance, DbError> {
    let attendance_id: String = row.try_get("attendance_id").map_err(DbError::Query)?;
    let prisoner_number: String = row.try_get("prisoner_number").map_err(DbError::Query)?;
    let status: String = row.try_get("status").map_err(DbError::Query)?;
    let reason: Option<String> = row.try_get("reason").map_err(DbError::Query)?;

    Ok(Attendance {
        attendance_id: parse_column("attendance_id", &attendance_id)?,
        scheduled_instance_id: session,
        prisoner_number: parse_column("prisoner_number", &prisoner_number)?,
        status: parse_column("status", &status)?,
        reason: reason.map(|r| parse_column("reason", &r)).transpose()?,
        issue_payment: row.try_get("issue_payment").map_err(DbError::Query)?,
        pay_amount: row.try_get("pay_amount").map_err(DbError::Query)?,
        recorded_by: row.try_get("recorded_by").map_err(DbError::Query)?,
        recorded_at: row.try_get("recorded_at").map_err(DbError::Query)?,
        finalised: row.try_get("finalised").map_err(DbError::Query)?,
    })
}

// =============================================================================
// Store
// =============================================================================

/// Postgres-backed [`LifecycleStore`].
#[derive(Clone)]
pub struct PgLifecycleStore {
    pool: PgPool,
}

impl PgLifecycleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_allocations(
        &self,
        sql: &str,
        binds: &[String],
    ) -> Result<Vec<Allocation>, DbError> {
        let mut query = sqlx::query_as::<_, AllocationRow>(sql);
        for value in binds {
            query = query.bind(value);
        }
        query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?
            .into_iter()
            .map(Allocation::try_from)
            .collect()
    }

    async fn update_allocation(
        tx: &mut Transaction<'_, Postgres>,
        allocation: &Allocation,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE allocations
            SET status = $2,
                end_date = $3,
                exclusions = $4,
                planned_suspension = $5,
                planned_deallocation = $6,
                suspended_by = $7,
                suspended_at = $8,
                suspended_reason = $9,
                deallocated_by = $10,
                deallocated_at = $11,
                deallocated_reason = $12,
                updated_at = now()
            WHERE allocation_id = $1
            "#,
        )
        .bind(allocation.allocation_id.to_string())
        .bind(allocation.status.as_str())
        .bind(allocation.end_date)
        .bind(serde_json::to_value(&allocation.exclusions)?)
        .bind(
            allocation
                .planned_suspension
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(
            allocation
                .planned_deallocation
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(&allocation.suspended_by)
        .bind(allocation.suspended_at)
        .bind(&allocation.suspended_reason)
        .bind(&allocation.deallocated_by)
        .bind(allocation.deallocated_at)
        .bind(allocation.deallocated_reason.map(|r| r.as_str()))
        .execute(&mut **tx)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }

    async fn update_attendance(
        tx: &mut Transaction<'_, Postgres>,
        attendance: &Attendance,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE attendances
            SET status = $2,
                reason = $3,
                issue_payment = $4,
                pay_amount = $5,
                recorded_by = $6,
                recorded_at = $7
            WHERE attendance_id = $1 AND finalised = false
            "#,
        )
        .bind(attendance.attendance_id.to_string())
        .bind(attendance.status.as_str())
        .bind(attendance.reason.map(|r| r.as_str()))
        .bind(attendance.issue_payment)
        .bind(attendance.pay_amount)
        .bind(&attendance.recorded_by)
        .bind(attendance.recorded_at)
        .execute(&mut **tx)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }

    async fn insert_attendance(
        tx: &mut Transaction<'_, Postgres>,
        attendance: &Attendance,
    ) -> Result<bool, DbError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO attendances (
                attendance_id, scheduled_instance_id, prisoner_number, status, reason,
                issue_payment, pay_amount, recorded_by, recorded_at, finalised
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (scheduled_instance_id, prisoner_number) DO NOTHING
            RETURNING attendance_id
            "#,
        )
        .bind(attendance.attendance_id.to_string())
        .bind(attendance.scheduled_instance_id.to_string())
        .bind(attendance.prisoner_number.as_str())
        .bind(attendance.status.as_str())
        .bind(attendance.reason.map(|r| r.as_str()))
        .bind(attendance.issue_payment)
        .bind(attendance.pay_amount)
        .bind(&attendance.recorded_by)
        .bind(attendance.recorded_at)
        .bind(attendance.finalised)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DbError::Query)?;
        Ok(inserted.is_some())
    }

    async fn update_waiting_list(
        tx: &mut Transaction<'_, Postgres>,
        application: &WaitingListApplication,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE waiting_list
            SET status = $2, updated_at = now()
            WHERE waiting_list_id = $1
            "#,
        )
        .bind(application.waiting_list_id.to_string())
        .bind(application.status.as_str())
        .execute(&mut **tx)
        .await
        .map_err(DbError::Query)?;
        Ok(())
    }
}

#[async_trait]
impl LifecycleStore for PgLifecycleStore {
    async fn allocations_by_status(
        &self,
        prison: &PrisonCode,
        statuses: &[AllocationStatus],
    ) -> Result<Vec<Allocation>, DbError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {ALLOCATION_COLUMNS} FROM allocations \
             WHERE prison_code = $1 AND status = ANY($2) ORDER BY allocation_id"
        );
        sqlx::query_as::<_, AllocationRow>(&sql)
            .bind(prison.as_str())
            .bind(statuses)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?
            .into_iter()
            .map(Allocation::try_from)
            .collect()
    }

    async fn allocations_by_ids(&self, ids: &[AllocationId]) -> Result<Vec<Allocation>, DbError> {
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let sql = format!(
            "SELECT {ALLOCATION_COLUMNS} FROM allocations \
             WHERE allocation_id = ANY($1) ORDER BY allocation_id"
        );
        sqlx::query_as::<_, AllocationRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?
            .into_iter()
            .map(Allocation::try_from)
            .collect()
    }

    async fn allocations_for_prisoner(
        &self,
        prison: &PrisonCode,
        prisoner: &PrisonerNumber,
    ) -> Result<Vec<Allocation>, DbError> {
        let sql = format!(
            "SELECT {ALLOCATION_COLUMNS} FROM allocations \
             WHERE prison_code = $1 AND prisoner_number = $2 AND status <> 'ENDED' \
             ORDER BY allocation_id"
        );
        self.fetch_allocations(&sql, &[prison.to_string(), prisoner.to_string()])
            .await
    }

    async fn allocations_for_schedule(
        &self,
        schedule: ActivityScheduleId,
    ) -> Result<Vec<Allocation>, DbError> {
        let sql = format!(
            "SELECT {ALLOCATION_COLUMNS} FROM allocations \
             WHERE activity_schedule_id = $1 AND status <> 'ENDED' ORDER BY allocation_id"
        );
        self.fetch_allocations(&sql, &[schedule.to_string()]).await
    }

    async fn schedules_ending_by(
        &self,
        prison: &PrisonCode,
        date: NaiveDate,
    ) -> Result<Vec<ActivitySchedule>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT activity_schedule_id, prison_code, description, start_date, end_date
            FROM activity_schedules
            WHERE prison_code = $1 AND end_date IS NOT NULL AND end_date <= $2
            ORDER BY activity_schedule_id
            "#,
        )
        .bind(prison.as_str())
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("activity_schedule_id").map_err(DbError::Query)?;
                let prison: String = row.try_get("prison_code").map_err(DbError::Query)?;
                Ok(ActivitySchedule {
                    activity_schedule_id: parse_column("activity_schedule_id", &id)?,
                    prison_code: parse_column("prison_code", &prison)?,
                    description: row.try_get("description").map_err(DbError::Query)?,
                    start_date: row.try_get("start_date").map_err(DbError::Query)?,
                    end_date: row.try_get("end_date").map_err(DbError::Query)?,
                })
            })
            .collect()
    }

    async fn sessions_on(
        &self,
        prison: &PrisonCode,
        date: NaiveDate,
    ) -> Result<Vec<ScheduledSession>, DbError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM scheduled_instances si \
             JOIN activity_schedules s ON s.activity_schedule_id = si.activity_schedule_id \
             WHERE s.prison_code = $1 AND si.session_date = $2 \
             ORDER BY si.start_time, si.scheduled_instance_id"
        );
        let rows = sqlx::query(&sql)
            .bind(prison.as_str())
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?;

        rows.iter().map(session_from_row).collect()
    }

    async fn attendances_from(
        &self,
        allocation: &Allocation,
        from: NaiveDate,
    ) -> Result<Vec<SessionAttendance>, DbError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS}, {ATTENDANCE_COLUMNS} FROM attendances a \
             JOIN scheduled_instances si ON si.scheduled_instance_id = a.scheduled_instance_id \
             JOIN activity_schedules s ON s.activity_schedule_id = si.activity_schedule_id \
             WHERE a.prisoner_number = $1 AND si.activity_schedule_id = $2 AND si.session_date >= $3 \
             ORDER BY si.session_date, si.start_time"
        );
        let rows = sqlx::query(&sql)
            .bind(allocation.prisoner_number.as_str())
            .bind(allocation.activity_schedule_id.to_string())
            .bind(from)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?;

        rows.iter()
            .map(|row| {
                let session = session_from_row(row)?;
                let attendance = attendance_from_row(row, session.scheduled_instance_id)?;
                Ok(SessionAttendance {
                    session,
                    attendance,
                })
            })
            .collect()
    }

    async fn attendees(
        &self,
        session: ScheduledInstanceId,
    ) -> Result<HashSet<PrisonerNumber>, DbError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT prisoner_number FROM attendances WHERE scheduled_instance_id = $1",
        )
        .bind(session.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.iter()
            .map(|number| parse_column("prisoner_number", number))
            .collect()
    }

    async fn waiting_attendances_on(
        &self,
        prison: &PrisonCode,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceId>, DbError> {
        let rows: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT a.attendance_id
            FROM attendances a
            JOIN scheduled_instances si ON si.scheduled_instance_id = a.scheduled_instance_id
            JOIN activity_schedules s ON s.activity_schedule_id = si.activity_schedule_id
            WHERE s.prison_code = $1 AND si.session_date = $2 AND a.status = 'WAITING'
            ORDER BY a.attendance_id
            "#,
        )
        .bind(prison.as_str())
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.iter()
            .map(|id| parse_column("attendance_id", id))
            .collect()
    }

    async fn open_waiting_list(
        &self,
        prison: &PrisonCode,
    ) -> Result<Vec<WaitingListApplication>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT waiting_list_id, prison_code, prisoner_number, activity_schedule_id, status
            FROM waiting_list
            WHERE prison_code = $1 AND status IN ('PENDING', 'APPROVED')
            ORDER BY waiting_list_id
            "#,
        )
        .bind(prison.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        rows.iter()
            .map(|row| {
                let get = |column: &'static str| -> Result<String, DbError> {
                    row.try_get(column).map_err(DbError::Query)
                };
                Ok(WaitingListApplication {
                    waiting_list_id: parse_column("waiting_list_id", &get("waiting_list_id")?)?,
                    prison_code: parse_column("prison_code", &get("prison_code")?)?,
                    prisoner_number: parse_column("prisoner_number", &get("prisoner_number")?)?,
                    activity_schedule_id: parse_column(
                        "activity_schedule_id",
                        &get("activity_schedule_id")?,
                    )?,
                    status: parse_column("status", &get("status")?)?,
                })
            })
            .collect()
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<Vec<AttendanceId>, DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::Query)?;

        for allocation in &changes.allocations {
            Self::update_allocation(&mut tx, allocation).await?;
        }
        for attendance in &changes.updated_attendances {
            Self::update_attendance(&mut tx, attendance).await?;
        }
        let mut inserted = Vec::new();
        for attendance in &changes.new_attendances {
            if Self::insert_attendance(&mut tx, attendance).await? {
                inserted.push(attendance.attendance_id);
            }
        }
        for application in &changes.waiting_list {
            Self::update_waiting_list(&mut tx, application).await?;
        }

        tx.commit().await.map_err(DbError::Query)?;

        debug!(
            allocations = changes.allocations.len(),
            attendances_updated = changes.updated_attendances.len(),
            attendances_inserted = inserted.len(),
            waiting_list = changes.waiting_list.len(),
            "Committed change set"
        );
        Ok(inserted)
    }
}
