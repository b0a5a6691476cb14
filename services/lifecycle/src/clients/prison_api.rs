use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use regime_domain::Movement;
use regime_id::{PrisonCode, PrisonerNumber};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{build_http_client, check_status, ClientError, DEFAULT_TIMEOUT};
use crate::ports::MovementHistory;

const SERVICE: &str = "prison-api";

/// Movement history lookup.
pub struct PrisonApiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovementRecord {
    offender_no: String,
    movement_type: String,
    movement_date: NaiveDate,
    movement_time: NaiveTime,
    from_agency: Option<String>,
    to_agency: Option<String>,
}

impl MovementRecord {
    fn into_movement(self) -> Option<Movement> {
        let prisoner_number = match PrisonerNumber::parse(&self.offender_no) {
            Ok(number) => number,
            Err(e) => {
                warn!(error = %e, "Ignoring movement with invalid prisoner number");
                return None;
            }
        };
        Some(Movement {
            prisoner_number,
            movement_type: self.movement_type,
            movement_date: self.movement_date,
            movement_time: self.movement_time,
            from_prison: self.from_agency.and_then(|a| PrisonCode::parse(&a).ok()),
            to_prison: self.to_agency.and_then(|a| PrisonCode::parse(&a).ok()),
        })
    }
}

impl PrisonApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MovementHistory for PrisonApiClient {
    async fn movements_for(&self, numbers: &[PrisonerNumber]) -> Result<Vec<Movement>, ClientError> {
        if numbers.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/movements/offenders", self.base_url);
        debug!(url = %url, count = numbers.len(), "Fetching movement history");

        let response = self
            .client
            .post(&url)
            .query(&[("latestOnly", "false")])
            .json(numbers)
            .send()
            .await?;

        let records: Vec<MovementRecord> = check_status(SERVICE, response).await?.json().await?;
        Ok(records
            .into_iter()
            .filter_map(MovementRecord::into_movement)
            .collect())
    }
}
