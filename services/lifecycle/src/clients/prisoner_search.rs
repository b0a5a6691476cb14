use std::time::Duration;

use async_trait::async_trait;
use regime_domain::{CustodyStatus, PrisonerSnapshot};
use regime_id::{PrisonCode, PrisonerNumber};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{build_http_client, check_status, ClientError, DEFAULT_TIMEOUT};
use crate::ports::PrisonerSearch;

const SERVICE: &str = "prisoner-search";

/// Largest id list sent in one request.
const BATCH_SIZE: usize = 1000;

/// Identity and current location lookup.
pub struct PrisonerSearchClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrisonerNumbersRequest<'a> {
    prisoner_numbers: &'a [PrisonerNumber],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrisonerRecord {
    prisoner_number: String,
    prison_id: Option<String>,
    status: Option<CustodyStatus>,
}

impl PrisonerSearchClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_batch(&self, numbers: &[PrisonerNumber]) -> Result<Vec<PrisonerRecord>, ClientError> {
        let url = format!("{}/prisoner-search/prisoner-numbers", self.base_url);
        debug!(url = %url, count = numbers.len(), "Searching prisoners");

        let response = self
            .client
            .post(&url)
            .json(&PrisonerNumbersRequest {
                prisoner_numbers: numbers,
            })
            .send()
            .await?;

        Ok(check_status(SERVICE, response).await?.json().await?)
    }
}

impl PrisonerRecord {
    fn into_snapshot(self) -> Option<PrisonerSnapshot> {
        let prisoner_number = match PrisonerNumber::parse(&self.prisoner_number) {
            Ok(number) => number,
            Err(e) => {
                warn!(error = %e, "Ignoring prisoner search result with invalid prisoner number");
                return None;
            }
        };
        Some(PrisonerSnapshot {
            prisoner_number,
            prison_code: self.prison_id.and_then(|id| PrisonCode::parse(&id).ok()),
            status: self.status.unwrap_or(CustodyStatus::Unknown),
        })
    }
}

#[async_trait]
impl PrisonerSearch for PrisonerSearchClient {
    async fn find_by_prisoner_numbers(
        &self,
        numbers: &[PrisonerNumber],
    ) -> Result<Vec<PrisonerSnapshot>, ClientError> {
        let mut snapshots = Vec::with_capacity(numbers.len());
        for batch in numbers.chunks(BATCH_SIZE) {
            let records = self.fetch_batch(batch).await?;
            snapshots.extend(records.into_iter().filter_map(PrisonerRecord::into_snapshot));
        }
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn numbers(values: &[&str]) -> Vec<PrisonerNumber> {
        values.iter().map(|v| PrisonerNumber::parse(v).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_find_by_prisoner_numbers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/prisoner-search/prisoner-numbers"))
            .and(body_json(serde_json::json!({
                "prisonerNumbers": ["A1111AA", "B2222BB"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "prisonerNumber": "A1111AA", "prisonId": "MDI", "status": "ACTIVE IN" },
                { "prisonerNumber": "B2222BB", "prisonId": "OUT", "status": "INACTIVE OUT" }
            ])))
            .mount(&mock_server)
            .await;

        let client = PrisonerSearchClient::new(mock_server.uri()).unwrap();
        let snapshots = client
            .find_by_prisoner_numbers(&numbers(&["A1111AA", "B2222BB"]))
            .await
            .unwrap();

        assert_eq!(snapshots.len(), 2);
        assert!(snapshots[0].is_at(&PrisonCode::parse("MDI").unwrap()));
        assert_eq!(snapshots[1].status, CustodyStatus::InactiveOut);
    }

    #[tokio::test]
    async fn test_unknown_status_and_bad_numbers_tolerated() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/prisoner-search/prisoner-numbers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "prisonerNumber": "A1111AA", "prisonId": "MDI", "status": "ACTIVE OUT" },
                { "prisonerNumber": "A1111AA", "prisonId": "MDI" },
                { "prisonerNumber": "not-a-number", "prisonId": "MDI", "status": "ACTIVE IN" }
            ])))
            .mount(&mock_server)
            .await;

        let client = PrisonerSearchClient::new(mock_server.uri()).unwrap();
        let snapshots = client
            .find_by_prisoner_numbers(&numbers(&["A1111AA"]))
            .await
            .unwrap();

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].status, CustodyStatus::ActiveOut);
        assert_eq!(snapshots[1].status, CustodyStatus::Unknown);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/prisoner-search/prisoner-numbers"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&mock_server)
            .await;

        let client = PrisonerSearchClient::new(mock_server.uri()).unwrap();
        let err = client
            .find_by_prisoner_numbers(&numbers(&["A1111AA"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/prisoner-search/prisoner-numbers"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&mock_server)
            .await;

        let client =
            PrisonerSearchClient::with_timeout(mock_server.uri(), Duration::from_millis(100)).unwrap();
        let err = client
            .find_by_prisoner_numbers(&numbers(&["A1111AA"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Request(_)));
    }
}
