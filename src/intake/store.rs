use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use super::domain::{
    EnrichedRecord, LoanSummary, PersistedRecord, RecordId, SortDirection, SortField, SortOrder,
};

const SUMMARY_COLUMNS: &str = "id,loan_amount,credit_score,income,risk_score,approval_status";

/// Failure reported by the durable store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("store acknowledged {returned} of {submitted} inserted records")]
    IdCountMismatch { submitted: usize, returned: usize },
}

/// Row insert/query service holding enriched applicant records.
///
/// `insert` is one bulk operation: it either lands the whole slice and returns one
/// identifier per record in input order, or fails as a whole.
#[async_trait]
pub trait ApplicantStore: Send + Sync {
    async fn insert(&self, records: &[EnrichedRecord]) -> Result<Vec<RecordId>, StoreError>;
    async fn query(&self, order: SortOrder) -> Result<Vec<LoanSummary>, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Write a scored batch with a single insert and attach the assigned identifiers.
pub async fn persist<W>(
    store: &W,
    records: Vec<EnrichedRecord>,
) -> Result<Vec<PersistedRecord>, StoreError>
where
    W: ApplicantStore + ?Sized,
{
    let ids = store.insert(&records).await?;
    if ids.len() != records.len() {
        return Err(StoreError::IdCountMismatch {
            submitted: records.len(),
            returned: ids.len(),
        });
    }

    Ok(ids
        .into_iter()
        .zip(records)
        .map(|(id, record)| PersistedRecord { id, record })
        .collect())
}

/// Order summaries the way the REST store's `order=` clause would. The sort is stable.
pub fn sort_summaries(summaries: &mut [LoanSummary], order: SortOrder) {
    let compare = |left: &LoanSummary, right: &LoanSummary| -> Ordering {
        match order.field {
            SortField::RiskScore => left.risk_score.total_cmp(&right.risk_score),
            SortField::ApprovalStatus => left
                .approval_status
                .label()
                .cmp(right.approval_status.label()),
        }
    };

    match order.direction {
        SortDirection::Asc => summaries.sort_by(compare),
        SortDirection::Desc => summaries.sort_by(|left, right| compare(right, left)),
    }
}

/// Process-local store used when no REST endpoint is configured.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    records: Arc<Mutex<Vec<PersistedRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Result<Vec<PersistedRecord>, StoreError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store poisoned".to_string()))?;
        Ok(guard.clone())
    }
}

#[async_trait]
impl ApplicantStore for InMemoryStore {
    async fn insert(&self, records: &[EnrichedRecord]) -> Result<Vec<RecordId>, StoreError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store poisoned".to_string()))?;

        let persisted: Vec<PersistedRecord> = records
            .iter()
            .map(|record| PersistedRecord {
                id: RecordId(Uuid::new_v4().to_string()),
                record: *record,
            })
            .collect();
        let ids = persisted.iter().map(|record| record.id.clone()).collect();
        guard.extend(persisted);
        Ok(ids)
    }

    async fn query(&self, order: SortOrder) -> Result<Vec<LoanSummary>, StoreError> {
        let mut summaries: Vec<LoanSummary> = self
            .records()?
            .iter()
            .map(PersistedRecord::summary)
            .collect();
        sort_summaries(&mut summaries, order);
        Ok(summaries)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.records().map(|_| ())
    }
}

#[derive(Deserialize)]
struct InsertedRow {
    id: RecordId,
}

/// PostgREST-style table endpoint (`{base}/rest/v1/{table}`), as exposed by Supabase.
#[derive(Debug, Clone)]
pub struct RestStore {
    http: reqwest::Client,
    table_url: String,
    timeout: Duration,
}

impl RestStore {
    pub fn new(
        base_url: &str,
        api_key: &str,
        table: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|err| StoreError::Unavailable(format!("invalid api key header: {err}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|err| StoreError::Unavailable(format!("invalid auth header: {err}")))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        Ok(Self {
            http,
            table_url: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            timeout,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout {
                after: self.timeout,
            }
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }

    async fn read_json<T>(&self, response: reqwest::Response) -> Result<T, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;
        serde_json::from_slice(&body).map_err(|err| StoreError::MalformedResponse(err.to_string()))
    }
}

#[async_trait]
impl ApplicantStore for RestStore {
    #[instrument(name = "store_rest_insert", skip_all, fields(batch_size = records.len()))]
    async fn insert(&self, records: &[EnrichedRecord]) -> Result<Vec<RecordId>, StoreError> {
        let response = self
            .http
            .post(&self.table_url)
            .query(&[("select", "id")])
            .header("Prefer", "return=representation")
            .json(records)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let rows: Vec<InsertedRow> = self.read_json(response).await?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    #[instrument(name = "store_rest_query", skip(self))]
    async fn query(&self, order: SortOrder) -> Result<Vec<LoanSummary>, StoreError> {
        let order_clause = format!("{}.{}", order.field.column(), order.direction.keyword());
        let response = self
            .http
            .get(&self.table_url)
            .query(&[("select", SUMMARY_COLUMNS), ("order", order_clause.as_str())])
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        self.read_json(response).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let response = self
            .http
            .get(&self.table_url)
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let _: Vec<serde_json::Value> = self.read_json(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::domain::{ApplicantRecord, ApprovalStatus, ScoringResult};
    use axum::extract::Query;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn enriched(risk_score: f64, approval_status: ApprovalStatus) -> EnrichedRecord {
        EnrichedRecord::new(
            ApplicantRecord {
                age: 45,
                income: 75_000.0,
                loan_amount: 20_000.0,
                credit_score: 720,
                debt_to_income_ratio: 0.3,
                employment_years: 10,
                savings_balance: 15_000.0,
                existing_loans: 1,
            },
            ScoringResult {
                risk_score,
                approval_status,
            },
        )
    }

    async fn spawn_store(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test server runs");
        });
        format!("http://{addr}")
    }

    fn rest_store(base: &str) -> RestStore {
        RestStore::new(base, "anon-key", "loans", Duration::from_secs(5)).expect("store builds")
    }

    #[tokio::test]
    async fn in_memory_insert_assigns_ids_in_order() {
        let store = InMemoryStore::new();
        let batch = vec![
            enriched(0.1, ApprovalStatus::Approved),
            enriched(0.9, ApprovalStatus::Denied),
        ];
        let persisted = persist(&store, batch).await.expect("persists");

        assert_eq!(persisted.len(), 2);
        assert_ne!(persisted[0].id, persisted[1].id);
        assert_eq!(persisted[1].record.risk_score, 0.9);
        assert_eq!(store.records().expect("snapshot"), persisted);
    }

    #[tokio::test]
    async fn in_memory_query_sorts_by_risk_descending() {
        let store = InMemoryStore::new();
        persist(
            &store,
            vec![
                enriched(0.1, ApprovalStatus::Approved),
                enriched(0.9, ApprovalStatus::Denied),
                enriched(0.5, ApprovalStatus::Review),
            ],
        )
        .await
        .expect("persists");

        let listed = store
            .query(SortOrder::new(SortField::RiskScore, SortDirection::Desc))
            .await
            .expect("queries");
        let scores: Vec<f64> = listed.iter().map(|row| row.risk_score).collect();
        assert_eq!(scores, vec![0.9, 0.5, 0.1]);
    }

    #[tokio::test]
    async fn in_memory_query_sorts_by_status_label() {
        let store = InMemoryStore::new();
        persist(
            &store,
            vec![
                enriched(0.3, ApprovalStatus::Review),
                enriched(0.2, ApprovalStatus::Approved),
                enriched(0.4, ApprovalStatus::Denied),
            ],
        )
        .await
        .expect("persists");

        let listed = store
            .query(SortOrder::new(SortField::ApprovalStatus, SortDirection::Asc))
            .await
            .expect("queries");
        let statuses: Vec<ApprovalStatus> = listed.iter().map(|row| row.approval_status).collect();
        assert_eq!(
            statuses,
            vec![
                ApprovalStatus::Approved,
                ApprovalStatus::Denied,
                ApprovalStatus::Review
            ]
        );
    }

    struct ShortChangingStore;

    #[async_trait]
    impl ApplicantStore for ShortChangingStore {
        async fn insert(&self, _records: &[EnrichedRecord]) -> Result<Vec<RecordId>, StoreError> {
            Ok(vec![RecordId("only-one".to_string())])
        }

        async fn query(&self, _order: SortOrder) -> Result<Vec<LoanSummary>, StoreError> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn persist_rejects_missing_identifiers() {
        let error = persist(
            &ShortChangingStore,
            vec![
                enriched(0.1, ApprovalStatus::Approved),
                enriched(0.2, ApprovalStatus::Approved),
            ],
        )
        .await
        .expect_err("id mismatch");
        assert_eq!(
            error,
            StoreError::IdCountMismatch {
                submitted: 2,
                returned: 1
            }
        );
    }

    #[tokio::test]
    async fn rest_insert_posts_batch_and_reads_ids() {
        let router = Router::new().route(
            "/rest/v1/loans",
            axum::routing::post(
                |headers: AxumHeaders,
                 Query(params): Query<HashMap<String, String>>,
                 Json(rows): Json<Vec<Value>>| async move {
                    assert_eq!(headers["apikey"], "anon-key");
                    assert_eq!(headers["authorization"], "Bearer anon-key");
                    assert_eq!(headers["prefer"], "return=representation");
                    assert_eq!(params.get("select").map(String::as_str), Some("id"));
                    assert_eq!(rows[0]["approval_status"], "approved");
                    let ids: Vec<Value> = (0..rows.len())
                        .map(|index| json!({ "id": index + 1 }))
                        .collect();
                    (StatusCode::CREATED, Json(Value::Array(ids)))
                },
            ),
        );
        let base = spawn_store(router).await;

        let ids = rest_store(&base)
            .insert(&[
                enriched(0.1, ApprovalStatus::Approved),
                enriched(0.2, ApprovalStatus::Denied),
            ])
            .await
            .expect("inserts");
        assert_eq!(
            ids,
            vec![RecordId("1".to_string()), RecordId("2".to_string())]
        );
    }

    #[tokio::test]
    async fn rest_query_passes_order_clause() {
        let router = Router::new().route(
            "/rest/v1/loans",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("select").map(String::as_str), Some(SUMMARY_COLUMNS));
                assert_eq!(
                    params.get("order").map(String::as_str),
                    Some("approval_status.asc")
                );
                Json(json!([{
                    "id": "a1",
                    "loan_amount": 20000.0,
                    "credit_score": 720,
                    "income": 75000.0,
                    "risk_score": 0.22,
                    "approval_status": "Approved"
                }]))
            }),
        );
        let base = spawn_store(router).await;

        let rows = rest_store(&base)
            .query(SortOrder::new(SortField::ApprovalStatus, SortDirection::Asc))
            .await
            .expect("queries");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, RecordId("a1".to_string()));
        assert_eq!(rows[0].approval_status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn rest_insert_surfaces_store_errors() {
        let router = Router::new().route(
            "/rest/v1/loans",
            axum::routing::post(|| async {
                (StatusCode::CONFLICT, "duplicate key value violates unique constraint")
            }),
        );
        let base = spawn_store(router).await;

        let error = rest_store(&base)
            .insert(&[enriched(0.1, ApprovalStatus::Approved)])
            .await
            .expect_err("conflict");
        match error {
            StoreError::Status { status, body } => {
                assert_eq!(status, 409);
                assert!(body.contains("duplicate key"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
