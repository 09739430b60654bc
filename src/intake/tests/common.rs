use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::intake::domain::{
    ApplicantRecord, ApprovalStatus, EnrichedRecord, LoanSummary, RawRow, RecordId,
    ScoringResult, SortOrder, REQUIRED_FIELDS,
};
use crate::intake::scoring::{ScoringError, ScoringService};
use crate::intake::store::{ApplicantStore, InMemoryStore, StoreError};
use crate::intake::{IntakePipeline, RangePolicy};

pub(super) const CSV_HEADER: &str = "age,income,loan_amount,credit_score,debt_to_income_ratio,employment_years,savings_balance,existing_loans";

pub(super) fn applicant_row() -> RawRow {
    row_with_age("45")
}

pub(super) fn row_with_age(age: &str) -> RawRow {
    let values = [age, "75000", "20000", "720", "0.3", "10", "15000", "1"];
    REQUIRED_FIELDS.iter().copied().zip(values).collect()
}

pub(super) fn csv_with_ages(ages: &[&str]) -> String {
    let mut document = format!("{CSV_HEADER}\n");
    for age in ages {
        document.push_str(&format!("{age},75000,20000,720,0.3,10,15000,1\n"));
    }
    document
}

pub(super) fn result(risk_score: f64, approval_status: ApprovalStatus) -> ScoringResult {
    ScoringResult {
        risk_score,
        approval_status,
    }
}

#[derive(Debug, Clone)]
pub(super) enum Reply {
    /// `age / 100` as the risk score, approved above 40.
    ByAge,
    Fixed(Vec<ScoringResult>),
    Fail(ScoringError),
    Stall(Duration),
}

/// Scoring double recording the size of every batch it is asked to score.
#[derive(Debug)]
pub(super) struct StubScorer {
    reply: Reply,
    batches: Mutex<Vec<Vec<ApplicantRecord>>>,
}

impl StubScorer {
    pub(super) fn new(reply: Reply) -> Self {
        Self {
            reply,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.batches.lock().expect("scorer lock").len()
    }

    pub(super) fn batches(&self) -> Vec<Vec<ApplicantRecord>> {
        self.batches.lock().expect("scorer lock").clone()
    }
}

#[async_trait]
impl ScoringService for StubScorer {
    async fn score(&self, records: &[ApplicantRecord]) -> Result<Vec<ScoringResult>, ScoringError> {
        self.batches
            .lock()
            .expect("scorer lock")
            .push(records.to_vec());

        match &self.reply {
            Reply::ByAge => Ok(records
                .iter()
                .map(|record| {
                    let status = if record.age > 40 {
                        ApprovalStatus::Approved
                    } else {
                        ApprovalStatus::Review
                    };
                    result(record.age as f64 / 100.0, status)
                })
                .collect()),
            Reply::Fixed(results) => Ok(results.clone()),
            Reply::Fail(error) => Err(error.clone()),
            Reply::Stall(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Vec::new())
            }
        }
    }

    async fn health(&self) -> Result<(), ScoringError> {
        Ok(())
    }
}

/// Memory store that counts insert calls.
#[derive(Debug, Default)]
pub(super) struct CountingStore {
    inner: InMemoryStore,
    inserts: AtomicUsize,
}

impl CountingStore {
    pub(super) fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub(super) fn stored(&self) -> usize {
        self.inner.records().expect("records readable").len()
    }
}

#[async_trait]
impl ApplicantStore for CountingStore {
    async fn insert(&self, records: &[EnrichedRecord]) -> Result<Vec<RecordId>, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(records).await
    }

    async fn query(&self, order: SortOrder) -> Result<Vec<LoanSummary>, StoreError> {
        self.inner.query(order).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Store whose every call fails, counting insert attempts.
#[derive(Debug, Default)]
pub(super) struct UnavailableStore {
    inserts: AtomicUsize,
}

impl UnavailableStore {
    pub(super) fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApplicantStore for UnavailableStore {
    async fn insert(&self, _records: &[EnrichedRecord]) -> Result<Vec<RecordId>, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn query(&self, _order: SortOrder) -> Result<Vec<LoanSummary>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

pub(super) fn build_pipeline(
    reply: Reply,
) -> (
    IntakePipeline<StubScorer, CountingStore>,
    Arc<StubScorer>,
    Arc<CountingStore>,
) {
    let scorer = Arc::new(StubScorer::new(reply));
    let store = Arc::new(CountingStore::default());
    let pipeline = IntakePipeline::new(scorer.clone(), store.clone(), RangePolicy::enforced());
    (pipeline, scorer, store)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json body")
}
