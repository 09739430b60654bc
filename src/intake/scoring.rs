use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use super::domain::{ApplicantRecord, ApprovalStatus, ScoringResult};

/// Failure talking to the scoring service. The whole batch is lost on any variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring service unreachable: {0}")]
    Transport(String),
    #[error("scoring service timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },
    #[error("scoring service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("scoring service returned a malformed response: {0}")]
    MalformedResponse(String),
}

/// Remote risk model. One call scores the whole batch.
///
/// Implementations must return exactly one result per record, in the same order.
/// Callers do not re-verify which result belongs to which record.
#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn score(&self, records: &[ApplicantRecord]) -> Result<Vec<ScoringResult>, ScoringError>;

    /// Liveness probe; the intake pipeline never depends on it.
    async fn health(&self) -> Result<(), ScoringError>;
}

// Single-record endpoints answer with a bare object.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScoringPayload {
    Many(Vec<ScoringResult>),
    One(ScoringResult),
}

impl From<ScoringPayload> for Vec<ScoringResult> {
    fn from(payload: ScoringPayload) -> Self {
        match payload {
            ScoringPayload::Many(results) => results,
            ScoringPayload::One(result) => vec![result],
        }
    }
}

/// HTTP client for a scoring service exposing `POST /batch` and `GET /health`.
#[derive(Debug, Clone)]
pub struct HttpScoringClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpScoringClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ScoringError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("ironvault/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| ScoringError::Transport(err.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn transport_error(&self, err: reqwest::Error) -> ScoringError {
        if err.is_timeout() {
            ScoringError::Timeout {
                after: self.timeout,
            }
        } else {
            ScoringError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ScoringService for HttpScoringClient {
    #[instrument(name = "scoring_http_batch", skip_all, fields(batch_size = records.len()))]
    async fn score(&self, records: &[ApplicantRecord]) -> Result<Vec<ScoringResult>, ScoringError> {
        let response = self
            .http
            .post(self.endpoint("batch"))
            .json(records)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScoringError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;
        let payload: ScoringPayload = serde_json::from_slice(&body)
            .map_err(|err| ScoringError::MalformedResponse(err.to_string()))?;

        Ok(payload.into())
    }

    async fn health(&self) -> Result<(), ScoringError> {
        let response = self
            .http
            .get(self.endpoint("health"))
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ScoringError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

/// Deterministic in-process risk model used when no remote service is configured.
///
/// Scores run from 0 to 100; anything above 50 is approved.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer;

impl RuleBasedScorer {
    pub fn assess(record: &ApplicantRecord) -> ScoringResult {
        let raw = 100.0 - record.credit_score as f64 / 10.0 + record.income / 10_000.0
            - record.loan_amount / 20_000.0
            - record.debt_to_income_ratio * 20.0
            + record.savings_balance / 5_000.0
            - record.existing_loans as f64 * 5.0
            + record.employment_years as f64 * 2.0
            - record.age as f64 / 5.0;

        let risk_score = raw.clamp(0.0, 100.0);
        let approval_status = if risk_score > 50.0 {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Denied
        };

        ScoringResult {
            risk_score,
            approval_status,
        }
    }
}

#[async_trait]
impl ScoringService for RuleBasedScorer {
    async fn score(&self, records: &[ApplicantRecord]) -> Result<Vec<ScoringResult>, ScoringError> {
        Ok(records.iter().map(Self::assess).collect())
    }

    async fn health(&self) -> Result<(), ScoringError> {
        Ok(())
    }
}
