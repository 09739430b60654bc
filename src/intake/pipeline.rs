use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn, Instrument};

use super::coerce::{coerce_all, CoercionError, RangePolicy};
use super::csv_input::{parse_rows, CsvInputError};
use super::domain::{LoanSummary, PersistedRecord, RawRow, SortOrder};
use super::reconcile::{reconcile, ContractViolation};
use super::schema::{validate, SchemaError};
use super::scoring::{ScoringError, ScoringService};
use super::store::{persist, ApplicantStore, StoreError};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Stage an intake run was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStage {
    Validating,
    Coercing,
    Scoring,
    Persisting,
}

impl IntakeStage {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Coercing => "coercing",
            Self::Scoring => "scoring",
            Self::Persisting => "persisting",
        }
    }
}

/// Error raised by the intake pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Csv(#[from] CsvInputError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("intake cancelled before the {} stage", .stage.label())]
    Cancelled { stage: IntakeStage },
}

impl IntakeError {
    pub fn stage(&self) -> IntakeStage {
        match self {
            Self::Csv(_) | Self::Schema(_) => IntakeStage::Validating,
            Self::Coercion(_) => IntakeStage::Coercing,
            Self::Scoring(_) | Self::Contract(_) => IntakeStage::Scoring,
            Self::Store(_) => IntakeStage::Persisting,
            Self::Cancelled { stage } => *stage,
        }
    }

    /// Input problems the submitter can fix and resend.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Csv(_) | Self::Schema(_) | Self::Coercion(_))
    }
}

/// Cooperative cancellation flag shared between a caller and one intake run.
///
/// Honoured before scoring and before persisting. Once the insert has been issued
/// the run completes regardless.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn check(&self, stage: IntakeStage) -> Result<(), IntakeError> {
        if self.is_cancelled() {
            Err(IntakeError::Cancelled { stage })
        } else {
            Ok(())
        }
    }
}

/// Upper bounds for the two outbound calls of a run.
///
/// An expired store timeout abandons an insert that may already be in flight, so the
/// batch's commit state is unknown to the caller and must be checked with a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTimeouts {
    pub scoring: Duration,
    pub store: Duration,
}

impl Default for PipelineTimeouts {
    fn default() -> Self {
        Self {
            scoring: DEFAULT_CALL_TIMEOUT,
            store: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Validate, coerce, score, reconcile and persist applicant batches.
///
/// Holds no per-run state; concurrent submissions share only the two handles.
pub struct IntakePipeline<S: ?Sized, W: ?Sized> {
    scoring: Arc<S>,
    store: Arc<W>,
    policy: RangePolicy,
    timeouts: PipelineTimeouts,
}

impl<S, W> IntakePipeline<S, W>
where
    S: ScoringService + ?Sized,
    W: ApplicantStore + ?Sized,
{
    pub fn new(scoring: Arc<S>, store: Arc<W>, policy: RangePolicy) -> Self {
        Self {
            scoring,
            store,
            policy,
            timeouts: PipelineTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: PipelineTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn scoring(&self) -> &Arc<S> {
        &self.scoring
    }

    pub fn store(&self) -> &Arc<W> {
        &self.store
    }

    /// Submit a single form row as a batch of one.
    pub async fn submit_one(&self, row: RawRow) -> Result<PersistedRecord, IntakeError> {
        let mut persisted = self.submit_many(vec![row]).await?;
        persisted.pop().ok_or_else(|| {
            IntakeError::Store(StoreError::IdCountMismatch {
                submitted: 1,
                returned: 0,
            })
        })
    }

    pub async fn submit_many(
        &self,
        rows: Vec<RawRow>,
    ) -> Result<Vec<PersistedRecord>, IntakeError> {
        self.submit_many_with_cancel(rows, &CancelToken::new()).await
    }

    /// Parse a CSV document and submit its data rows as one batch.
    pub async fn submit_csv(&self, csv: &str) -> Result<Vec<PersistedRecord>, IntakeError> {
        let rows = parse_rows(Cursor::new(csv.as_bytes())).map_err(|err| {
            warn!(error = %err, "csv upload rejected");
            IntakeError::from(err)
        })?;
        self.submit_many(rows).await
    }

    pub async fn submit_many_with_cancel(
        &self,
        rows: Vec<RawRow>,
        cancel: &CancelToken,
    ) -> Result<Vec<PersistedRecord>, IntakeError> {
        let batch_size = rows.len();
        let span = info_span!("intake", batch_size);

        async move {
            match self.run(rows, cancel).await {
                Ok(persisted) => {
                    info!(persisted = persisted.len(), "intake batch committed");
                    Ok(persisted)
                }
                Err(err) => {
                    report_failure(&err, batch_size);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// List stored applicants in the requested order.
    pub async fn list(&self, order: SortOrder) -> Result<Vec<LoanSummary>, IntakeError> {
        let after = self.timeouts.store;
        let summaries = tokio::time::timeout(after, self.store.query(order))
            .await
            .map_err(|_| StoreError::Timeout { after })??;
        Ok(summaries)
    }

    async fn run(
        &self,
        rows: Vec<RawRow>,
        cancel: &CancelToken,
    ) -> Result<Vec<PersistedRecord>, IntakeError> {
        debug!(stage = IntakeStage::Validating.label(), "intake stage entered");
        validate(&rows)?;

        debug!(stage = IntakeStage::Coercing.label(), "intake stage entered");
        let records = coerce_all(&rows, self.policy)?;
        drop(rows);

        cancel.check(IntakeStage::Scoring)?;
        debug!(stage = IntakeStage::Scoring.label(), "intake stage entered");
        let after = self.timeouts.scoring;
        let results = tokio::time::timeout(after, self.scoring.score(&records))
            .await
            .map_err(|_| ScoringError::Timeout { after })??;
        let enriched = reconcile(&records, &results)?;

        cancel.check(IntakeStage::Persisting)?;
        debug!(stage = IntakeStage::Persisting.label(), "intake stage entered");
        let after = self.timeouts.store;
        let persisted = tokio::time::timeout(after, persist(self.store.as_ref(), enriched))
            .await
            .map_err(|_| StoreError::Timeout { after })??;

        Ok(persisted)
    }
}

fn report_failure(err: &IntakeError, batch_size: usize) {
    let stage = err.stage().label();
    match err {
        IntakeError::Store(_) => error!(
            stage,
            batch_size,
            error = %err,
            "scored batch could not be persisted; results discarded"
        ),
        IntakeError::Contract(_) => error!(
            stage,
            batch_size,
            error = %err,
            "scoring service broke the positional contract"
        ),
        IntakeError::Scoring(_) => error!(stage, batch_size, error = %err, "scoring call failed"),
        IntakeError::Cancelled { .. } => info!(stage, batch_size, "intake cancelled"),
        _ => warn!(stage, batch_size, error = %err, "intake input rejected"),
    }
}
