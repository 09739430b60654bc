//! Loan applicant intake.
//!
//! Rows arrive from the form endpoint or a CSV upload and move through schema validation,
//! coercion, one batch scoring call, positional reconciliation and a single bulk insert.
//! Any failure abandons the whole batch.

pub mod coerce;
pub mod csv_input;
pub mod domain;
pub mod pipeline;
pub mod reconcile;
pub mod router;
pub mod schema;
pub mod scoring;
pub mod store;

#[cfg(test)]
mod tests;

pub use coerce::{CoercionError, RangePolicy};
pub use csv_input::CsvInputError;
pub use domain::{
    ApplicantRecord, ApprovalStatus, EnrichedRecord, LoanSummary, PersistedRecord, RawRow,
    RecordId, ScoringResult, SortDirection, SortField, SortOrder, REQUIRED_FIELDS,
};
pub use pipeline::{CancelToken, IntakeError, IntakePipeline, IntakeStage, PipelineTimeouts};
pub use reconcile::ContractViolation;
pub use router::loan_router;
pub use schema::SchemaError;
pub use scoring::{HttpScoringClient, RuleBasedScorer, ScoringError, ScoringService};
pub use store::{ApplicantStore, InMemoryStore, RestStore, StoreError};
