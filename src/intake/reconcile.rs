use super::domain::{ApplicantRecord, EnrichedRecord, ScoringResult};

/// The scoring service broke the one-result-per-record contract.
///
/// Not user recoverable; the batch must be abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("scoring contract violated: submitted {submitted} records, received {received} results")]
pub struct ContractViolation {
    pub submitted: usize,
    pub received: usize,
}

/// Pair records with results by position. No reordering, filtering or deduplication.
pub fn reconcile(
    records: &[ApplicantRecord],
    results: &[ScoringResult],
) -> Result<Vec<EnrichedRecord>, ContractViolation> {
    if records.len() != results.len() {
        return Err(ContractViolation {
            submitted: records.len(),
            received: results.len(),
        });
    }

    Ok(records
        .iter()
        .zip(results)
        .map(|(record, result)| EnrichedRecord::new(*record, *result))
        .collect())
}
