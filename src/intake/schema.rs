use std::collections::BTreeSet;

use super::domain::{RawRow, REQUIRED_FIELDS};

/// Structural problems found before any row is coerced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("no data rows supplied")]
    NoDataRows,
    #[error("missing required fields: {}", join(.missing))]
    MissingFields { missing: BTreeSet<String> },
}

fn join(fields: &BTreeSet<String>) -> String {
    fields.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Confirm the required columns are present.
///
/// Only the first row's field names are inspected: CSV rows share one header and a
/// form submission is a single row. Every missing field is reported at once.
pub fn validate(rows: &[RawRow]) -> Result<(), SchemaError> {
    let first = rows.first().ok_or(SchemaError::NoDataRows)?;

    let missing: BTreeSet<String> = REQUIRED_FIELDS
        .iter()
        .filter(|field| !first.contains(field))
        .map(|field| field.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::MissingFields { missing })
    }
}
