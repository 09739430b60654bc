use super::domain::{ApplicantRecord, RawRow};

/// Failure converting a raw row into an [`ApplicantRecord`].
///
/// `row` is the 1-based position of the data row within the submitted batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoercionError {
    #[error("row {row}: field '{field}' is missing")]
    MissingField { row: usize, field: &'static str },
    #[error("row {row}: field '{field}' is not numeric (got '{value}')")]
    Unparseable {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("row {row}: field '{field}' must be {expected} (got {value})")]
    OutOfRange {
        row: usize,
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl CoercionError {
    pub fn row(&self) -> usize {
        match self {
            Self::MissingField { row, .. }
            | Self::Unparseable { row, .. }
            | Self::OutOfRange { row, .. } => *row,
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            Self::MissingField { field, .. }
            | Self::Unparseable { field, .. }
            | Self::OutOfRange { field, .. } => *field,
        }
    }
}

/// Whether the advertised applicant ranges are enforced during coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePolicy {
    enforce: bool,
}

impl RangePolicy {
    pub const fn enforced() -> Self {
        Self { enforce: true }
    }

    pub const fn advisory() -> Self {
        Self { enforce: false }
    }

    fn check(&self, row: usize, record: &ApplicantRecord) -> Result<(), CoercionError> {
        if !self.enforce {
            return Ok(());
        }

        check_int(row, "age", record.age, 18, 100)?;
        check_int(row, "credit_score", record.credit_score, 300, 850)?;
        check_int(row, "existing_loans", record.existing_loans, 0, 10)?;
        check_int(row, "employment_years", record.employment_years, 0, i64::MAX)?;
        check_real(row, "debt_to_income_ratio", record.debt_to_income_ratio, 0.0, 1.0)?;
        check_real(row, "income", record.income, 0.0, f64::MAX)?;
        check_real(row, "loan_amount", record.loan_amount, 0.0, f64::MAX)?;
        check_real(row, "savings_balance", record.savings_balance, 0.0, f64::MAX)?;
        Ok(())
    }
}

impl Default for RangePolicy {
    fn default() -> Self {
        Self::enforced()
    }
}

fn check_int(
    row: usize,
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<(), CoercionError> {
    if (min..=max).contains(&value) {
        return Ok(());
    }
    Err(CoercionError::OutOfRange {
        row,
        field,
        value: value.to_string(),
        expected: range_label(field),
    })
}

fn check_real(
    row: usize,
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), CoercionError> {
    if (min..=max).contains(&value) {
        return Ok(());
    }
    Err(CoercionError::OutOfRange {
        row,
        field,
        value: value.to_string(),
        expected: range_label(field),
    })
}

fn range_label(field: &str) -> &'static str {
    match field {
        "age" => "between 18 and 100",
        "credit_score" => "between 300 and 850",
        "existing_loans" => "between 0 and 10",
        "debt_to_income_ratio" => "between 0 and 1",
        _ => "non-negative",
    }
}

/// Coerce every row in order, halting at the first row that fails.
pub fn coerce_all(
    rows: &[RawRow],
    policy: RangePolicy,
) -> Result<Vec<ApplicantRecord>, CoercionError> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let position = index + 1;
            let record = coerce(position, row)?;
            policy.check(position, &record)?;
            Ok(record)
        })
        .collect()
}

/// Convert one raw row into a typed record. Extra fields are ignored.
pub fn coerce(row_number: usize, row: &RawRow) -> Result<ApplicantRecord, CoercionError> {
    let int = |field: &'static str| field_value(row_number, row, field, parse_leading_int);
    let real = |field: &'static str| field_value(row_number, row, field, parse_leading_float);

    Ok(ApplicantRecord {
        age: int("age")?,
        income: real("income")?,
        loan_amount: real("loan_amount")?,
        credit_score: int("credit_score")?,
        debt_to_income_ratio: real("debt_to_income_ratio")?,
        employment_years: int("employment_years")?,
        savings_balance: real("savings_balance")?,
        existing_loans: int("existing_loans")?,
    })
}

fn field_value<T>(
    row_number: usize,
    row: &RawRow,
    field: &'static str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, CoercionError> {
    let raw = row.get(field).ok_or(CoercionError::MissingField {
        row: row_number,
        field,
    })?;

    parse(raw).ok_or_else(|| CoercionError::Unparseable {
        row: row_number,
        field,
        value: raw.to_string(),
    })
}

/// Parse the leading integer run (`"  42 years"` -> 42, `"7.9"` -> 7).
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let text = raw.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }

    text[..end].parse().ok()
}

/// Parse the leading decimal token (`"0.35 ratio"` -> 0.35, `"1e3x"` -> 1000).
///
/// Non-finite results are rejected.
pub fn parse_leading_float(raw: &str) -> Option<f64> {
    let text = raw.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut cursor = frac_start;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
        mantissa_digits += cursor - frac_start;
        if mantissa_digits > 0 {
            end = cursor;
        }
    }

    if mantissa_digits == 0 {
        return None;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut cursor = end + 1;
        if cursor < bytes.len() && matches!(bytes[cursor], b'+' | b'-') {
            cursor += 1;
        }
        let exp_start = cursor;
        while cursor < bytes.len() && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
        if cursor > exp_start {
            end = cursor;
        }
    }

    text[..end].parse::<f64>().ok().filter(|value| value.is_finite())
}
