use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Column names every intake row must carry, in canonical order.
pub const REQUIRED_FIELDS: [&str; 8] = [
    "age",
    "income",
    "loan_amount",
    "credit_score",
    "debt_to_income_ratio",
    "employment_years",
    "savings_balance",
    "existing_loans",
];

/// Untyped field mapping captured from a form post or a CSV data row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawRow(BTreeMap<String, String>);

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RawRow
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        )
    }
}

// Form clients post either strings or bare JSON numbers; both become raw text.
impl<'de> Deserialize<'de> for RawRow {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RawRowVisitor;

        impl<'de> Visitor<'de> for RawRowVisitor {
            type Value = RawRow;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of field names to string or number values")
            }

            fn visit_map<M>(self, mut access: M) -> Result<RawRow, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut row = RawRow::new();
                while let Some((field, value)) =
                    access.next_entry::<String, serde_json::Value>()?
                {
                    let text = match value {
                        serde_json::Value::String(text) => text,
                        serde_json::Value::Number(number) => number.to_string(),
                        serde_json::Value::Bool(flag) => flag.to_string(),
                        serde_json::Value::Null => String::new(),
                        other => {
                            return Err(de::Error::custom(format!(
                                "field '{field}' must be a string or number, found {other}"
                            )))
                        }
                    };
                    row.insert(field, text);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RawRowVisitor)
    }
}

/// Fully typed loan applicant attributes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApplicantRecord {
    pub age: i64,
    pub income: f64,
    pub loan_amount: f64,
    pub credit_score: i64,
    pub debt_to_income_ratio: f64,
    pub employment_years: i64,
    pub savings_balance: f64,
    pub existing_loans: i64,
}

/// Decision attached to a scored applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalStatus {
    Approved,
    Denied,
    Review,
}

impl ApprovalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Review => "review",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown approval status '{0}'")]
pub struct UnknownApprovalStatus(pub String);

impl FromStr for ApprovalStatus {
    type Err = UnknownApprovalStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            "review" => Ok(Self::Review),
            _ => Err(UnknownApprovalStatus(value.to_string())),
        }
    }
}

impl Serialize for ApprovalStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ApprovalStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Response from the scoring service for a single applicant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub risk_score: f64,
    pub approval_status: ApprovalStatus,
}

/// Store-assigned identifier of a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

// Stores may hand back UUID strings or serial integers.
impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(id) => Ok(Self(id)),
            serde_json::Value::Number(id) => Ok(Self(id.to_string())),
            other => Err(de::Error::custom(format!(
                "record id must be a string or number, found {other}"
            ))),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Applicant attributes joined with their scoring result, ready for insertion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub applicant: ApplicantRecord,
    pub risk_score: f64,
    pub approval_status: ApprovalStatus,
}

impl EnrichedRecord {
    pub fn new(applicant: ApplicantRecord, result: ScoringResult) -> Self {
        Self {
            applicant,
            risk_score: result.risk_score,
            approval_status: result.approval_status,
        }
    }
}

/// An enriched record after the store has assigned its identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub record: EnrichedRecord,
}

impl PersistedRecord {
    pub fn summary(&self) -> LoanSummary {
        LoanSummary {
            id: self.id.clone(),
            loan_amount: self.record.applicant.loan_amount,
            credit_score: self.record.applicant.credit_score,
            income: self.record.applicant.income,
            risk_score: self.record.risk_score,
            approval_status: self.record.approval_status,
        }
    }
}

/// Projection returned by store queries and the HTTP surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanSummary {
    pub id: RecordId,
    pub loan_amount: f64,
    pub credit_score: i64,
    pub income: f64,
    pub risk_score: f64,
    pub approval_status: ApprovalStatus,
}

/// Column a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    RiskScore,
    ApprovalStatus,
}

impl SortField {
    pub const fn column(self) -> &'static str {
        match self {
            Self::RiskScore => "risk_score",
            Self::ApprovalStatus => "approval_status",
        }
    }
}

impl FromStr for SortField {
    type Err = SortOrderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "risk_score" => Ok(Self::RiskScore),
            "approval_status" => Ok(Self::ApprovalStatus),
            other => Err(SortOrderError::Field(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = SortOrderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(SortOrderError::Direction(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SortOrderError {
    #[error("cannot sort by '{0}' (expected risk_score or approval_status)")]
    Field(String),
    #[error("unknown sort direction '{0}' (expected asc or desc)")]
    Direction(String),
}

/// Ordering requested for a listing; defaults to highest risk first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortOrder {
    #[serde(default, rename = "sort_field", deserialize_with = "deserialize_from_str")]
    pub field: SortField,
    #[serde(default, deserialize_with = "deserialize_from_str")]
    pub direction: SortDirection,
}

// Query strings and CLI flags share the same case-insensitive parsing.
fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
}

impl SortOrder {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}
