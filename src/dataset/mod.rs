pub mod mapping;
pub mod validate;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One raw input record, keyed by source column name.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Column mapping
// ============================================================================

/// Resolved role → column table. Built only by `mapping::resolve_mapping`,
/// so the three required columns are always distinct headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub query: String,
    pub response: String,
    pub ground_truth: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Caller-declared mapping. Any role may be left out and is then resolved
/// from the role's canonical name and synonyms.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMappingRequest {
    pub query: Option<String>,
    pub response: Option<String>,
    #[serde(alias = "ground_truth")]
    pub ground_truth: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Query,
    Response,
    GroundTruth,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Query, Role::Response, Role::GroundTruth];

    /// Name used on the wire and as the tier-1 default header.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Role::Query => "query",
            Role::Response => "response",
            Role::GroundTruth => "groundTruth",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl ColumnMapping {
    pub fn column(&self, role: Role) -> &str {
        match role {
            Role::Query => &self.query,
            Role::Response => &self.response,
            Role::GroundTruth => &self.ground_truth,
        }
    }
}

impl ColumnMappingRequest {
    pub fn declared(&self, role: Role) -> Option<&str> {
        let name = match role {
            Role::Query => self.query.as_deref(),
            Role::Response => self.response.as_deref(),
            Role::GroundTruth => self.ground_truth.as_deref(),
        };
        name.map(str::trim).filter(|n| !n.is_empty())
    }
}

// ============================================================================
// Rows
// ============================================================================

/// A validated evaluation unit. Fields are private so a row cannot change
/// after the validator builds it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRow {
    row_index: usize,
    query: String,
    response: String,
    ground_truth: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<BTreeMap<String, serde_json::Value>>,
}

impl DataRow {
    pub(crate) fn new(
        row_index: usize,
        query: String,
        response: String,
        ground_truth: String,
        metadata: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Self {
        Self {
            row_index,
            query,
            response,
            ground_truth,
            metadata,
        }
    }

    pub fn row_index(&self) -> usize {
        self.row_index
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn ground_truth(&self) -> &str {
        &self.ground_truth
    }

    pub fn metadata(&self) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.metadata.as_ref()
    }
}

/// Rows that passed validation plus any non-blocking warnings.
#[derive(Debug, Clone)]
pub struct ValidatedDataset {
    pub mapping: ColumnMapping,
    pub rows: Vec<DataRow>,
    pub warnings: Vec<ValidationError>,
}

// ============================================================================
// Validation errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingColumn,
    DuplicateMapping,
    AmbiguousMapping,
    UnmappedMetadata,
    EmptyDataset,
    RowCountExceeded,
    RowCountMismatch,
    EmptyValue,
    LengthExceeded,
    InvalidValue,
    UnknownMetricType,
    TooManyErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
}

impl ValidationError {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            severity: Severity::Error,
            row_index: None,
            column_name: None,
        }
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    pub fn at_row(mut self, row_index: usize) -> Self {
        self.row_index = Some(row_index);
        self
    }

    pub fn in_column(mut self, column: impl Into<String>) -> Self {
        self.column_name = Some(column.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)?;
        if let Some(row) = self.row_index {
            write!(f, " (row {})", row)?;
        }
        Ok(())
    }
}

pub fn has_errors(entries: &[ValidationError]) -> bool {
    entries.iter().any(ValidationError::is_error)
}
