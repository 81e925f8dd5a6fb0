use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use super::mapping::{resolve_mapping, Synonyms};
use super::{
    has_errors, ColumnMapping, ColumnMappingRequest, DataRow, ErrorCode, RawRow, Role,
    ValidatedDataset, ValidationError,
};
use crate::config::{MAX_FIELD_CHARS, MAX_REPORTED_ERRORS, MAX_ROWS};

#[derive(Debug, Clone, Copy)]
pub struct ValidationLimits {
    pub max_rows: usize,
    pub max_field_chars: usize,
    /// Per-row errors beyond this are counted, not listed.
    pub max_reported_errors: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_rows: MAX_ROWS,
            max_field_chars: MAX_FIELD_CHARS,
            max_reported_errors: MAX_REPORTED_ERRORS,
        }
    }
}

enum Field {
    Missing,
    Invalid(&'static str),
    Text(String),
}

/// Header list implied by the rows themselves: keys in first-seen order.
pub fn infer_headers(rows: &[RawRow]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !headers.iter().any(|h| h == key) {
                headers.push(key.clone());
            }
        }
    }
    headers
}

/// Validate raw rows against the column mapping and dataset limits.
///
/// Checks run in order: mapping, dataset size, then per-row fields. A
/// failure in the first two stages skips the per-row stage. Warnings are
/// returned with the rows on success and with the errors on failure.
pub fn validate_rows(
    headers: &[String],
    rows: &[RawRow],
    declared: &ColumnMappingRequest,
    declared_row_count: Option<usize>,
    synonyms: &Synonyms,
    limits: &ValidationLimits,
) -> Result<ValidatedDataset, Vec<ValidationError>> {
    let resolved = resolve_mapping(headers, declared, synonyms)?;
    let mapping = resolved.mapping;
    let mut issues = resolved.warnings;

    if rows.is_empty() {
        issues.push(ValidationError::error(
            ErrorCode::EmptyDataset,
            "Dataset contains no rows",
        ));
    }
    if rows.len() > limits.max_rows {
        issues.push(ValidationError::error(
            ErrorCode::RowCountExceeded,
            format!(
                "Dataset has {} rows; the maximum is {}",
                rows.len(),
                limits.max_rows
            ),
        ));
    }
    if let Some(expected) = declared_row_count {
        if expected != rows.len() {
            issues.push(ValidationError::error(
                ErrorCode::RowCountMismatch,
                format!(
                    "Data length ({}) does not match rowCount ({})",
                    rows.len(),
                    expected
                ),
            ));
        }
    }
    if has_errors(&issues) {
        return Err(issues);
    }

    let mut validated = Vec::with_capacity(rows.len());
    let mut reported = 0usize;
    let mut suppressed = 0usize;

    for (position, raw) in rows.iter().enumerate() {
        let row_index = position + 1;
        let mut texts: BTreeMap<Role, String> = BTreeMap::new();

        for role in Role::ALL {
            let column = mapping.column(role);
            let problem = match read_field(raw.get(column)) {
                Field::Text(text) if text.trim().is_empty() => Some(
                    ValidationError::error(
                        ErrorCode::EmptyValue,
                        format!("Row {}: '{}' is empty", row_index, column),
                    ),
                ),
                Field::Text(text) => {
                    let chars = text.chars().count();
                    if chars > limits.max_field_chars {
                        Some(ValidationError::error(
                            ErrorCode::LengthExceeded,
                            format!(
                                "Row {}: '{}' has {} characters; the maximum is {}",
                                row_index, column, chars, limits.max_field_chars
                            ),
                        ))
                    } else {
                        texts.insert(role, text);
                        None
                    }
                }
                Field::Missing => Some(ValidationError::error(
                    ErrorCode::EmptyValue,
                    format!("Row {}: '{}' is missing", row_index, column),
                )),
                Field::Invalid(kind) => Some(ValidationError::error(
                    ErrorCode::InvalidValue,
                    format!(
                        "Row {}: '{}' holds {}; expected text",
                        row_index, column, kind
                    ),
                )),
            };

            if let Some(problem) = problem {
                if reported < limits.max_reported_errors {
                    issues.push(problem.at_row(row_index).in_column(column));
                    reported += 1;
                } else {
                    suppressed += 1;
                }
            }
        }

        if let (Some(query), Some(response), Some(ground_truth)) = (
            texts.remove(&Role::Query),
            texts.remove(&Role::Response),
            texts.remove(&Role::GroundTruth),
        ) {
            let metadata = row_metadata(raw, &mapping);
            validated.push(DataRow::new(row_index, query, response, ground_truth, metadata));
        }
    }

    if suppressed > 0 {
        issues.push(ValidationError::error(
            ErrorCode::TooManyErrors,
            format!("{} further row errors were not listed", suppressed),
        ));
    }

    if has_errors(&issues) {
        debug!("Validation rejected dataset with {} issues", issues.len());
        return Err(issues);
    }

    Ok(ValidatedDataset {
        mapping,
        rows: validated,
        warnings: issues,
    })
}

fn read_field(value: Option<&Value>) -> Field {
    match value {
        None | Some(Value::Null) => Field::Missing,
        Some(Value::String(s)) => Field::Text(s.clone()),
        Some(Value::Number(n)) => Field::Text(n.to_string()),
        Some(Value::Bool(b)) => Field::Text(b.to_string()),
        Some(Value::Array(_)) => Field::Invalid("an array"),
        Some(Value::Object(_)) => Field::Invalid("an object"),
    }
}

fn row_metadata(raw: &RawRow, mapping: &ColumnMapping) -> Option<BTreeMap<String, Value>> {
    let metadata: BTreeMap<String, Value> = mapping
        .metadata
        .as_ref()?
        .iter()
        .filter_map(|(key, column)| match raw.get(column) {
            None | Some(Value::Null) => None,
            Some(value) => Some((key.clone(), value.clone())),
        })
        .collect();

    if metadata.is_empty() {
        None
    } else {
        Some(metadata)
    }
}
