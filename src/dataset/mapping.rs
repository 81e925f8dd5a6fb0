use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{
    has_errors, ColumnMapping, ColumnMappingRequest, ErrorCode, Role, ValidationError,
};

/// Ordered synonym tables, one per required role. Consulted after the
/// case-insensitive exact match of the declared (or canonical) name fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Synonyms {
    pub query: Vec<String>,
    pub response: Vec<String>,
    pub ground_truth: Vec<String>,
}

impl Default for Synonyms {
    fn default() -> Self {
        fn owned(names: &[&str]) -> Vec<String> {
            names.iter().map(|s| s.to_string()).collect()
        }
        Self {
            query: owned(&["query", "question", "prompt", "input", "user_query", "q"]),
            response: owned(&[
                "response",
                "answer_generated",
                "generated_answer",
                "generated_response",
                "prediction",
                "output",
                "model_answer",
                "generated",
            ]),
            ground_truth: owned(&[
                "ground_truth",
                "groundtruth",
                "answer",
                "reference",
                "expected",
                "expected_answer",
                "gold",
                "target",
                "label",
            ]),
        }
    }
}

impl Synonyms {
    pub fn for_role(&self, role: Role) -> &[String] {
        match role {
            Role::Query => &self.query,
            Role::Response => &self.response,
            Role::GroundTruth => &self.ground_truth,
        }
    }

    /// Default tables with `extra` appended; duplicates are dropped.
    pub fn with_extra(extra: &Synonyms) -> Self {
        let mut merged = Self::default();
        for role in Role::ALL {
            let table = match role {
                Role::Query => &mut merged.query,
                Role::Response => &mut merged.response,
                Role::GroundTruth => &mut merged.ground_truth,
            };
            for name in extra.for_role(role) {
                let name = normalize_header(name);
                if !name.is_empty() && !table.contains(&name) {
                    table.push(name);
                }
            }
        }
        merged
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedMapping {
    pub mapping: ColumnMapping,
    pub warnings: Vec<ValidationError>,
}

/// Lowercase, trim, and fold `-` and spaces to `_`.
pub fn normalize_header(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Resolve each required role to exactly one header.
///
/// Errors carry every issue found (warnings included) so callers can
/// surface them together.
pub fn resolve_mapping(
    headers: &[String],
    declared: &ColumnMappingRequest,
    synonyms: &Synonyms,
) -> Result<ResolvedMapping, Vec<ValidationError>> {
    let headers: Vec<&str> = headers
        .iter()
        .map(|h| h.as_str())
        .filter(|h| !h.trim().is_empty())
        .collect();

    let mut issues = Vec::new();
    let mut resolved: BTreeMap<Role, &str> = BTreeMap::new();

    // Tier 1: case-insensitive exact match on the declared or canonical name.
    for role in Role::ALL {
        let wanted = declared
            .declared(role)
            .unwrap_or_else(|| role.canonical_name())
            .to_lowercase();
        let matches: Vec<&str> = headers
            .iter()
            .copied()
            .filter(|h| h.trim().to_lowercase() == wanted)
            .collect();
        if let Some(header) = pick(role, &matches, &mut issues) {
            resolved.insert(role, header);
        }
    }

    // Tier 2: normalized names, skipping headers already claimed in tier 1.
    // A declared role only ever matches its declared name; synonyms apply
    // to undeclared roles.
    let claimed: HashSet<&str> = resolved.values().copied().collect();
    for role in Role::ALL {
        if resolved.contains_key(&role) {
            continue;
        }
        let candidates: Vec<String> = match declared.declared(role) {
            Some(name) => vec![normalize_header(name)],
            None => std::iter::once(role.canonical_name())
                .chain(synonyms.for_role(role).iter().map(String::as_str))
                .map(normalize_header)
                .collect(),
        };

        let matches: Vec<&str> = headers
            .iter()
            .copied()
            .filter(|h| !claimed.contains(h))
            .filter(|h| candidates.contains(&normalize_header(h)))
            .collect();
        match pick(role, &matches, &mut issues) {
            Some(header) => {
                resolved.insert(role, header);
            }
            None => {
                let message = match declared.declared(role) {
                    Some(name) => format!(
                        "Declared column '{}' for role '{}' not found in headers",
                        name, role
                    ),
                    None => format!(
                        "No column found for required role '{}' (looked for '{}' and {} synonyms)",
                        role,
                        role.canonical_name(),
                        synonyms.for_role(role).len()
                    ),
                };
                let wanted = declared.declared(role).unwrap_or(role.canonical_name());
                issues.push(
                    ValidationError::error(ErrorCode::MissingColumn, message).in_column(wanted),
                );
            }
        }
    }

    // Distinctness across roles.
    for (i, a) in Role::ALL.iter().enumerate() {
        for b in &Role::ALL[i + 1..] {
            if let (Some(ha), Some(hb)) = (resolved.get(a), resolved.get(b)) {
                if ha == hb {
                    issues.push(
                        ValidationError::error(
                            ErrorCode::DuplicateMapping,
                            format!("Roles '{}' and '{}' both map to column '{}'", a, b, ha),
                        )
                        .in_column(*ha),
                    );
                }
            }
        }
    }

    if has_errors(&issues) {
        return Err(issues);
    }

    let (Some(query), Some(response), Some(ground_truth)) = (
        resolved.get(&Role::Query),
        resolved.get(&Role::Response),
        resolved.get(&Role::GroundTruth),
    ) else {
        return Err(issues);
    };

    let used: HashSet<&str> = [*query, *response, *ground_truth].into_iter().collect();
    let metadata = resolve_metadata(&headers, &used, declared.metadata.as_ref(), &mut issues);

    Ok(ResolvedMapping {
        mapping: ColumnMapping {
            query: query.to_string(),
            response: response.to_string(),
            ground_truth: ground_truth.to_string(),
            metadata,
        },
        warnings: issues,
    })
}

/// Best-effort mapping with no declaration, used to suggest a mapping.
pub fn detect_mapping(headers: &[String], synonyms: &Synonyms) -> Option<ColumnMapping> {
    resolve_mapping(headers, &ColumnMappingRequest::default(), synonyms)
        .ok()
        .map(|r| r.mapping)
}

fn pick<'a>(role: Role, matches: &[&'a str], issues: &mut Vec<ValidationError>) -> Option<&'a str> {
    let first = *matches.first()?;
    if matches.len() > 1 {
        issues.push(
            ValidationError::warning(
                ErrorCode::AmbiguousMapping,
                format!(
                    "Role '{}' matches columns {:?}; using '{}'",
                    role, matches, first
                ),
            )
            .in_column(first),
        );
    }
    Some(first)
}

fn resolve_metadata(
    headers: &[&str],
    used: &HashSet<&str>,
    declared: Option<&BTreeMap<String, String>>,
    issues: &mut Vec<ValidationError>,
) -> Option<BTreeMap<String, String>> {
    let metadata: BTreeMap<String, String> = match declared {
        Some(declared) => declared
            .iter()
            .filter_map(|(key, column)| {
                let wanted = column.trim().to_lowercase();
                let found = headers.iter().find(|h| h.trim().to_lowercase() == wanted);
                if found.is_none() {
                    issues.push(
                        ValidationError::warning(
                            ErrorCode::UnmappedMetadata,
                            format!("Metadata '{}' refers to missing column '{}'", key, column),
                        )
                        .in_column(column.as_str()),
                    );
                }
                found.map(|h| (key.clone(), h.to_string()))
            })
            .collect(),
        None => headers
            .iter()
            .filter(|h| !used.contains(*h))
            .map(|h| (h.to_string(), h.to_string()))
            .collect(),
    };

    if metadata.is_empty() {
        None
    } else {
        Some(metadata)
    }
}
