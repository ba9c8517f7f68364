//! Input filter applied to every report before it reaches the tracker.
//!
//! Filters are a conjunction of predicates and can be built in code or parsed
//! from a short expression such as `sog > 2 & mmsi in (219001000, 265522540)`.
//! Clauses are separated by `&`; each clause is either `mmsi in (...)` or
//! `<name> <op> <value>` with `op` one of `=`, `~` (contains), `>` or `<`.
//! The names `mmsi`, `source` and `source_type` address the report envelope,
//! anything else addresses a report field.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use thiserror::Error;

use ais_track_core::{AisReport, FieldValue, Mmsi, PacketSource, SourceType, TargetInfo};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("cannot parse clause {0:?}")]
    Syntax(String),

    #[error("operator {op:?} not supported for {name}")]
    Operator { name: String, op: char },

    #[error("{name}: expected a number, got {value:?}")]
    InvalidNumber { name: String, value: String },

    #[error("invalid mmsi {0:?}")]
    InvalidMmsi(String),

    #[error("unknown source type {0:?}")]
    UnknownSourceType(String),
}

/// Field-level predicate for filtering reports.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPredicate {
    /// Field equals the specified string value.
    Eq(String),
    /// Field contains the specified substring (text only).
    Contains(String),
    /// Field is greater than the specified numeric value.
    Gt(f64),
    /// Field is less than the specified numeric value.
    Lt(f64),
}

impl FieldPredicate {
    /// Test if a field value matches this predicate.
    pub fn matches(&self, value: &FieldValue) -> bool {
        match self {
            FieldPredicate::Eq(expected) => match value {
                FieldValue::Text(s) => s == expected,
                FieldValue::Integer(i) => expected.parse::<i64>().ok() == Some(*i),
                FieldValue::Float(f) => expected.parse::<f64>().ok() == Some(*f),
                FieldValue::Boolean(b) => {
                    expected.eq_ignore_ascii_case("true") && *b
                        || expected.eq_ignore_ascii_case("false") && !*b
                }
                FieldValue::Null => false,
            },
            FieldPredicate::Contains(substring) => match value {
                FieldValue::Text(s) => s.contains(substring.as_str()),
                _ => false,
            },
            FieldPredicate::Gt(threshold) => value.as_f64().is_some_and(|v| v > *threshold),
            FieldPredicate::Lt(threshold) => value.as_f64().is_some_and(|v| v < *threshold),
        }
    }
}

/// Conjunction of predicates over a report. The empty filter accepts everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    /// Accept only these vessels.
    pub mmsi: Option<HashSet<Mmsi>>,
    pub source_id: Option<String>,
    pub source_type: Option<SourceType>,
    /// Field-level predicates (all must match).
    pub field_filters: Vec<(String, FieldPredicate)>,
}

impl ReportFilter {
    /// Create an empty filter that matches all reports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a filter expression. Blank input yields the accept-all filter.
    pub fn parse(expr: &str) -> Result<Self, FilterError> {
        let mut filter = Self::new();
        if expr.trim().is_empty() {
            return Ok(filter);
        }
        for clause in expr.split('&') {
            filter.apply_clause(clause.trim())?;
        }
        Ok(filter)
    }

    /// Restrict to the given vessels. Repeated calls intersect.
    pub fn mmsi_in(mut self, ids: impl IntoIterator<Item = Mmsi>) -> Self {
        self.restrict_mmsi(ids.into_iter().collect());
        self
    }

    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = Some(source_type);
        self
    }

    /// Add a field equality predicate.
    pub fn field_eq(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.field_filters
            .push((name.into(), FieldPredicate::Eq(value.into())));
        self
    }

    /// Add a field substring predicate.
    pub fn field_contains(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.field_filters
            .push((name.into(), FieldPredicate::Contains(value.into())));
        self
    }

    /// Add a field greater-than predicate.
    pub fn field_gt(mut self, name: impl Into<String>, value: f64) -> Self {
        self.field_filters.push((name.into(), FieldPredicate::Gt(value)));
        self
    }

    /// Add a field less-than predicate.
    pub fn field_lt(mut self, name: impl Into<String>, value: f64) -> Self {
        self.field_filters.push((name.into(), FieldPredicate::Lt(value)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mmsi.is_none()
            && self.source_id.is_none()
            && self.source_type.is_none()
            && self.field_filters.is_empty()
    }

    /// Test if a report matches this filter.
    pub fn matches(&self, report: &AisReport) -> bool {
        self.matches_parts(report.mmsi, &report.source, &report.fields)
    }

    /// Same predicates applied to a tracked target's latest state.
    pub fn matches_target(&self, target: &TargetInfo) -> bool {
        self.matches_parts(target.mmsi, &target.source, &target.fields)
    }

    fn matches_parts(
        &self,
        mmsi: Mmsi,
        source: &PacketSource,
        fields: &HashMap<String, FieldValue>,
    ) -> bool {
        if let Some(ids) = &self.mmsi {
            if !ids.contains(&mmsi) {
                return false;
            }
        }
        if let Some(source_id) = &self.source_id {
            if source.source_id != *source_id {
                return false;
            }
        }
        if let Some(source_type) = self.source_type {
            if source.source_type != source_type {
                return false;
            }
        }

        // A missing field fails its predicate.
        self.field_filters
            .iter()
            .all(|(name, pred)| fields.get(name).is_some_and(|v| pred.matches(v)))
    }

    fn restrict_mmsi(&mut self, ids: HashSet<Mmsi>) {
        self.mmsi = Some(match self.mmsi.take() {
            Some(existing) => existing.intersection(&ids).copied().collect(),
            None => ids,
        });
    }

    fn apply_clause(&mut self, clause: &str) -> Result<(), FilterError> {
        if clause.is_empty() {
            return Err(FilterError::Syntax(clause.to_string()));
        }
        if let Some(list) = parse_mmsi_list(clause) {
            let ids = list?;
            self.restrict_mmsi(ids);
            return Ok(());
        }

        let op_pos = clause
            .find(['=', '~', '>', '<'])
            .ok_or_else(|| FilterError::Syntax(clause.to_string()))?;
        let name = clause[..op_pos].trim();
        let op = clause[op_pos..].chars().next().unwrap_or('=');
        let value = unquote(clause[op_pos + 1..].trim());
        if name.is_empty() || value.is_empty() {
            return Err(FilterError::Syntax(clause.to_string()));
        }

        let unsupported = || FilterError::Operator {
            name: name.to_string(),
            op,
        };
        match name.to_ascii_lowercase().as_str() {
            "mmsi" => {
                if op != '=' {
                    return Err(unsupported());
                }
                let id = parse_mmsi(value)?;
                self.restrict_mmsi(HashSet::from([id]));
            }
            "source" | "source_id" => {
                if op != '=' {
                    return Err(unsupported());
                }
                self.source_id = Some(value.to_string());
            }
            "source_type" => {
                if op != '=' {
                    return Err(unsupported());
                }
                self.source_type = Some(parse_source_type(value)?);
            }
            _ => {
                let pred = match op {
                    '=' => FieldPredicate::Eq(value.to_string()),
                    '~' => FieldPredicate::Contains(value.to_string()),
                    '>' => FieldPredicate::Gt(parse_number(name, value)?),
                    _ => FieldPredicate::Lt(parse_number(name, value)?),
                };
                self.field_filters.push((name.to_string(), pred));
            }
        }
        Ok(())
    }
}

impl FromStr for ReportFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// `mmsi in (a, b, ...)`; `None` when the clause has another shape.
fn parse_mmsi_list(clause: &str) -> Option<Result<HashSet<Mmsi>, FilterError>> {
    let mut parts = clause.splitn(3, char::is_whitespace);
    let name = parts.next()?;
    let keyword = parts.next()?;
    if !name.eq_ignore_ascii_case("mmsi") || !keyword.eq_ignore_ascii_case("in") {
        return None;
    }
    let rest = parts.next().unwrap_or("").trim();
    let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) else {
        return Some(Err(FilterError::Syntax(clause.to_string())));
    };
    Some(
        inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_mmsi)
            .collect(),
    )
}

fn parse_mmsi(raw: &str) -> Result<Mmsi, FilterError> {
    raw.parse()
        .map_err(|_| FilterError::InvalidMmsi(raw.to_string()))
}

fn parse_number(name: &str, raw: &str) -> Result<f64, FilterError> {
    raw.parse().map_err(|_| FilterError::InvalidNumber {
        name: name.to_string(),
        value: raw.to_string(),
    })
}

fn parse_source_type(raw: &str) -> Result<SourceType, FilterError> {
    match raw.to_ascii_lowercase().as_str() {
        "terrestrial" => Ok(SourceType::Terrestrial),
        "satellite" => Ok(SourceType::Satellite),
        "other" => Ok(SourceType::Other),
        _ => Err(FilterError::UnknownSourceType(raw.to_string())),
    }
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
        .unwrap_or(raw)
}
