use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::target::Mmsi;

/// Kind of receiver that delivered a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Terrestrial,
    Satellite,
    #[default]
    Other,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Terrestrial => write!(f, "terrestrial"),
            SourceType::Satellite => write!(f, "satellite"),
            SourceType::Other => write!(f, "other"),
        }
    }
}

/// Where a report came from. Source filters on queries are predicates over this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct PacketSource {
    pub source_id: String,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl PacketSource {
    pub fn new(source_id: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            source_id: source_id.into(),
            source_type,
            region: None,
            country: None,
        }
    }
}

/// Typed field values carried by a report. The store never looks inside them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Extract as string, returning None for non-text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view used by comparison filters.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// One decoded position/identity report for a vessel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AisReport {
    pub mmsi: Mmsi,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub source: PacketSource,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

impl AisReport {
    pub fn new(mmsi: Mmsi, received_at: DateTime<Utc>, source: PacketSource) -> Self {
        Self {
            mmsi,
            received_at,
            source,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}
