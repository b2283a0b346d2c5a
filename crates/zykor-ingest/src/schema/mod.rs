//! Per-data-type schema descriptors
//!
//! A [`SchemaDescriptor`] says where a data type's items live in the raw
//! payload, how each item maps to typed columns, which table receives them,
//! and how their idempotency keys are derived. Descriptors for the ContaHub
//! and Nibo feeds live in [`contahub`] and [`nibo`]; [`SchemaRegistry`]
//! resolves them by `data_type`.

pub mod contahub;
pub mod nibo;
pub mod registry;

pub use registry::SchemaRegistry;

use serde_json::Value;

use crate::error::{IngestError, Result};
use crate::keys::KeyStrategy;

/// Default tenant column in every target table
pub const DEFAULT_TENANT_COLUMN: &str = "bar_id";

/// Default upsert conflict column in every target table
pub const DEFAULT_KEY_COLUMN: &str = "idempotency_key";

/// How a source value is coerced into a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Bool,
    /// Date part of an ISO string; `0001-01-01` and garbage become null
    Date,
    /// Local wall time with the timezone suffix stripped
    Timestamp,
    /// Hour of day from `"HH:MM"` or a bare number
    Hour,
    /// Month number from a `"YYYY-MM"` string
    MonthOfYearMonth,
    /// Passthrough JSON, null when absent
    Json,
    /// Week of year computed from an earlier `Date` column of the record
    WeekOfYear { date_column: String },
}

/// One target column and where its value comes from
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub column: String,
    /// Candidate source paths; the first present, non-null, non-empty wins.
    /// Dotted paths reach into nested objects.
    pub sources: Vec<String>,
    pub kind: FieldKind,
    /// Raw value used when no source is present
    pub fallback: Option<Value>,
}

impl FieldSpec {
    /// Column read from a source key of the same name
    pub fn new(column: &str, kind: FieldKind) -> Self {
        Self {
            column: column.to_string(),
            sources: vec![column.to_string()],
            kind,
            fallback: None,
        }
    }

    pub fn text(column: &str) -> Self {
        Self::new(column, FieldKind::Text)
    }

    pub fn integer(column: &str) -> Self {
        Self::new(column, FieldKind::Integer)
    }

    pub fn float(column: &str) -> Self {
        Self::new(column, FieldKind::Float)
    }

    pub fn boolean(column: &str) -> Self {
        Self::new(column, FieldKind::Bool)
    }

    pub fn date(column: &str) -> Self {
        Self::new(column, FieldKind::Date)
    }

    pub fn timestamp(column: &str) -> Self {
        Self::new(column, FieldKind::Timestamp)
    }

    pub fn json(column: &str) -> Self {
        Self::new(column, FieldKind::Json)
    }

    pub fn week_of(column: &str, date_column: &str) -> Self {
        Self {
            column: column.to_string(),
            sources: Vec::new(),
            kind: FieldKind::WeekOfYear {
                date_column: date_column.to_string(),
            },
            fallback: None,
        }
    }

    /// Replace the source paths
    pub fn at(mut self, sources: &[&str]) -> Self {
        self.sources = sources.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn or(mut self, fallback: impl Into<Value>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }
}

/// Everything needed to turn one data type's raw payload into rows
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    pub data_type: String,
    pub table: String,
    /// Payload key holding the item list (`list`, `items`)
    pub container: String,
    pub tenant_column: String,
    pub key_column: String,
    /// Default rows per upsert call when the invocation gives none
    pub batch_size: usize,
    pub fields: Vec<FieldSpec>,
    pub key_strategy: KeyStrategy,
}

impl SchemaDescriptor {
    pub fn new(data_type: &str, table: &str, container: &str, batch_size: usize) -> Self {
        Self {
            data_type: data_type.to_string(),
            table: table.to_string(),
            container: container.to_string(),
            tenant_column: DEFAULT_TENANT_COLUMN.to_string(),
            key_column: DEFAULT_KEY_COLUMN.to_string(),
            batch_size,
            fields: Vec::new(),
            key_strategy: KeyStrategy::content_hash_all(),
        }
    }

    pub fn fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.fields = fields;
        self
    }

    pub fn key(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn field(&self, column: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Check internal consistency
    ///
    /// Rejects empty names, duplicate or reserved columns, week fields that
    /// do not point at an earlier date column, and key strategies naming
    /// unknown columns.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| {
            Err(IngestError::InvalidInput(format!(
                "descriptor '{}': {}",
                self.data_type, reason
            )))
        };

        if self.data_type.trim().is_empty() || self.table.trim().is_empty() {
            return invalid("data type and table must be set".into());
        }
        if self.container.trim().is_empty() {
            return invalid("payload container key must be set".into());
        }
        if self.batch_size == 0 {
            return invalid("batch size must be greater than 0".into());
        }
        if self.fields.is_empty() {
            return invalid("at least one field is required".into());
        }

        for (position, field) in self.fields.iter().enumerate() {
            let column = field.column.as_str();
            if column.trim().is_empty() {
                return invalid(format!("field #{position} has an empty column name"));
            }
            if column == self.tenant_column || column == self.key_column {
                return invalid(format!("column '{column}' is reserved"));
            }
            if self.fields[..position].iter().any(|f| f.column == column) {
                return invalid(format!("duplicate column '{column}'"));
            }
            match &field.kind {
                FieldKind::WeekOfYear { date_column } => {
                    let source = self.fields[..position]
                        .iter()
                        .find(|f| &f.column == date_column);
                    if !matches!(source, Some(f) if f.kind == FieldKind::Date) {
                        return invalid(format!(
                            "week column '{column}' needs an earlier date column '{date_column}'"
                        ));
                    }
                },
                _ if field.sources.is_empty() => {
                    return invalid(format!("column '{column}' has no source path"));
                },
                _ => {},
            }
        }

        if matches!(self.key_strategy, KeyStrategy::NaturalKey { .. })
            && self.key_strategy.fields().is_empty()
        {
            return invalid("natural key needs at least one column".into());
        }
        for column in self.key_strategy.referenced_columns() {
            if self.field(column).is_none() {
                return invalid(format!("key references unknown column '{column}'"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn descriptor() -> SchemaDescriptor {
        SchemaDescriptor::new("sample", "sample_table", "list", 100).fields(vec![
            FieldSpec::text("id"),
            FieldSpec::date("dia"),
            FieldSpec::week_of("semana", "dia"),
        ])
    }

    #[test]
    fn test_valid_descriptor() {
        descriptor()
            .key(KeyStrategy::natural(&["id"]))
            .validate()
            .unwrap();
    }

    #[test]
    fn test_unknown_key_column_is_rejected() {
        let err = descriptor()
            .key(KeyStrategy::natural(&["missing"]))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("unknown column 'missing'"));
    }

    #[test]
    fn test_week_needs_earlier_date_column() {
        let desc = SchemaDescriptor::new("sample", "t", "list", 10).fields(vec![
            FieldSpec::week_of("semana", "dia"),
            FieldSpec::date("dia"),
        ]);
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_reserved_and_duplicate_columns() {
        let reserved = SchemaDescriptor::new("s", "t", "list", 10)
            .fields(vec![FieldSpec::integer(DEFAULT_TENANT_COLUMN)]);
        assert!(reserved.validate().is_err());

        let duplicate = SchemaDescriptor::new("s", "t", "list", 10)
            .fields(vec![FieldSpec::text("a"), FieldSpec::float("a")]);
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let desc = SchemaDescriptor::new("s", "t", "list", 0).fields(vec![FieldSpec::text("a")]);
        assert!(matches!(desc.validate(), Err(IngestError::InvalidInput(_))));
    }
}
