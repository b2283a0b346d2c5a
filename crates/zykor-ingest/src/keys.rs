//! Idempotency key derivation
//!
//! A key is a pure function of a record's business fields plus the tenant
//! and data type. Two strategies exist:
//!
//! - **Content hash**: MD5 over a canonical serialization of the listed
//!   fields (all fields when the list is empty), lower hex
//! - **Natural key**: `data_type:tenant:v1|v2|...` from stable source ids
//!
//! Either can append a uniquifier for sources whose rows can legitimately
//! repeat every identifying field. [`derive_keys`] covers whole captures and
//! is the only way to get `Uniquifier::Occurrence` suffixes. Nothing time- or
//! run-dependent ever enters a key, so re-ingesting a capture always
//! reproduces the same keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use zykor_common::checksum::compute_md5;

use crate::record::NormalizedRecord;

/// Separator between canonical content-hash components (ASCII unit separator)
const UNIT_SEPARATOR: char = '\u{1f}';

/// Opaque deduplication fingerprint, used as the upsert conflict target
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Wrap an already derived key, e.g. one read back from a store
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extra discriminator for rows that may share every business field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Uniquifier {
    #[default]
    None,
    /// An explicit sequence column of the record (e.g. a line number)
    Field(String),
    /// The record's zero-based position in the payload list
    SourceIndex,
    /// How many earlier records of the capture share the same base key;
    /// the first occurrence gets no suffix
    Occurrence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStrategy {
    ContentHash {
        /// Empty means every column of the record
        fields: Vec<String>,
        uniquifier: Uniquifier,
    },
    NaturalKey {
        fields: Vec<String>,
        uniquifier: Uniquifier,
    },
}

impl KeyStrategy {
    /// Hash over every column, in declaration order
    pub fn content_hash_all() -> Self {
        KeyStrategy::ContentHash {
            fields: Vec::new(),
            uniquifier: Uniquifier::None,
        }
    }

    pub fn content_hash(fields: &[&str]) -> Self {
        KeyStrategy::ContentHash {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            uniquifier: Uniquifier::None,
        }
    }

    pub fn natural(fields: &[&str]) -> Self {
        KeyStrategy::NaturalKey {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            uniquifier: Uniquifier::None,
        }
    }

    pub fn with_uniquifier(mut self, value: Uniquifier) -> Self {
        match &mut self {
            KeyStrategy::ContentHash { uniquifier, .. }
            | KeyStrategy::NaturalKey { uniquifier, .. } => *uniquifier = value,
        }
        self
    }

    pub fn with_source_index(self) -> Self {
        self.with_uniquifier(Uniquifier::SourceIndex)
    }

    pub fn with_occurrence(self) -> Self {
        self.with_uniquifier(Uniquifier::Occurrence)
    }

    pub fn fields(&self) -> &[String] {
        match self {
            KeyStrategy::ContentHash { fields, .. } | KeyStrategy::NaturalKey { fields, .. } => {
                fields
            },
        }
    }

    pub fn uniquifier(&self) -> &Uniquifier {
        match self {
            KeyStrategy::ContentHash { uniquifier, .. }
            | KeyStrategy::NaturalKey { uniquifier, .. } => uniquifier,
        }
    }

    /// Column names the strategy reads, including a `Field` uniquifier
    pub fn referenced_columns(&self) -> impl Iterator<Item = &str> {
        let extra = match self.uniquifier() {
            Uniquifier::Field(column) => Some(column.as_str()),
            _ => None,
        };
        self.fields().iter().map(String::as_str).chain(extra)
    }
}

/// Derive the idempotency key for one record
///
/// Columns named by the strategy but absent from the record contribute an
/// empty component; registry validation rejects such strategies up front.
pub fn derive_key(
    record: &NormalizedRecord,
    tenant_id: i64,
    data_type: &str,
    strategy: &KeyStrategy,
) -> IdempotencyKey {
    let suffix = uniquifier_value(record, strategy.uniquifier());
    compose_key(record, tenant_id, data_type, strategy, suffix)
}

/// Derive keys for every record of one capture, in order
///
/// Identical to mapping [`derive_key`] except under `Uniquifier::Occurrence`,
/// where the n-th record sharing a base key gets suffix `n`.
pub fn derive_keys(
    records: &[NormalizedRecord],
    tenant_id: i64,
    data_type: &str,
    strategy: &KeyStrategy,
) -> Vec<IdempotencyKey> {
    if *strategy.uniquifier() != Uniquifier::Occurrence {
        return records
            .iter()
            .map(|record| derive_key(record, tenant_id, data_type, strategy))
            .collect();
    }

    let mut seen: HashMap<IdempotencyKey, usize> = HashMap::new();
    records
        .iter()
        .map(|record| {
            let base = compose_key(record, tenant_id, data_type, strategy, None);
            let occurrence = seen.entry(base.clone()).or_insert(0);
            let key = match *occurrence {
                0 => base,
                n => compose_key(record, tenant_id, data_type, strategy, Some(n.to_string())),
            };
            *occurrence += 1;
            key
        })
        .collect()
}

fn compose_key(
    record: &NormalizedRecord,
    tenant_id: i64,
    data_type: &str,
    strategy: &KeyStrategy,
    suffix: Option<String>,
) -> IdempotencyKey {
    match strategy {
        KeyStrategy::ContentHash { fields, .. } => {
            let mut canonical = format!("{data_type}{UNIT_SEPARATOR}{tenant_id}");
            if fields.is_empty() {
                for (column, value) in record.fields() {
                    push_component(&mut canonical, column, &value.to_json().to_string());
                }
            } else {
                for column in fields {
                    let value = record
                        .get(column)
                        .map(|v| v.to_json().to_string())
                        .unwrap_or_default();
                    push_component(&mut canonical, column, &value);
                }
            }
            if let Some(suffix) = suffix {
                push_component(&mut canonical, "#", &suffix);
            }
            IdempotencyKey(compute_md5(canonical.as_bytes()))
        },
        KeyStrategy::NaturalKey { fields, .. } => {
            let components: Vec<String> = fields
                .iter()
                .map(|column| {
                    escape_component(
                        &record.get(column).map(|v| v.canonical()).unwrap_or_default(),
                    )
                })
                .collect();
            let mut key = format!("{data_type}:{tenant_id}:{}", components.join("|"));
            if let Some(suffix) = suffix {
                key.push('#');
                key.push_str(&escape_component(&suffix));
            }
            IdempotencyKey(key)
        },
    }
}

fn push_component(buf: &mut String, column: &str, value: &str) {
    buf.push(UNIT_SEPARATOR);
    buf.push_str(column);
    buf.push('=');
    buf.push_str(value);
}

fn uniquifier_value(record: &NormalizedRecord, uniquifier: &Uniquifier) -> Option<String> {
    match uniquifier {
        Uniquifier::None | Uniquifier::Occurrence => None,
        Uniquifier::Field(column) => Some(record.get(column).map(|v| v.canonical()).unwrap_or_default()),
        Uniquifier::SourceIndex => Some(record.source_index().to_string()),
    }
}

/// Keep `|` and `#` inside values from colliding with the key delimiters
fn escape_component(value: &str) -> String {
    if !value.contains(['\\', '|', '#']) {
        return value.to_string();
    }
    let mut escaped = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        if matches!(c, '\\' | '|' | '#') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use chrono::NaiveDate;

    fn analitico_row(index: usize, trn: i64, itm: i64, valor: f64) -> NormalizedRecord {
        let mut record = NormalizedRecord::new(index);
        record.set("trn", FieldValue::Integer(trn));
        record.set("itm", FieldValue::Integer(itm));
        record.set(
            "trn_dtgerencial",
            FieldValue::Date(NaiveDate::from_ymd_opt(2025, 2, 1)),
        );
        record.set("valorfinal", FieldValue::Float(valor));
        record
    }

    #[test]
    fn test_natural_key_format() {
        let strategy = KeyStrategy::natural(&["trn", "itm", "trn_dtgerencial"]);
        let key = derive_key(&analitico_row(0, 812, 3, 10.0), 3, "analitico", &strategy);
        assert_eq!(key.as_str(), "analitico:3:812|3|2025-02-01");
    }

    #[test]
    fn test_natural_key_ignores_non_key_fields() {
        let strategy = KeyStrategy::natural(&["trn", "itm", "trn_dtgerencial"]);
        let a = derive_key(&analitico_row(0, 812, 3, 10.0), 3, "analitico", &strategy);
        let b = derive_key(&analitico_row(9, 812, 3, 99.0), 3, "analitico", &strategy);
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_hash_is_lower_hex_md5() {
        let key = derive_key(
            &analitico_row(0, 1, 1, 1.0),
            3,
            "periodo",
            &KeyStrategy::content_hash_all(),
        );
        assert_eq!(key.as_str().len(), 32);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_content_hash_discriminates_tenant_type_and_fields() {
        let strategy = KeyStrategy::content_hash_all();
        let row = analitico_row(0, 1, 1, 1.0);
        let base = derive_key(&row, 3, "periodo", &strategy);

        assert_ne!(base, derive_key(&row, 4, "periodo", &strategy));
        assert_ne!(base, derive_key(&row, 3, "tempo", &strategy));
        assert_ne!(base, derive_key(&analitico_row(0, 1, 1, 1.5), 3, "periodo", &strategy));
    }

    #[test]
    fn test_source_index_separates_identical_rows() {
        let strategy = KeyStrategy::content_hash_all().with_source_index();
        let first = derive_key(&analitico_row(0, 1, 1, 1.0), 3, "pagamentos", &strategy);
        let second = derive_key(&analitico_row(1, 1, 1, 1.0), 3, "pagamentos", &strategy);
        assert_ne!(first, second);

        let plain = KeyStrategy::content_hash_all();
        assert_eq!(
            derive_key(&analitico_row(0, 1, 1, 1.0), 3, "pagamentos", &plain),
            derive_key(&analitico_row(1, 1, 1, 1.0), 3, "pagamentos", &plain),
        );
    }

    #[test]
    fn test_field_uniquifier_and_escaping() {
        let mut record = NormalizedRecord::new(0);
        record.set("nibo_id", FieldValue::Text("a|b".into()));
        record.set("parcela", FieldValue::Integer(2));
        let strategy =
            KeyStrategy::natural(&["nibo_id"]).with_uniquifier(Uniquifier::Field("parcela".into()));

        let key = derive_key(&record, 1, "agendamentos", &strategy);
        assert_eq!(key.as_str(), "agendamentos:1:a\\|b#2");
        assert_eq!(
            strategy.referenced_columns().collect::<Vec<_>>(),
            vec!["nibo_id", "parcela"]
        );
    }

    #[test]
    fn test_occurrence_counts_repeats_only() {
        let strategy = KeyStrategy::content_hash(&["trn", "itm"]).with_occurrence();
        let records = vec![
            analitico_row(0, 1, 1, 5.0),
            analitico_row(1, 2, 1, 5.0),
            analitico_row(2, 1, 1, 7.0),
        ];
        let keys = derive_keys(&records, 3, "pagamentos", &strategy);

        assert_eq!(keys[0], derive_key(&records[0], 3, "pagamentos", &strategy));
        assert_eq!(keys[1], derive_key(&records[1], 3, "pagamentos", &strategy));
        assert_ne!(keys[2], keys[0]);

        // Reordering unrelated rows keeps every key
        let reordered = vec![records[1].clone(), records[0].clone(), records[2].clone()];
        let mut again = derive_keys(&reordered, 3, "pagamentos", &strategy);
        let mut original = keys.clone();
        again.sort();
        original.sort();
        assert_eq!(again, original);
    }

    #[test]
    fn test_occurrence_suffix_on_natural_key() {
        let strategy = KeyStrategy::natural(&["trn"]).with_occurrence();
        let records = vec![analitico_row(0, 812, 1, 1.0), analitico_row(1, 812, 2, 1.0)];
        let keys = derive_keys(&records, 3, "analitico", &strategy);
        assert_eq!(keys[0].as_str(), "analitico:3:812");
        assert_eq!(keys[1].as_str(), "analitico:3:812#1");
    }
}
