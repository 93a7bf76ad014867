use common::domain::{CanonicalEvent, DomainError, DomainResult, InsertFragment};
use serde_json::Value;

/// Upper bound Postgres places on identifier length, in bytes
const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated `table` or `schema.table` destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTable {
    schema: Option<String>,
    name: String,
}

impl DestinationTable {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let invalid = || DomainError::InvalidDestinationTable(raw.to_string());

        let (schema, name) = match raw.split_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, raw),
        };

        if !is_valid_identifier(name) || schema.is_some_and(|s| !is_valid_identifier(s)) {
            return Err(invalid());
        }

        Ok(Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{}\".\"{}\"", schema, self.name),
            None => format!("\"{}\"", self.name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatementBuilderConfig {
    pub source_timestamp_column: String,
    pub ingestion_timestamp_column: String,
    /// Append `ON CONFLICT DO NOTHING` so redelivered rows hitting a unique key are skipped
    pub on_conflict_do_nothing: bool,
}

impl Default for StatementBuilderConfig {
    fn default() -> Self {
        Self {
            source_timestamp_column: "source_ts".to_string(),
            ingestion_timestamp_column: "ingest_ts".to_string(),
            on_conflict_do_nothing: false,
        }
    }
}

/// Turns canonical events into parameter-bound single-row inserts
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    config: StatementBuilderConfig,
}

impl StatementBuilder {
    pub fn new(config: StatementBuilderConfig) -> DomainResult<Self> {
        for column in [
            &config.source_timestamp_column,
            &config.ingestion_timestamp_column,
        ] {
            if !is_valid_identifier(column) {
                return Err(DomainError::InvalidColumnName(column.clone()));
            }
        }
        Ok(Self { config })
    }

    /// Build the insert for one event.
    ///
    /// Columns follow payload order, then the source timestamp (stream
    /// records only) and the ingestion timestamp. The row travels as a single
    /// JSON parameter and `json_populate_record` coerces each value to its
    /// column type.
    pub fn build_fragment(
        &self,
        table: &DestinationTable,
        event: &CanonicalEvent,
    ) -> DomainResult<InsertFragment> {
        let mut values = event.fields.clone();
        if let Some(source_timestamp) = &event.source_timestamp {
            values.insert(
                self.config.source_timestamp_column.clone(),
                Value::String(source_timestamp.clone()),
            );
        }
        values.insert(
            self.config.ingestion_timestamp_column.clone(),
            Value::String(event.ingestion_timestamp.clone()),
        );

        let columns: Vec<String> = values.keys().cloned().collect();
        if let Some(bad) = columns.iter().find(|c| !is_valid_identifier(c)) {
            return Err(DomainError::InvalidColumnName(bad.clone()));
        }

        let column_list = columns
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        let target = table.quoted();

        let mut sql = format!(
            "INSERT INTO {target} ({column_list}) SELECT {column_list} \
             FROM json_populate_record(NULL::{target}, $1::json)"
        );
        if self.config.on_conflict_do_nothing {
            sql.push_str(" ON CONFLICT DO NOTHING");
        }

        Ok(InsertFragment::new(sql, columns, values))
    }
}

fn is_valid_identifier(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    let starts_well = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    starts_well
        && identifier.len() <= MAX_IDENTIFIER_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
