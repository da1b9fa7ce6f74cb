//! Schema archiver - full-store XML backup and restore
//!
//! Export walks every known table parents-first, records its catalog schema
//! and every row. Restore drops all known tables children-first, recreates
//! each table from the recorded schema and replays the rows, committing once.
//!
//! Every value carries its storage class, so a row reads back with the same
//! types it was exported with. Reals use the shortest text that parses back
//! to the same bits and are bound as parameters, never re-parsed by SQLite.

pub mod document;

use std::path::Path;

use rusqlite::params_from_iter;
use rusqlite::types::Value;
use tracing::{debug, info};

use crate::storage::schema::quote_ident;
use crate::storage::{Fetch, Gateway, Table, TableDescriptor};
use crate::{Error, Result};

pub use document::{BackupDocument, Field, RowEntry, TableEntry, ValueKind};

/// Export settings
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Leave out columns whose name mentions an image, to keep the document small
    pub skip_images: bool,
}

impl ExportOptions {
    fn includes(&self, column: &str) -> bool {
        !(self.skip_images && column.to_ascii_lowercase().contains("image"))
    }
}

/// What an export or restore touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub tables: usize,
    pub rows: usize,
}

/// Backup and restore over a gateway
pub struct Archiver<'a> {
    gateway: &'a mut Gateway,
}

impl<'a> Archiver<'a> {
    pub fn new(gateway: &'a mut Gateway) -> Self {
        Self { gateway }
    }

    /// Read schema and data of every known table
    pub fn snapshot(&self, options: ExportOptions) -> Result<BackupDocument> {
        let mut doc = BackupDocument::default();
        for table in Table::all() {
            let mut schema = TableDescriptor::introspect(self.gateway.connection(), *table)?;
            let rows = self.table_rows(&schema, options)?;
            schema.columns.retain(|c| options.includes(&c.name));
            debug!("Snapshot {}: {} columns, {} rows", table, schema.columns.len(), rows.len());
            doc.tables.push(TableEntry { schema, rows });
        }
        Ok(doc)
    }

    fn table_rows(&self, schema: &TableDescriptor, options: ExportOptions) -> Result<Vec<RowEntry>> {
        let columns: Vec<_> = schema.columns.iter().filter(|c| options.includes(&c.name)).collect();
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let select_list: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            select_list.join(", "),
            quote_ident(schema.table.as_str())
        );

        let rows = self.gateway.select(&sql, [], Fetch::All)?;
        let entries = rows
            .iter()
            .map(|row| RowEntry {
                fields: columns
                    .iter()
                    .map(|c| {
                        let encoded = row.get(&c.name).and_then(encode_value);
                        Field {
                            column: c.name.clone(),
                            kind: encoded.as_ref().map(|(kind, _)| *kind),
                            value: encoded.map(|(_, text)| text),
                        }
                    })
                    .collect(),
            })
            .collect();
        Ok(entries)
    }

    /// Write the whole store to an XML file
    pub fn export(&self, path: &Path, options: ExportOptions) -> Result<ArchiveSummary> {
        let doc = self.snapshot(options)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, doc.to_xml()?)?;

        let summary = ArchiveSummary {
            tables: doc.tables.len(),
            rows: doc.row_count(),
        };
        info!("Exported {} tables ({} rows) to {}", summary.tables, summary.rows, path.display());
        Ok(summary)
    }

    /// Replace the store's contents with an XML backup file
    pub fn restore(&mut self, path: &Path) -> Result<ArchiveSummary> {
        let xml = std::fs::read_to_string(path)?;
        let doc = BackupDocument::from_xml(&xml)?;
        let summary = self.apply(&doc)?;
        info!("Restored {} tables ({} rows) from {}", summary.tables, summary.rows, path.display());
        Ok(summary)
    }

    /// Drop every known table and rebuild from the document in one transaction
    pub fn apply(&mut self, doc: &BackupDocument) -> Result<ArchiveSummary> {
        let tx = self.gateway.connection_mut().transaction()?;

        for table in Table::drop_order() {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table.as_str())))?;
        }

        for entry in &doc.tables {
            tx.execute_batch(&entry.schema.create_statement())?;
            for row in &entry.rows {
                let (sql, values) = insert_statement(&entry.schema, row)?;
                tx.execute(&sql, params_from_iter(values.iter()))?;
            }
            debug!("Restored {}: {} rows", entry.schema.table, entry.rows.len());
        }

        tx.commit()?;
        Ok(ArchiveSummary {
            tables: doc.tables.len(),
            rows: doc.row_count(),
        })
    }
}

/// Storage class and document text of a stored value; `None` for NULL
fn encode_value(value: &Value) -> Option<(ValueKind, String)> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some((ValueKind::Integer, i.to_string())),
        Value::Real(f) => Some((ValueKind::Real, format!("{:?}", f))),
        Value::Text(s) => Some((ValueKind::Text, s.clone())),
        Value::Blob(bytes) => Some((ValueKind::Blob, hex::encode(bytes))),
    }
}

/// Read one document field back into a value
///
/// A field without a recorded kind is hex in a binary column and text elsewhere.
fn decode_field(field: &Field, binary: bool) -> Result<Value> {
    let Some(text) = &field.value else {
        return Ok(Value::Null);
    };
    let kind = field.kind.unwrap_or(if binary { ValueKind::Blob } else { ValueKind::Text });
    let invalid = |what: &str| Error::Backup(format!("column {} is not a valid {}: {:?}", field.column, what, text));

    match kind {
        ValueKind::Integer => text.parse().map(Value::Integer).map_err(|_| invalid("integer")),
        ValueKind::Real => text.parse().map(Value::Real).map_err(|_| invalid("real")),
        ValueKind::Text => Ok(Value::Text(text.clone())),
        ValueKind::Blob => hex::decode(text).map(Value::Blob).map_err(|_| invalid("hex blob")),
    }
}

/// INSERT with one bound parameter per field, plus the decoded values
fn insert_statement(schema: &TableDescriptor, row: &RowEntry) -> Result<(String, Vec<Value>)> {
    let table = quote_ident(schema.table.as_str());
    if row.fields.is_empty() {
        return Ok((format!("INSERT INTO {} DEFAULT VALUES", table), Vec::new()));
    }

    let mut columns = Vec::with_capacity(row.fields.len());
    let mut values = Vec::with_capacity(row.fields.len());
    for field in &row.fields {
        let column = schema.column(&field.column).ok_or_else(|| {
            Error::Backup(format!("row of {} names unknown column {}", schema.table, field.column))
        })?;
        columns.push(quote_ident(&field.column));
        values.push(decode_field(field, column.is_binary())?);
    }

    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );
    Ok((sql, values))
}
