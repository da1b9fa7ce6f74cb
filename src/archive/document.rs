//! Backup document model and its XML form
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <database>
//!   <table name="Customers">
//!     <schema>
//!       <column name="Customer_ID" type="INTEGER" not_null="false" primary_key="1" unique="false"/>
//!     </schema>
//!     <constraints>
//!       <foreign_key column="..." references_table="..." references_column="..."/>
//!     </constraints>
//!     <data>
//!       <row>
//!         <field name="Customer_ID" kind="integer">1</field>
//!         <field name="Product_Image" null="true"/>
//!       </row>
//!     </data>
//!   </table>
//! </database>
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::storage::{ColumnDescriptor, ForeignKeyDescriptor, Table, TableDescriptor};
use crate::{Error, Result};

/// SQLite storage class of a recorded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Real,
    Text,
    Blob,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Integer => "integer",
            ValueKind::Real => "real",
            ValueKind::Text => "text",
            ValueKind::Blob => "blob",
        }
    }
}

impl FromStr for ValueKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "integer" => Ok(ValueKind::Integer),
            "real" => Ok(ValueKind::Real),
            "text" => Ok(ValueKind::Text),
            "blob" => Ok(ValueKind::Blob),
            other => Err(Error::Backup(format!("unknown value kind: {}", other))),
        }
    }
}

/// One field of a backed-up row; `None` is SQL NULL
///
/// `kind` is absent in documents that predate it; the column's declared
/// type decides how such a value is read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub column: String,
    pub kind: Option<ValueKind>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowEntry {
    pub fields: Vec<Field>,
}

/// Schema and data of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub schema: TableDescriptor,
    pub rows: Vec<RowEntry>,
}

/// The whole backup: tables in restore order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackupDocument {
    pub tables: Vec<TableEntry>,
}

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

impl BackupDocument {
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    /// Serialize to an indented UTF-8 XML document
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("database")))?;

        for entry in &self.tables {
            let mut table = BytesStart::new("table");
            table.push_attribute(("name", entry.schema.table.as_str()));
            writer.write_event(Event::Start(table))?;

            writer.write_event(Event::Start(BytesStart::new("schema")))?;
            for column in &entry.schema.columns {
                let primary_key = column.primary_key.to_string();
                let mut el = BytesStart::new("column");
                el.push_attribute(("name", column.name.as_str()));
                el.push_attribute(("type", column.declared_type.as_str()));
                el.push_attribute(("not_null", flag(column.not_null)));
                el.push_attribute(("primary_key", primary_key.as_str()));
                el.push_attribute(("unique", flag(column.unique)));
                if let Some(default) = &column.default {
                    el.push_attribute(("default", default.as_str()));
                }
                writer.write_event(Event::Empty(el))?;
            }
            writer.write_event(Event::End(BytesEnd::new("schema")))?;

            writer.write_event(Event::Start(BytesStart::new("constraints")))?;
            for fk in &entry.schema.foreign_keys {
                let mut el = BytesStart::new("foreign_key");
                el.push_attribute(("column", fk.column.as_str()));
                el.push_attribute(("references_table", fk.references_table.as_str()));
                el.push_attribute(("references_column", fk.references_column.as_str()));
                if let Some(action) = &fk.on_delete {
                    el.push_attribute(("on_delete", action.as_str()));
                }
                writer.write_event(Event::Empty(el))?;
            }
            writer.write_event(Event::End(BytesEnd::new("constraints")))?;

            writer.write_event(Event::Start(BytesStart::new("data")))?;
            for row in &entry.rows {
                writer.write_event(Event::Start(BytesStart::new("row")))?;
                for field in &row.fields {
                    let mut el = BytesStart::new("field");
                    el.push_attribute(("name", field.column.as_str()));
                    match &field.value {
                        Some(value) => {
                            if let Some(kind) = field.kind {
                                el.push_attribute(("kind", kind.as_str()));
                            }
                            writer.write_event(Event::Start(el))?;
                            // Always emit the text node so the closing tag stays inline
                            writer.write_event(Event::Text(BytesText::new(value)))?;
                            writer.write_event(Event::End(BytesEnd::new("field")))?;
                        }
                        None => {
                            el.push_attribute(("null", "true"));
                            writer.write_event(Event::Empty(el))?;
                        }
                    }
                }
                writer.write_event(Event::End(BytesEnd::new("row")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("data")))?;

            writer.write_event(Event::End(BytesEnd::new("table")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("database")))?;
        String::from_utf8(writer.into_inner()).map_err(|e| Error::Backup(e.to_string()))
    }

    /// Parse a document produced by [`BackupDocument::to_xml`]
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut doc = BackupDocument::default();
        let mut table: Option<TableEntry> = None;
        let mut row: Option<RowEntry> = None;
        let mut field: Option<(String, Option<ValueKind>, String)> = None;
        let mut seen_root = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"database" => seen_root = true,
                    b"table" => table = Some(start_table(&e)?),
                    b"row" => {
                        require(&table, "row")?;
                        row = Some(RowEntry::default());
                    }
                    b"field" => {
                        require(&row, "field")?;
                        let attrs = attributes(&e)?;
                        field = Some((attr(&attrs, "name")?, kind_attr(&attrs)?, String::new()));
                    }
                    b"column" | b"foreign_key" => element(&e, table.as_mut())?,
                    _ => {}
                },
                Event::Empty(e) => match e.name().as_ref() {
                    b"table" => doc.tables.push(start_table(&e)?),
                    b"row" => {
                        require(&table, "row")?;
                        if let Some(t) = table.as_mut() {
                            t.rows.push(RowEntry::default());
                        }
                    }
                    b"field" => {
                        let attrs = attributes(&e)?;
                        let value = match attrs.get("null").map(String::as_str) {
                            Some("true") => None,
                            _ => Some(String::new()),
                        };
                        let column = attr(&attrs, "name")?;
                        let kind = if value.is_some() { kind_attr(&attrs)? } else { None };
                        row.as_mut()
                            .ok_or_else(|| misplaced("field"))?
                            .fields
                            .push(Field { column, kind, value });
                    }
                    b"column" | b"foreign_key" => element(&e, table.as_mut())?,
                    _ => {}
                },
                Event::Text(t) => {
                    if let Some((_, _, text)) = field.as_mut() {
                        text.push_str(&t.unescape()?);
                    }
                }
                Event::CData(c) => {
                    if let Some((_, _, text)) = field.as_mut() {
                        text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"field" => {
                        if let (Some((column, kind, text)), Some(r)) = (field.take(), row.as_mut()) {
                            r.fields.push(Field {
                                column,
                                kind,
                                value: Some(text),
                            });
                        }
                    }
                    b"row" => {
                        if let (Some(r), Some(t)) = (row.take(), table.as_mut()) {
                            t.rows.push(r);
                        }
                    }
                    b"table" => {
                        if let Some(t) = table.take() {
                            doc.tables.push(t);
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(Error::Backup("missing <database> root element".to_string()));
        }
        Ok(doc)
    }
}

fn misplaced(element: &str) -> Error {
    Error::Backup(format!("<{}> outside of its parent element", element))
}

fn require<T>(parent: &Option<T>, element: &str) -> Result<()> {
    parent.as_ref().map(|_| ()).ok_or_else(|| misplaced(element))
}

fn attributes(e: &BytesStart<'_>) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        map.insert(key, attr.unescape_value()?.into_owned());
    }
    Ok(map)
}

fn attr(attrs: &BTreeMap<String, String>, key: &str) -> Result<String> {
    attrs
        .get(key)
        .cloned()
        .ok_or_else(|| Error::Backup(format!("missing attribute '{}'", key)))
}

fn kind_attr(attrs: &BTreeMap<String, String>) -> Result<Option<ValueKind>> {
    attrs.get("kind").map(|k| k.parse()).transpose()
}

fn bool_attr(attrs: &BTreeMap<String, String>, key: &str) -> Result<bool> {
    match attrs.get(key).map(String::as_str) {
        None | Some("false") => Ok(false),
        Some("true") => Ok(true),
        Some(other) => Err(Error::Backup(format!("attribute '{}' is not a boolean: {}", key, other))),
    }
}

fn start_table(e: &BytesStart<'_>) -> Result<TableEntry> {
    let table: Table = attr(&attributes(e)?, "name")?.parse()?;
    Ok(TableEntry {
        schema: TableDescriptor {
            table,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        },
        rows: Vec::new(),
    })
}

/// Handle a `<column>` or `<foreign_key>` element
fn element(e: &BytesStart<'_>, table: Option<&mut TableEntry>) -> Result<()> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let table = table.ok_or_else(|| misplaced(&name))?;
    let attrs = attributes(e)?;

    if name == "column" {
        let primary_key = match attrs.get("primary_key") {
            Some(pk) => pk
                .parse()
                .map_err(|_| Error::Backup(format!("invalid primary_key position: {}", pk)))?,
            None => 0,
        };
        table.schema.columns.push(ColumnDescriptor {
            name: attr(&attrs, "name")?,
            declared_type: attrs.get("type").cloned().unwrap_or_default(),
            not_null: bool_attr(&attrs, "not_null")?,
            primary_key,
            unique: bool_attr(&attrs, "unique")?,
            default: attrs.get("default").cloned(),
        });
    } else {
        table.schema.foreign_keys.push(ForeignKeyDescriptor {
            column: attr(&attrs, "column")?,
            references_table: attr(&attrs, "references_table")?,
            references_column: attr(&attrs, "references_column")?,
            on_delete: attrs.get("on_delete").cloned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BackupDocument {
        BackupDocument {
            tables: vec![TableEntry {
                schema: TableDescriptor {
                    table: Table::Category,
                    columns: vec![
                        ColumnDescriptor {
                            name: "Category_ID".into(),
                            declared_type: "INTEGER".into(),
                            not_null: false,
                            primary_key: 1,
                            unique: false,
                            default: None,
                        },
                        ColumnDescriptor {
                            name: "Category_Name".into(),
                            declared_type: "TEXT".into(),
                            not_null: true,
                            primary_key: 0,
                            unique: true,
                            default: Some("'None'".into()),
                        },
                    ],
                    foreign_keys: vec![],
                },
                rows: vec![
                    RowEntry {
                        fields: vec![
                            Field { column: "Category_ID".into(), kind: Some(ValueKind::Integer), value: Some("1".into()) },
                            Field {
                                column: "Category_Name".into(),
                                kind: Some(ValueKind::Text),
                                value: Some("  <Tools> & \"Parts\"  ".into()),
                            },
                        ],
                    },
                    RowEntry {
                        fields: vec![
                            Field { column: "Category_ID".into(), kind: Some(ValueKind::Integer), value: Some("2".into()) },
                            Field { column: "Category_Name".into(), kind: None, value: None },
                        ],
                    },
                    RowEntry {
                        fields: vec![
                            Field { column: "Category_ID".into(), kind: None, value: Some("3".into()) },
                            Field { column: "Category_Name".into(), kind: Some(ValueKind::Text), value: Some(String::new()) },
                        ],
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_header_and_structure() {
        let xml = sample().to_xml().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<table name="Category">"#));
        assert!(xml.contains(r#"<field name="Category_Name" null="true"/>"#));
        assert!(xml.contains(r#"<field name="Category_ID" kind="integer">1</field>"#));
        assert!(xml.contains(r#"<field name="Category_ID">3</field>"#));
    }

    #[test]
    fn test_unknown_value_kind_is_rejected() {
        let xml = r#"<database><table name="Category"><data><row><field name="Category_ID" kind="decimal">1</field></row></data></table></database>"#;
        assert!(matches!(BackupDocument::from_xml(xml), Err(Error::Backup(_))));
    }

    #[test]
    fn test_null_empty_and_escaped_text_survive() {
        let doc = sample();
        let parsed = BackupDocument::from_xml(&doc.to_xml().unwrap()).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_unknown_table_is_rejected() {
        let xml = r#"<?xml version="1.0"?><database><table name="Secrets"></table></database>"#;
        assert!(matches!(BackupDocument::from_xml(xml), Err(Error::UnknownTable(_))));
    }

    #[test]
    fn test_field_outside_row_is_rejected() {
        let xml = r#"<database><table name="Category"><data><field name="x">1</field></data></table></database>"#;
        assert!(matches!(BackupDocument::from_xml(xml), Err(Error::Backup(_))));
    }

    #[test]
    fn test_missing_root_is_rejected() {
        assert!(matches!(BackupDocument::from_xml(""), Err(Error::Backup(_))));
    }
}
