//! Catalog introspection and DDL generation
//!
//! Table descriptors are read from SQLite's table-valued pragmas, never
//! hardcoded, so a restored store matches whatever the source store declared.

use rusqlite::{Connection, OptionalExtension};

use super::schema::{Table, quote_ident};
use crate::Result;

/// A column as declared in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    /// 1-based position in the primary key, 0 when not part of it
    pub primary_key: u32,
    pub unique: bool,
    /// Default expression as written in the DDL (e.g. `'Ordered'`)
    pub default: Option<String>,
}

impl ColumnDescriptor {
    pub fn is_primary_key(&self) -> bool {
        self.primary_key > 0
    }

    /// Whether values of this column are raw bytes
    pub fn is_binary(&self) -> bool {
        self.declared_type.eq_ignore_ascii_case("BLOB")
    }

    fn definition(&self) -> String {
        let mut def = quote_ident(&self.name);
        if !self.declared_type.is_empty() {
            def.push(' ');
            def.push_str(&self.declared_type);
        }
        if self.not_null {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        if self.unique {
            def.push_str(" UNIQUE");
        }
        def
    }
}

/// A single-column foreign key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDescriptor {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
    /// Referential action other than the default `NO ACTION`
    pub on_delete: Option<String>,
}

/// Columns and foreign keys of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub table: Table,
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

impl TableDescriptor {
    /// Read a table's columns, unique indexes and foreign keys from the catalog
    pub fn introspect(conn: &Connection, table: Table) -> Result<Self> {
        let name = table.as_str();

        let mut stmt = conn.prepare(
            r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#,
        )?;
        let mut columns: Vec<ColumnDescriptor> = stmt
            .query_map([name], |row| {
                Ok(ColumnDescriptor {
                    name: row.get(0)?,
                    declared_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    default: row.get(3)?,
                    primary_key: row.get(4)?,
                    unique: false,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        for column in unique_columns(conn, name)? {
            if let Some(c) = columns.iter_mut().find(|c| c.name == column) {
                c.unique = true;
            }
        }

        let foreign_keys = foreign_keys(conn, name)?;

        Ok(Self {
            table,
            columns,
            foreign_keys,
        })
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary-key columns in key order
    pub fn primary_key(&self) -> Vec<&ColumnDescriptor> {
        let mut pk: Vec<&ColumnDescriptor> = self.columns.iter().filter(|c| c.is_primary_key()).collect();
        pk.sort_by_key(|c| c.primary_key);
        pk
    }

    /// Generate the `CREATE TABLE` statement for this descriptor
    pub fn create_statement(&self) -> String {
        let table = self.table.as_str();
        let mut parts: Vec<String> = self.columns.iter().map(ColumnDescriptor::definition).collect();

        let pk = self.primary_key();
        if !pk.is_empty() {
            let cols: Vec<String> = pk.iter().map(|c| quote_ident(&c.name)).collect();
            parts.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }

        for fk in &self.foreign_keys {
            let mut clause = format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_ident(&format!("fk_{}_{}", table, fk.column)),
                quote_ident(&fk.column),
                quote_ident(&fk.references_table),
                quote_ident(&fk.references_column),
            );
            if let Some(action) = &fk.on_delete {
                clause.push_str(" ON DELETE ");
                clause.push_str(action);
            }
            parts.push(clause);
        }

        format!("CREATE TABLE {} (\n    {}\n)", quote_ident(table), parts.join(",\n    "))
    }
}

/// Columns covered by a single-column unique index that is not the primary key
fn unique_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"SELECT name FROM pragma_index_list(?1) WHERE "unique" = 1 AND origin != 'pk'"#,
    )?;
    let indexes: Vec<String> = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1)")?;
    let mut columns = Vec::new();
    for index in indexes {
        let covered: Vec<Option<String>> = info
            .query_map([&index], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        // Composite unique indexes cannot be expressed as a column flag
        if let [Some(column)] = covered.as_slice() {
            columns.push(column.clone());
        }
    }
    Ok(columns)
}

fn foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKeyDescriptor>> {
    // SQLite numbers foreign keys last-declared first
    let mut stmt = conn.prepare(
        r#"SELECT "table", "from", "to", on_delete FROM pragma_foreign_key_list(?1) ORDER BY id DESC, seq"#,
    )?;
    let raw: Vec<(String, String, Option<String>, String)> = stmt
        .query_map([table], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
        .collect::<rusqlite::Result<_>>()?;

    let mut keys = Vec::with_capacity(raw.len());
    for (parent, column, to, on_delete) in raw {
        let references_column = match to {
            Some(to) => to,
            None => parent_key(conn, &parent)?.unwrap_or_else(|| "rowid".to_string()),
        };
        keys.push(ForeignKeyDescriptor {
            column,
            references_table: parent,
            references_column,
            on_delete: (on_delete != "NO ACTION").then_some(on_delete),
        });
    }
    Ok(keys)
}

/// Primary key column of a parent table, for keys declared without a target column
fn parent_key(conn: &Connection, parent: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT name FROM pragma_table_info(?1) WHERE pk = 1",
            [parent],
            |row| row.get(0),
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Gateway;

    #[test]
    fn test_customers_columns() {
        let gateway = Gateway::open_seeded_in_memory().unwrap();
        let desc = TableDescriptor::introspect(gateway.connection(), Table::Customers).unwrap();

        assert_eq!(desc.columns.len(), 7);
        let id = desc.column("Customer_ID").unwrap();
        assert!(id.is_primary_key());
        assert!(!id.unique);

        let username = desc.column("Customer_Username").unwrap();
        assert!(username.unique);
        assert!(username.not_null);

        assert!(desc.column("Customer_Password").unwrap().is_binary());
        assert!(desc.foreign_keys.is_empty());
    }

    #[test]
    fn test_composite_key_and_cascade() {
        let gateway = Gateway::open_seeded_in_memory().unwrap();
        let desc = TableDescriptor::introspect(gateway.connection(), Table::BasketContents).unwrap();

        let pk: Vec<&str> = desc.primary_key().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(pk, ["Basket_ID", "Product_ID"]);
        // The composite key's index must not mark its columns unique
        assert!(desc.columns.iter().all(|c| !c.unique));

        let basket_fk = desc.foreign_keys.iter().find(|fk| fk.column == "Basket_ID").unwrap();
        assert_eq!(basket_fk.references_table, "Customer_Basket");
        assert_eq!(basket_fk.on_delete.as_deref(), Some("CASCADE"));
        let product_fk = desc.foreign_keys.iter().find(|fk| fk.column == "Product_ID").unwrap();
        assert_eq!(product_fk.on_delete, None);
    }

    #[test]
    fn test_defaults_are_kept_as_expressions() {
        let gateway = Gateway::open_seeded_in_memory().unwrap();
        let desc = TableDescriptor::introspect(gateway.connection(), Table::Orders).unwrap();
        assert_eq!(desc.column("Order_Status").unwrap().default.as_deref(), Some("'Ordered'"));
        assert_eq!(desc.foreign_keys.len(), 4);
    }

    #[test]
    fn test_create_statement_recreates_same_descriptor() {
        let source = Gateway::open_seeded_in_memory().unwrap();
        let target = Gateway::open_in_memory().unwrap();

        for table in Table::all() {
            let desc = TableDescriptor::introspect(source.connection(), *table).unwrap();
            target.run_batch(&desc.create_statement()).unwrap();
            let recreated = TableDescriptor::introspect(target.connection(), *table).unwrap();
            assert_eq!(recreated, desc, "descriptor mismatch for {}", table);
        }
    }
}
