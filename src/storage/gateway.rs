//! SQLite query gateway
//!
//! The gateway is the only component that talks to the store. Reads return
//! name-keyed [`Row`]s and propagate errors; mutations commit or roll back on
//! their own and report constraint violations as a [`MutationFailure`] value.

use std::fmt;
use std::path::Path;

use rusqlite::{Connection, ErrorCode, Params, Transaction, ffi};
use tracing::{debug, warn};

use super::row::Row;
use super::schema::{self, Table};
use crate::Result;

/// How many rows a select should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// Every matching row
    All,
    /// At most this many rows
    Many(usize),
    /// The first row, if any
    One,
}

impl Fetch {
    fn limit(self) -> usize {
        match self {
            Fetch::All => usize::MAX,
            Fetch::Many(n) => n,
            Fetch::One => 1,
        }
    }
}

/// The constraint a rejected statement violated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityKind {
    Unique,
    PrimaryKey,
    ForeignKey,
    NotNull,
    Check,
    Other,
}

impl IntegrityKind {
    fn from_extended_code(code: i32) -> Self {
        match code {
            ffi::SQLITE_CONSTRAINT_UNIQUE => IntegrityKind::Unique,
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY => IntegrityKind::PrimaryKey,
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => IntegrityKind::ForeignKey,
            ffi::SQLITE_CONSTRAINT_NOTNULL => IntegrityKind::NotNull,
            ffi::SQLITE_CONSTRAINT_CHECK => IntegrityKind::Check,
            _ => IntegrityKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityKind::Unique => "unique",
            IntegrityKind::PrimaryKey => "primary key",
            IntegrityKind::ForeignKey => "foreign key",
            IntegrityKind::NotNull => "not null",
            IntegrityKind::Check => "check",
            IntegrityKind::Other => "constraint",
        }
    }
}

/// Broad category of a failed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A constraint rejected the statement
    Integrity(IntegrityKind),
    /// Any other store-level fault
    Store,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Integrity(kind) => write!(f, "integrity ({})", kind.as_str()),
            FailureKind::Store => f.write_str("store"),
        }
    }
}

/// A rolled-back mutation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} failure: {message}")]
pub struct MutationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl MutationFailure {
    pub fn integrity(kind: IntegrityKind, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Integrity(kind),
            message: message.into(),
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self.kind, FailureKind::Integrity(_))
    }

    /// Duplicate value in a unique or primary-key column
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::Integrity(IntegrityKind::Unique | IntegrityKind::PrimaryKey)
        )
    }

    pub fn integrity_kind(&self) -> Option<IntegrityKind> {
        match self.kind {
            FailureKind::Integrity(kind) => Some(kind),
            FailureKind::Store => None,
        }
    }
}

impl From<rusqlite::Error> for MutationFailure {
    fn from(err: rusqlite::Error) -> Self {
        let kind = match &err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                FailureKind::Integrity(IntegrityKind::from_extended_code(e.extended_code))
            }
            _ => FailureKind::Store,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// A store fault that is not a constraint violation, such as a row that no
/// longer decodes into its record, rolls a mutation back as a store failure
impl From<crate::Error> for MutationFailure {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::Storage(e) => e.into(),
            crate::Error::Mutation(failure) => failure,
            other => Self {
                kind: FailureKind::Store,
                message: other.to_string(),
            },
        }
    }
}

/// Result of a mutation: applied, or rolled back with a reason
pub type MutationResult<T> = std::result::Result<T, MutationFailure>;

/// What a committed statement did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub changes: usize,
    pub last_insert_id: i64,
}

/// Single-connection gateway to the store
pub struct Gateway {
    conn: Connection,
}

impl Gateway {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let gateway = Self { conn };
        gateway.configure()?;
        debug!("Opened store at {}", path.display());
        Ok(gateway)
    }

    /// Open an empty in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let gateway = Self { conn };
        gateway.configure()?;
        Ok(gateway)
    }

    /// Open an in-memory database populated from the seed script (for testing)
    pub fn open_seeded_in_memory() -> Result<Self> {
        let gateway = Self::open_in_memory()?;
        gateway.run_batch(schema::SEED_SCRIPT)?;
        Ok(gateway)
    }

    fn configure(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    }

    /// Get raw connection (for catalog introspection)
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Get mutable raw connection (for transactions)
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Check whether every known table exists
    pub fn has_schema(&self) -> Result<bool> {
        for table in Table::all() {
            let count: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table.as_str()],
                |row| row.get(0),
            )?;
            if count == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Execute a multi-statement script and commit
    pub fn run_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        debug!("Executed SQL batch ({} bytes)", sql.len());
        Ok(())
    }

    /// Execute an `.sql` script file
    pub fn run_script(&self, path: &Path) -> Result<()> {
        let sql = std::fs::read_to_string(path)?;
        self.run_batch(&sql)?;
        debug!("Ran script {}", path.display());
        Ok(())
    }

    // ========== Reads ==========

    /// Run a read query with bound parameters
    pub fn select<P: Params>(&self, sql: &str, params: P, fetch: Fetch) -> Result<Vec<Row>> {
        Ok(select_rows(&self.conn, sql, params, fetch)?)
    }

    /// Run a read query and return the first row, if any
    pub fn select_one<P: Params>(&self, sql: &str, params: P) -> Result<Option<Row>> {
        Ok(self.select(sql, params, Fetch::One)?.into_iter().next())
    }

    // ========== Writes ==========

    /// Run an INSERT/UPDATE/DELETE as its own committed unit.
    ///
    /// Any failure rolls the statement back and is returned as a value.
    pub fn mutate<P: Params>(&self, sql: &str, params: P) -> MutationResult<Applied> {
        let tx = self.conn.unchecked_transaction()?;
        match execute(&tx, sql, params) {
            Ok(applied) => {
                tx.commit()?;
                Ok(applied)
            }
            Err(failure) => {
                warn!("Mutation rolled back: {}", failure);
                if let Err(e) = tx.rollback() {
                    warn!("Rollback failed: {}", e);
                }
                Err(failure)
            }
        }
    }

    /// Run several statements as one unit: all commit or none do
    pub fn atomic<T, F>(&mut self, f: F) -> MutationResult<T>
    where
        F: FnOnce(&Unit<'_>) -> MutationResult<T>,
    {
        let unit = Unit {
            tx: self.conn.transaction()?,
        };
        match f(&unit) {
            Ok(value) => {
                unit.tx.commit()?;
                Ok(value)
            }
            Err(failure) => {
                warn!("Unit rolled back: {}", failure);
                if let Err(e) = unit.tx.rollback() {
                    warn!("Rollback failed: {}", e);
                }
                Err(failure)
            }
        }
    }

    // ========== Stats ==========

    /// Count rows in a table
    pub fn count(&self, table: Table) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", schema::quote_ident(table.as_str()));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get per-table row counts
    pub fn stats(&self) -> Result<DbStats> {
        let mut tables = Vec::new();
        for table in Table::all() {
            tables.push((*table, self.count(*table)?));
        }
        Ok(DbStats { tables })
    }
}

/// Transaction scope handed to [`Gateway::atomic`]
pub struct Unit<'conn> {
    tx: Transaction<'conn>,
}

impl Unit<'_> {
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> MutationResult<Applied> {
        execute(&self.tx, sql, params)
    }

    pub fn select<P: Params>(&self, sql: &str, params: P, fetch: Fetch) -> MutationResult<Vec<Row>> {
        Ok(select_rows(&self.tx, sql, params, fetch)?)
    }

    pub fn select_one<P: Params>(&self, sql: &str, params: P) -> MutationResult<Option<Row>> {
        Ok(self.select(sql, params, Fetch::One)?.into_iter().next())
    }
}

fn execute<P: Params>(conn: &Connection, sql: &str, params: P) -> MutationResult<Applied> {
    let changes = conn.execute(sql, params)?;
    Ok(Applied {
        changes,
        last_insert_id: conn.last_insert_rowid(),
    })
}

fn select_rows<P: Params>(conn: &Connection, sql: &str, params: P, fetch: Fetch) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let limit = fetch.limit();

    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while out.len() < limit {
        match rows.next()? {
            Some(row) => out.push(Row::from_sql(&names, row)?),
            None => break,
        }
    }
    Ok(out)
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DbStats {
    pub tables: Vec<(Table, usize)>,
}

impl DbStats {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

impl fmt::Display for DbStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Database Statistics:")?;
        for (table, count) in &self.tables {
            writeln!(f, "  {}: {}", table, count)?;
        }
        write!(f, "  Total: {}", self.total_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;
    use rusqlite::types::Value;
    use crate::storage::TableDescriptor;

    const INSERT_CUSTOMER: &str = "INSERT INTO Customers (Customer_Firstname, Customer_Surname, Customer_Gender, \
         Customer_Email, Customer_Username, Customer_Password) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

    fn digest() -> Vec<u8> {
        crate::credentials::password_digest("securepassword").to_vec()
    }

    #[test]
    fn test_customer_round_trip_and_duplicate_username() {
        let gateway = Gateway::open_seeded_in_memory().unwrap();

        let applied = gateway
            .mutate(
                INSERT_CUSTOMER,
                params!["David", "Smith", "Female", "david.smith@example.com", "dsmith", digest()],
            )
            .unwrap();
        assert_eq!(applied.changes, 1);

        let row = gateway
            .select_one("SELECT * FROM Customers WHERE Customer_Username = ?1", ["dsmith"])
            .unwrap()
            .unwrap();
        assert_eq!(row.integer("Customer_ID").unwrap(), applied.last_insert_id);
        assert_eq!(row.text("Customer_Firstname").unwrap(), "David");
        assert_eq!(row.text("Customer_Surname").unwrap(), "Smith");
        assert_eq!(row.text("Customer_Gender").unwrap(), "Female");
        assert_eq!(row.text("Customer_Email").unwrap(), "david.smith@example.com");
        assert_eq!(row.text("Customer_Username").unwrap(), "dsmith");
        assert_eq!(row.blob("Customer_Password").unwrap(), digest());

        let failure = gateway
            .mutate(
                INSERT_CUSTOMER,
                params!["David", "Smith", "Female", "david.smith@example.com", "dsmith", digest()],
            )
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Integrity(IntegrityKind::Unique));
        assert!(failure.is_duplicate());
    }

    #[test]
    fn test_not_null_violation_commits_nothing() {
        let gateway = Gateway::open_seeded_in_memory().unwrap();
        let before = gateway.count(Table::Customers).unwrap();

        let failure = gateway
            .mutate(
                INSERT_CUSTOMER,
                params![None::<String>, "Smith", "Female", "d@example.com", "nobody", digest()],
            )
            .unwrap_err();
        assert_eq!(failure.integrity_kind(), Some(IntegrityKind::NotNull));
        assert_eq!(gateway.count(Table::Customers).unwrap(), before);
    }

    #[test]
    fn test_basket_for_missing_customer_is_foreign_key_failure() {
        let gateway = Gateway::open_seeded_in_memory().unwrap();
        let before = gateway.count(Table::CustomerBasket).unwrap();

        let failure = gateway
            .mutate(
                "INSERT INTO Customer_Basket (Customer_ID, Basket_Created_Date) VALUES (?1, ?2)",
                params![1000, "13/01/2024"],
            )
            .unwrap_err();
        assert_eq!(failure.integrity_kind(), Some(IntegrityKind::ForeignKey));
        assert_eq!(gateway.count(Table::CustomerBasket).unwrap(), before);
    }

    #[test]
    fn test_every_order_foreign_key_is_enforced() {
        let gateway = Gateway::open_seeded_in_memory().unwrap();
        let sql = "INSERT INTO Orders (Order_Date, Customer_ID, Product_ID, Shipping_ID, Billing_ID, \
                   Order_Quantity, Order_Status) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

        let cases = [
            (1000, 1, 1, 1),
            (1, 1000, 1, 1),
            (1, 1, 1000, 1),
            (1, 1, 1, 1000),
        ];
        for (customer, product, shipping, billing) in cases {
            let failure = gateway
                .mutate(sql, params!["13/01/2024", customer, product, shipping, billing, 1, "Ordered"])
                .unwrap_err();
            assert_eq!(failure.integrity_kind(), Some(IntegrityKind::ForeignKey));
        }

        gateway
            .mutate(sql, params!["13/01/2024", 1, 1, 1, 1, 1, "Delivered"])
            .unwrap();
    }

    /// Columns and values of a row that `table` accepts, copied from its
    /// first stored row with a fresh key
    fn acceptable_row(gateway: &Gateway, desc: &TableDescriptor, fresh_basket: i64) -> Vec<(String, Value)> {
        let first = gateway
            .select_one(
                &format!("SELECT * FROM {} ORDER BY rowid", schema::quote_ident(desc.table.as_str())),
                [],
            )
            .unwrap()
            .unwrap();
        let rowid_key = desc.primary_key().len() == 1;

        desc.columns
            .iter()
            .filter(|c| !(rowid_key && c.is_primary_key()))
            .map(|c| {
                let value = if c.unique {
                    Value::Text(format!("fresh {}", c.name))
                } else if desc.table == Table::BasketContents && c.name == "Basket_ID" {
                    // An empty basket keeps the composite key unused
                    Value::Integer(fresh_basket)
                } else {
                    first.get(&c.name).cloned().unwrap()
                };
                (c.name.clone(), value)
            })
            .collect()
    }

    fn insert(gateway: &Gateway, table: Table, row: &[(String, Value)]) -> MutationResult<Applied> {
        let columns: Vec<String> = row.iter().map(|(c, _)| schema::quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema::quote_ident(table.as_str()),
            columns.join(", "),
            placeholders.join(", ")
        );
        gateway.mutate(&sql, rusqlite::params_from_iter(row.iter().map(|(_, v)| v)))
    }

    #[test]
    fn test_every_not_null_column_and_foreign_key_is_enforced() {
        let gateway = Gateway::open_seeded_in_memory().unwrap();
        let fresh_basket = gateway
            .mutate(
                "INSERT INTO Customer_Basket (Customer_ID, Basket_Created_Date) VALUES (?1, ?2)",
                params![2, "13/01/2024"],
            )
            .unwrap()
            .last_insert_id;

        let mut not_null_checked = 0;
        let mut foreign_keys_checked = 0;
        for table in Table::all() {
            let desc = TableDescriptor::introspect(gateway.connection(), *table).unwrap();
            let template = acceptable_row(&gateway, &desc, fresh_basket);
            let before = gateway.count(*table).unwrap();

            let with = |column: &str, value: Value| -> Vec<(String, Value)> {
                template
                    .iter()
                    .map(|(c, v)| (c.clone(), if c == column { value.clone() } else { v.clone() }))
                    .collect()
            };

            for column in desc.columns.iter().filter(|c| c.not_null) {
                let failure = insert(&gateway, *table, &with(&column.name, Value::Null)).unwrap_err();
                assert_eq!(
                    failure.integrity_kind(),
                    Some(IntegrityKind::NotNull),
                    "{}.{}: {}",
                    table,
                    column.name,
                    failure
                );
                assert_eq!(gateway.count(*table).unwrap(), before);
                not_null_checked += 1;
            }

            for fk in &desc.foreign_keys {
                let failure = insert(&gateway, *table, &with(&fk.column, Value::Integer(1_000_000))).unwrap_err();
                assert_eq!(
                    failure.integrity_kind(),
                    Some(IntegrityKind::ForeignKey),
                    "{}.{}: {}",
                    table,
                    fk.column,
                    failure
                );
                assert_eq!(gateway.count(*table).unwrap(), before);
                foreign_keys_checked += 1;
            }

            // The untouched template is accepted, so each failure above came from its column
            insert(&gateway, *table, &template).unwrap();
            assert_eq!(gateway.count(*table).unwrap(), before + 1);
        }

        assert_eq!(not_null_checked, 47);
        assert_eq!(foreign_keys_checked, 13);
    }

    #[test]
    fn test_non_constraint_fault_is_store_failure() {
        let gateway = Gateway::open_seeded_in_memory().unwrap();
        let failure = gateway
            .mutate("INSERT INTO No_Such_Table (x) VALUES (?1)", [1])
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Store);
    }

    #[test]
    fn test_row_decode_fault_inside_unit_is_store_failure() {
        let mut gateway = Gateway::open_seeded_in_memory().unwrap();
        let before = gateway.count(Table::Category).unwrap();
        let failure = gateway
            .atomic(|unit| {
                unit.execute("INSERT INTO Category (Category_Name) VALUES (?1)", ["Cables"])?;
                let row = unit.select_one("SELECT Category_Name FROM Category WHERE Category_ID = 1", [])?;
                Ok(row.map(|r| r.integer("Category_Name")).transpose()?)
            })
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Store);
        assert!(failure.message.contains("Category_Name"));
        assert_eq!(gateway.count(Table::Category).unwrap(), before);
    }

    #[test]
    fn test_fetch_modes() {
        let gateway = Gateway::open_seeded_in_memory().unwrap();
        let sql = "SELECT * FROM Products ORDER BY Product_ID";

        let all = gateway.select(sql, [], Fetch::All).unwrap();
        assert_eq!(all.len(), gateway.count(Table::Products).unwrap());

        let some = gateway.select(sql, [], Fetch::Many(2)).unwrap();
        assert_eq!(some.len(), 2);
        assert_eq!(some[0], all[0]);

        let one = gateway.select(sql, [], Fetch::One).unwrap();
        assert_eq!(one.len(), 1);

        let none = gateway
            .select_one("SELECT * FROM Products WHERE Product_ID = ?1", [9999])
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_rows_are_keyed_by_name() {
        let gateway = Gateway::open_seeded_in_memory().unwrap();
        let a = gateway
            .select_one("SELECT Category_ID, Category_Name FROM Category WHERE Category_ID = 1", [])
            .unwrap()
            .unwrap();
        let b = gateway
            .select_one("SELECT Category_Name, Category_ID FROM Category WHERE Category_ID = 1", [])
            .unwrap()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get("Category_ID"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_atomic_rolls_back_every_statement() {
        let mut gateway = Gateway::open_seeded_in_memory().unwrap();
        let before = gateway.count(Table::Category).unwrap();

        let result: MutationResult<()> = gateway.atomic(|unit| {
            unit.execute("INSERT INTO Category (Category_Name) VALUES (?1)", ["Printer"])?;
            unit.execute("INSERT INTO Category (Category_Name) VALUES (?1)", ["Printer"])?;
            Ok(())
        });
        assert!(result.unwrap_err().is_duplicate());
        assert_eq!(gateway.count(Table::Category).unwrap(), before);

        gateway
            .atomic(|unit| {
                unit.execute("INSERT INTO Category (Category_Name) VALUES (?1)", ["Printer"])?;
                unit.execute("INSERT INTO Category (Category_Name) VALUES (?1)", ["Scanner"])
            })
            .unwrap();
        assert_eq!(gateway.count(Table::Category).unwrap(), before + 2);
    }

    #[test]
    fn test_has_schema() {
        assert!(!Gateway::open_in_memory().unwrap().has_schema().unwrap());
        assert!(Gateway::open_seeded_in_memory().unwrap().has_schema().unwrap());
    }
}
