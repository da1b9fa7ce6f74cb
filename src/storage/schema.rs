//! Database schema definitions

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Seed script that drops, recreates and populates every table
pub const SEED_SCRIPT: &str = include_str!("../../sql/create_database.sql");

/// The tables the store knows about.
///
/// Table names are identifiers and cannot be bound as parameters, so every
/// statement that names a table dynamically goes through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Customers,
    Category,
    Suppliers,
    Products,
    Shipping,
    Billing,
    Orders,
    CustomerBasket,
    BasketContents,
    Reviews,
}

impl Table {
    /// Get the SQL name of the table
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Customers => "Customers",
            Table::Category => "Category",
            Table::Suppliers => "Suppliers",
            Table::Products => "Products",
            Table::Shipping => "Shipping",
            Table::Billing => "Billing",
            Table::Orders => "Orders",
            Table::CustomerBasket => "Customer_Basket",
            Table::BasketContents => "Basket_Contents",
            Table::Reviews => "Reviews",
        }
    }

    /// All tables, parents before children
    pub fn all() -> &'static [Table] {
        &[
            Table::Customers,
            Table::Category,
            Table::Suppliers,
            Table::Products,
            Table::Shipping,
            Table::Billing,
            Table::Orders,
            Table::CustomerBasket,
            Table::BasketContents,
            Table::Reviews,
        ]
    }

    /// All tables, children before parents
    pub fn drop_order() -> impl Iterator<Item = Table> {
        Self::all().iter().rev().copied()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Table::all()
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownTable(s.to_string()))
    }
}

/// Quote an identifier for use in generated SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_round_trips_through_name() {
        for table in Table::all() {
            assert_eq!(table.as_str().parse::<Table>().unwrap(), *table);
        }
        assert_eq!("customer_basket".parse::<Table>().unwrap(), Table::CustomerBasket);
    }

    #[test]
    fn test_unknown_table_rejected() {
        let err = "sqlite_master; DROP TABLE Customers".parse::<Table>().unwrap_err();
        assert!(matches!(err, Error::UnknownTable(_)));
    }

    #[test]
    fn test_drop_order_is_reverse() {
        let dropped: Vec<Table> = Table::drop_order().collect();
        assert_eq!(dropped.first(), Some(&Table::Reviews));
        assert_eq!(dropped.last(), Some(&Table::Customers));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
