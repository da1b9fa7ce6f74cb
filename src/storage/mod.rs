//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with ten tables:
//! - Customers, Category, Suppliers, Products
//! - Shipping, Billing, Orders
//! - Customer_Basket, Basket_Contents, Reviews
//!
//! All statements go through [`Gateway`]; rows come back as name-keyed [`Row`]s.

pub mod schema;
pub mod gateway;
pub mod row;
pub mod introspect;

pub use schema::{Table, SEED_SCRIPT};
pub use gateway::{Gateway, Fetch, Applied, Unit, DbStats, MutationFailure, FailureKind, IntegrityKind, MutationResult};
pub use row::Row;
pub use introspect::{ColumnDescriptor, ForeignKeyDescriptor, TableDescriptor};
