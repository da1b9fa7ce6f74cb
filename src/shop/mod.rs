//! Shop operations over the gateway
//!
//! Everything a front end needs: catalog search, accounts, basket handling,
//! checkout and reviews. Reads return [`crate::Result`]; writes return a
//! [`MutationResult`](crate::storage::MutationResult) so callers can react to
//! constraint violations (e.g. a taken username) by kind.

pub mod records;
pub mod catalog;
pub mod accounts;
pub mod basket;
pub mod checkout;
pub mod reviews;

use chrono::NaiveDate;

use crate::storage::{Gateway, IntegrityKind, MutationFailure};

pub use accounts::{CustomerUpdate, LoginOutcome, NewCustomer};
pub use catalog::{ProductFilter, SortKey, SortOrder};
pub use checkout::{BillingDetails, Receipt, ShippingDetails};
pub use records::{
    Basket, BasketItem, BestSeller, Category, Customer, Order, OrderStatus, Product, Review, Supplier,
};

/// Date format used in every date column
pub const DATE_FORMAT: &str = "%d/%m/%Y";

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// A business rule rejected the change before it reached the store
pub(crate) fn rejected(message: impl Into<String>) -> MutationFailure {
    MutationFailure::integrity(IntegrityKind::Check, message)
}

/// The storefront: owns the gateway for the process lifetime
pub struct Shop {
    gateway: Gateway,
}

impl Shop {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut Gateway {
        &mut self.gateway
    }
}

#[cfg(test)]
pub(crate) fn seeded() -> Shop {
    Shop::new(Gateway::open_seeded_in_memory().unwrap())
}
