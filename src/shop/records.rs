//! Typed records built from name-keyed rows

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::storage::Row;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub id: i64,
    pub firstname: String,
    pub surname: String,
    pub gender: String,
    pub email: String,
    pub username: String,
    #[serde(skip)]
    pub password_digest: Vec<u8>,
}

impl TryFrom<&Row> for Customer {
    type Error = Error;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.integer("Customer_ID")?,
            firstname: row.text("Customer_Firstname")?,
            surname: row.text("Customer_Surname")?,
            gender: row.text("Customer_Gender")?,
            email: row.text("Customer_Email")?,
            username: row.text("Customer_Username")?,
            password_digest: row.blob("Customer_Password")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

impl TryFrom<&Row> for Category {
    type Error = Error;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.integer("Category_ID")?,
            name: row.text("Category_Name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub hq_street_number: i64,
    pub hq_street: String,
    pub hq_postcode: String,
}

impl TryFrom<&Row> for Supplier {
    type Error = Error;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.integer("Supplier_ID")?,
            name: row.text("Supplier_Name")?,
            email: row.text("Supplier_Email")?,
            phone: row.text("Supplier_Phone")?,
            hq_street_number: row.integer("Supplier_HQ_Street_Number")?,
            hq_street: row.text("Supplier_HQ_Street")?,
            hq_postcode: row.text("Supplier_HQ_Postcode")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category_id: i64,
    /// Present when the query joined the category
    pub category_name: Option<String>,
    pub price: f64,
    pub stock_level: i64,
    pub supplier_id: i64,
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
}

impl TryFrom<&Row> for Product {
    type Error = Error;

    fn try_from(row: &Row) -> Result<Self> {
        let category_name = match row.get("Category_Name") {
            Some(_) => Some(row.text("Category_Name")?),
            None => None,
        };
        Ok(Self {
            id: row.integer("Product_ID")?,
            name: row.text("Product_Name")?,
            category_id: row.integer("Category_ID")?,
            category_name,
            price: row.real("Price")?,
            stock_level: row.integer("Stock_Level")?,
            supplier_id: row.integer("Supplier_ID")?,
            image: match row.get("Product_Image") {
                Some(_) => row.opt_blob("Product_Image")?,
                None => None,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestSeller {
    pub product_id: i64,
    pub name: String,
    pub price: f64,
    pub total_ordered: i64,
}

impl TryFrom<&Row> for BestSeller {
    type Error = Error;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(Self {
            product_id: row.integer("Product_ID")?,
            name: row.text("Product_Name")?,
            price: row.real("Price")?,
            total_ordered: row.integer("Total_Ordered")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Basket {
    pub id: i64,
    pub customer_id: i64,
    pub created: String,
}

impl TryFrom<&Row> for Basket {
    type Error = Error;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.integer("Basket_ID")?,
            customer_id: row.integer("Customer_ID")?,
            created: row.text("Basket_Created_Date")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasketItem {
    pub product_id: i64,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
}

impl BasketItem {
    pub fn line_total(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

impl TryFrom<&Row> for BasketItem {
    type Error = Error;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(Self {
            product_id: row.integer("Product_ID")?,
            name: row.text("Product_Name")?,
            price: row.real("Price")?,
            quantity: row.integer("Quantity")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub id: i64,
    pub customer_id: i64,
    pub product_id: i64,
    pub author: String,
    pub stars: i64,
    pub comment: Option<String>,
    pub date: String,
}

impl TryFrom<&Row> for Review {
    type Error = Error;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.integer("Review_ID")?,
            customer_id: row.integer("Customer_ID")?,
            product_id: row.integer("Product_ID")?,
            author: row.text("Customer_Username")?,
            stars: row.integer("Review_Stars")?,
            comment: row.opt_text("Review_Comment")?,
            date: row.text("Review_Date")?,
        })
    }
}

/// Delivery stage of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum OrderStatus {
    Ordered,
    Dispatched,
    OutForDelivery,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Ordered => "Ordered",
            OrderStatus::Dispatched => "Dispatched",
            OrderStatus::OutForDelivery => "Out for delivery",
            OrderStatus::Delivered => "Delivered",
        }
    }

    pub fn all() -> &'static [OrderStatus] {
        &[
            OrderStatus::Ordered,
            OrderStatus::Dispatched,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ]
    }

    /// Zero-based position on the delivery timeline
    pub fn stage(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OrderStatus::all()
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown order status: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: i64,
    pub date: String,
    pub customer_id: i64,
    pub product_id: i64,
    pub shipping_id: i64,
    pub billing_id: i64,
    pub quantity: i64,
    pub status: OrderStatus,
}

impl TryFrom<&Row> for Order {
    type Error = Error;

    fn try_from(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.integer("Order_ID")?,
            date: row.text("Order_Date")?,
            customer_id: row.integer("Customer_ID")?,
            product_id: row.integer("Product_ID")?,
            shipping_id: row.integer("Shipping_ID")?,
            billing_id: row.integer("Billing_ID")?,
            quantity: row.integer("Order_Quantity")?,
            status: row.text("Order_Status")?.parse()?,
        })
    }
}

/// Convert every row into a record
pub(crate) fn collect<T>(rows: &[Row]) -> Result<Vec<T>>
where
    T: for<'r> TryFrom<&'r Row, Error = Error>,
{
    rows.iter().map(|row| T::try_from(row)).collect()
}
