//! Shopping baskets

use rusqlite::params;
use tracing::debug;

use super::records::{self, Basket, BasketItem};
use super::{Shop, format_date, rejected, today};
use crate::Result;
use crate::storage::{Applied, Fetch, MutationResult, Unit};

const SELECT_BASKET: &str = "SELECT * FROM Customer_Basket WHERE Customer_ID = ?1 ORDER BY Basket_ID LIMIT 1";

impl Shop {
    /// Fetch the customer's basket, creating it on first use
    pub fn basket_for(&mut self, customer_id: i64) -> MutationResult<Basket> {
        let created = format_date(today());
        self.gateway.atomic(|unit| {
            if let Some(row) = unit.select_one(SELECT_BASKET, [customer_id])? {
                return Ok(Basket::try_from(&row)?);
            }
            unit.execute(
                "INSERT INTO Customer_Basket (Customer_ID, Basket_Created_Date) VALUES (?1, ?2)",
                params![customer_id, created],
            )?;
            let row = unit
                .select_one(SELECT_BASKET, [customer_id])?
                .ok_or_else(|| rejected("basket vanished after insert"))?;
            debug!("Created basket for customer {}", customer_id);
            Ok(Basket::try_from(&row)?)
        })
    }

    /// Add `quantity` of a product, on top of any already in the basket
    pub fn add_to_basket(&mut self, basket_id: i64, product_id: i64, quantity: i64) -> MutationResult<()> {
        if quantity <= 0 {
            return Err(rejected(format!("quantity must be positive, got {}", quantity)));
        }
        self.gateway.atomic(|unit| {
            let current = quantity_in_basket(unit, basket_id, product_id)?;
            let wanted = current
                .checked_add(quantity)
                .ok_or_else(|| rejected(format!("quantity {} on top of {} is out of range", quantity, current)))?;
            ensure_stock(unit, product_id, wanted)?;
            unit.execute(
                "INSERT INTO Basket_Contents (Basket_ID, Product_ID, Quantity) VALUES (?1, ?2, ?3)
                 ON CONFLICT (Basket_ID, Product_ID) DO UPDATE SET Quantity = excluded.Quantity",
                params![basket_id, product_id, wanted],
            )?;
            Ok(())
        })
    }

    /// Set the quantity of a basket line; zero removes it
    pub fn update_basket_item(&mut self, basket_id: i64, product_id: i64, quantity: i64) -> MutationResult<Applied> {
        if quantity < 0 {
            return Err(rejected(format!("quantity cannot be negative, got {}", quantity)));
        }
        if quantity == 0 {
            return self.remove_basket_item(basket_id, product_id);
        }
        self.gateway.atomic(|unit| {
            ensure_stock(unit, product_id, quantity)?;
            unit.execute(
                "UPDATE Basket_Contents SET Quantity = ?1 WHERE Basket_ID = ?2 AND Product_ID = ?3",
                params![quantity, basket_id, product_id],
            )
        })
    }

    pub fn remove_basket_item(&self, basket_id: i64, product_id: i64) -> MutationResult<Applied> {
        self.gateway.mutate(
            "DELETE FROM Basket_Contents WHERE Basket_ID = ?1 AND Product_ID = ?2",
            params![basket_id, product_id],
        )
    }

    pub fn basket_items(&self, basket_id: i64) -> Result<Vec<BasketItem>> {
        let rows = self.gateway.select(
            "SELECT bc.Product_ID, p.Product_Name, p.Price, bc.Quantity
             FROM Basket_Contents AS bc
             JOIN Products AS p ON bc.Product_ID = p.Product_ID
             WHERE bc.Basket_ID = ?1
             ORDER BY p.Product_Name",
            [basket_id],
            Fetch::All,
        )?;
        records::collect(&rows)
    }

    /// Total price of everything in the basket
    pub fn basket_value(&self, basket_id: i64) -> Result<f64> {
        let row = self.gateway.select_one(
            "SELECT COALESCE(SUM(p.Price * bc.Quantity), 0.0) AS Total
             FROM Basket_Contents AS bc
             JOIN Products AS p ON bc.Product_ID = p.Product_ID
             WHERE bc.Basket_ID = ?1",
            [basket_id],
        )?;
        match row {
            Some(row) => row.real("Total"),
            None => Ok(0.0),
        }
    }

    pub fn clear_basket(&self, basket_id: i64) -> MutationResult<Applied> {
        self.gateway
            .mutate("DELETE FROM Basket_Contents WHERE Basket_ID = ?1", [basket_id])
    }
}

fn quantity_in_basket(unit: &Unit<'_>, basket_id: i64, product_id: i64) -> MutationResult<i64> {
    let row = unit.select_one(
        "SELECT Quantity FROM Basket_Contents WHERE Basket_ID = ?1 AND Product_ID = ?2",
        params![basket_id, product_id],
    )?;
    match row {
        Some(row) => Ok(row.integer("Quantity")?),
        None => Ok(0),
    }
}

/// Reject when the product cannot cover `wanted` units
pub(crate) fn ensure_stock(unit: &Unit<'_>, product_id: i64, wanted: i64) -> MutationResult<()> {
    let row = unit
        .select_one(
            "SELECT Product_Name, Stock_Level FROM Products WHERE Product_ID = ?1",
            [product_id],
        )?
        .ok_or_else(|| rejected(format!("no product with id {}", product_id)))?;
    let stock = row.integer("Stock_Level")?;
    if wanted > stock {
        let name = row.text("Product_Name")?;
        return Err(rejected(format!(
            "not enough stock of {}: {} requested, {} available",
            name, wanted, stock
        )));
    }
    Ok(())
}
