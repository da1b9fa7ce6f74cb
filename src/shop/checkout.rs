//! Checkout and order history

use chrono::{Days, NaiveDate};
use rusqlite::params;
use serde::Serialize;
use tracing::info;

use super::records::{self, BasketItem, Order, OrderStatus};
use super::{Shop, format_date, rejected, today};
use crate::Result;
use crate::storage::{Applied, Fetch, MutationResult, Unit};

/// Days between ordering and the promised delivery
pub const DELIVERY_DAYS: u64 = 3;

#[derive(Debug, Clone)]
pub struct ShippingDetails {
    pub street_number: i64,
    pub street: String,
    pub postcode: String,
}

#[derive(Debug, Clone)]
pub struct BillingDetails {
    pub street_number: i64,
    pub street: String,
    pub postcode: String,
    pub card_number: String,
    pub card_expiry: String,
    pub name_on_card: String,
    pub cvc: String,
}

/// What a successful checkout created
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub shipping_id: i64,
    pub billing_id: i64,
    pub order_ids: Vec<i64>,
    pub delivery_date: String,
}

impl Shop {
    /// Turn the basket into orders dated today
    pub fn checkout(
        &mut self,
        customer_id: i64,
        basket_id: i64,
        shipping: &ShippingDetails,
        billing: &BillingDetails,
    ) -> MutationResult<Receipt> {
        self.checkout_on(today(), customer_id, basket_id, shipping, billing)
    }

    /// Checkout with an explicit order date.
    ///
    /// Shipping, billing, orders, stock and the basket change together or
    /// not at all.
    pub fn checkout_on(
        &mut self,
        date: NaiveDate,
        customer_id: i64,
        basket_id: i64,
        shipping: &ShippingDetails,
        billing: &BillingDetails,
    ) -> MutationResult<Receipt> {
        let order_date = format_date(date);
        let delivery_date = date
            .checked_add_days(Days::new(DELIVERY_DAYS))
            .map(format_date)
            .ok_or_else(|| rejected("delivery date out of range"))?;

        let receipt = self.gateway.atomic(|unit| {
            ensure_owner(unit, customer_id, basket_id)?;
            let items = items_in(unit, basket_id)?;
            if items.is_empty() {
                return Err(rejected(format!("basket {} is empty", basket_id)));
            }

            let shipping_id = unit
                .execute(
                    "INSERT INTO Shipping (Customer_ID, Shipping_Address_Street_Number,
                         Shipping_Address_Street, Shipping_Address_Postcode, Delivery_Date)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![customer_id, shipping.street_number, shipping.street, shipping.postcode, delivery_date],
                )?
                .last_insert_id;

            let billing_id = unit
                .execute(
                    "INSERT INTO Billing (Customer_ID, Billing_Address_Street_Number,
                         Billing_Address_Street, Billing_Address_Postcode, Card_Number,
                         Card_Expiry, Name_on_Card, CVC)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        customer_id,
                        billing.street_number,
                        billing.street,
                        billing.postcode,
                        billing.card_number,
                        billing.card_expiry,
                        billing.name_on_card,
                        billing.cvc,
                    ],
                )?
                .last_insert_id;

            let mut order_ids = Vec::with_capacity(items.len());
            for item in &items {
                let taken = unit.execute(
                    "UPDATE Products SET Stock_Level = Stock_Level - ?1
                     WHERE Product_ID = ?2 AND Stock_Level >= ?1",
                    params![item.quantity, item.product_id],
                )?;
                if taken.changes == 0 {
                    return Err(rejected(format!("not enough stock of {}", item.name)));
                }

                let order = unit.execute(
                    "INSERT INTO Orders (Order_Date, Customer_ID, Product_ID, Shipping_ID,
                         Billing_ID, Order_Quantity, Order_Status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        order_date,
                        customer_id,
                        item.product_id,
                        shipping_id,
                        billing_id,
                        item.quantity,
                        OrderStatus::Ordered.as_str(),
                    ],
                )?;
                order_ids.push(order.last_insert_id);
            }

            unit.execute("DELETE FROM Basket_Contents WHERE Basket_ID = ?1", [basket_id])?;

            Ok(Receipt {
                shipping_id,
                billing_id,
                order_ids,
                delivery_date: delivery_date.clone(),
            })
        })?;

        info!(
            "Customer {} checked out {} orders, delivery {}",
            customer_id,
            receipt.order_ids.len(),
            receipt.delivery_date
        );
        Ok(receipt)
    }

    /// A customer's orders, newest first
    pub fn orders_for(&self, customer_id: i64) -> Result<Vec<Order>> {
        let rows = self.gateway.select(
            "SELECT * FROM Orders WHERE Customer_ID = ?1 ORDER BY Order_ID DESC",
            [customer_id],
            Fetch::All,
        )?;
        records::collect(&rows)
    }

    pub fn order(&self, id: i64) -> Result<Option<Order>> {
        self.gateway
            .select_one("SELECT * FROM Orders WHERE Order_ID = ?1", [id])?
            .as_ref()
            .map(Order::try_from)
            .transpose()
    }

    pub fn set_order_status(&self, id: i64, status: OrderStatus) -> MutationResult<Applied> {
        self.gateway.mutate(
            "UPDATE Orders SET Order_Status = ?1 WHERE Order_ID = ?2",
            params![status.as_str(), id],
        )
    }
}

fn items_in(unit: &Unit<'_>, basket_id: i64) -> MutationResult<Vec<BasketItem>> {
    let rows = unit.select(
        "SELECT bc.Product_ID, p.Product_Name, p.Price, bc.Quantity
         FROM Basket_Contents AS bc
         JOIN Products AS p ON bc.Product_ID = p.Product_ID
         WHERE bc.Basket_ID = ?1
         ORDER BY bc.Product_ID",
        [basket_id],
        Fetch::All,
    )?;
    Ok(records::collect(&rows)?)
}

/// Reject a basket that does not exist or belongs to someone else
fn ensure_owner(unit: &Unit<'_>, customer_id: i64, basket_id: i64) -> MutationResult<()> {
    let row = unit
        .select_one("SELECT Customer_ID FROM Customer_Basket WHERE Basket_ID = ?1", [basket_id])?
        .ok_or_else(|| rejected(format!("no basket with id {}", basket_id)))?;
    if row.integer("Customer_ID")? != customer_id {
        return Err(rejected(format!(
            "basket {} does not belong to customer {}",
            basket_id, customer_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shop::seeded;
    use crate::storage::{IntegrityKind, Table};

    fn shipping() -> ShippingDetails {
        ShippingDetails {
            street_number: 7,
            street: "Elm Row".into(),
            postcode: "EH7 4AA".into(),
        }
    }

    fn billing() -> BillingDetails {
        BillingDetails {
            street_number: 7,
            street: "Elm Row".into(),
            postcode: "EH7 4AA".into(),
            card_number: "4111 1111 1111 1111".into(),
            card_expiry: "Jan-27".into(),
            name_on_card: "J Doe".into(),
            cvc: "321".into(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 30).unwrap()
    }

    #[test]
    fn test_checkout_creates_orders_and_empties_basket() {
        let mut shop = seeded();
        let receipt = shop.checkout_on(date(), 1, 1, &shipping(), &billing()).unwrap();

        assert_eq!(receipt.delivery_date, "02/02/2024");
        assert_eq!(receipt.order_ids.len(), 2);
        assert!(shop.basket_items(1).unwrap().is_empty());

        // Ultrabook 20 - 1, Games Console 35 - 2
        assert_eq!(shop.product(2).unwrap().unwrap().stock_level, 19);
        assert_eq!(shop.product(3).unwrap().unwrap().stock_level, 33);

        let order = shop.order(receipt.order_ids[1]).unwrap().unwrap();
        assert_eq!(order.date, "30/01/2024");
        assert_eq!(order.status, OrderStatus::Ordered);
        assert_eq!(order.shipping_id, receipt.shipping_id);
        assert_eq!(order.billing_id, receipt.billing_id);
        assert_eq!(order.quantity, 2);

        let orders = shop.orders_for(1).unwrap();
        assert_eq!(orders.len(), 4);
        assert_eq!(orders[0].id, receipt.order_ids[1]);
    }

    #[test]
    fn test_insufficient_stock_rolls_everything_back() {
        let mut shop = seeded();
        shop.gateway()
            .mutate("UPDATE Products SET Stock_Level = 1 WHERE Product_ID = 3", [])
            .unwrap();
        let counts = |shop: &Shop| {
            [Table::Shipping, Table::Billing, Table::Orders, Table::BasketContents]
                .map(|t| shop.gateway().count(t).unwrap())
        };
        let before = counts(&shop);

        let failure = shop.checkout_on(date(), 1, 1, &shipping(), &billing()).unwrap_err();
        assert_eq!(failure.integrity_kind(), Some(IntegrityKind::Check));
        assert_eq!(counts(&shop), before);
        assert_eq!(shop.product(2).unwrap().unwrap().stock_level, 20);
    }

    #[test]
    fn test_empty_basket_is_rejected() {
        let mut shop = seeded();
        assert!(shop.checkout_on(date(), 2, 2, &shipping(), &billing()).is_err());
        assert_eq!(shop.gateway().count(Table::Shipping).unwrap(), 1);
    }

    #[test]
    fn test_checkout_of_another_customers_basket_is_rejected() {
        let mut shop = seeded();
        let counts = |shop: &Shop| {
            [Table::Shipping, Table::Billing, Table::Orders, Table::BasketContents]
                .map(|t| shop.gateway().count(t).unwrap())
        };
        let before = counts(&shop);

        // Basket 1 belongs to customer 1
        let failure = shop.checkout_on(date(), 2, 1, &shipping(), &billing()).unwrap_err();
        assert_eq!(failure.integrity_kind(), Some(IntegrityKind::Check));
        assert_eq!(counts(&shop), before);
        assert_eq!(shop.basket_items(1).unwrap().len(), 2);
        assert_eq!(shop.product(2).unwrap().unwrap().stock_level, 20);

        assert!(shop.checkout_on(date(), 1, 999, &shipping(), &billing()).is_err());
        assert_eq!(counts(&shop), before);
    }

    #[test]
    fn test_set_order_status() {
        let shop = seeded();
        shop.set_order_status(2, OrderStatus::OutForDelivery).unwrap();
        let order = shop.order(2).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::OutForDelivery);
        assert_eq!(order.status.stage(), 2);
    }
}
