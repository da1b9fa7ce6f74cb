//! Product reviews

use std::ops::RangeInclusive;

use rusqlite::params;

use super::records::{self, Review};
use super::{Shop, format_date, rejected, today};
use crate::Result;
use crate::storage::{Fetch, MutationResult};

pub const STAR_RANGE: RangeInclusive<i64> = 1..=5;

impl Shop {
    /// Post a review dated today; returns the review id
    pub fn add_review(
        &self,
        customer_id: i64,
        product_id: i64,
        stars: i64,
        comment: Option<&str>,
    ) -> MutationResult<i64> {
        if !STAR_RANGE.contains(&stars) {
            return Err(rejected(format!("stars must be between 1 and 5, got {}", stars)));
        }
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        let applied = self.gateway.mutate(
            "INSERT INTO Reviews (Customer_ID, Product_ID, Review_Stars, Review_Comment, Review_Date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![customer_id, product_id, stars, comment, format_date(today())],
        )?;
        Ok(applied.last_insert_id)
    }

    /// Reviews of a product with their author's username, newest first
    pub fn reviews_for(&self, product_id: i64) -> Result<Vec<Review>> {
        let rows = self.gateway.select(
            "SELECT r.*, c.Customer_Username FROM Reviews AS r
             JOIN Customers AS c ON r.Customer_ID = c.Customer_ID
             WHERE r.Product_ID = ?1
             ORDER BY r.Review_ID DESC",
            [product_id],
            Fetch::All,
        )?;
        records::collect(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shop::seeded;
    use crate::storage::IntegrityKind;

    #[test]
    fn test_seeded_review() {
        let shop = seeded();
        let reviews = shop.reviews_for(1).unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].author, "jdoe");
        assert_eq!(reviews[0].stars, 5);
        assert_eq!(reviews[0].comment.as_deref(), Some("Excellent product!"));
    }

    #[test]
    fn test_add_review() {
        let shop = seeded();
        let id = shop.add_review(2, 1, 3, Some("  ")).unwrap();
        let reviews = shop.reviews_for(1).unwrap();
        assert_eq!(reviews[0].id, id);
        assert_eq!(reviews[0].author, "jroe");
        assert_eq!(reviews[0].comment, None);
    }

    #[test]
    fn test_review_rules() {
        let shop = seeded();
        let failure = shop.add_review(1, 1, 6, None).unwrap_err();
        assert_eq!(failure.integrity_kind(), Some(IntegrityKind::Check));
        assert!(shop.add_review(1, 1, 0, None).is_err());

        let failure = shop.add_review(1, 999, 4, None).unwrap_err();
        assert_eq!(failure.integrity_kind(), Some(IntegrityKind::ForeignKey));
        assert_eq!(shop.reviews_for(999).unwrap(), Vec::new());
    }
}
