//! Product catalog: search, categories, suppliers, best sellers, images

use std::path::Path;
use std::str::FromStr;

use rusqlite::params;
use tracing::{debug, info};

use super::Shop;
use super::records::{self, BestSeller, Category, Product, Supplier};
use crate::storage::Fetch;
use crate::{Error, Result};

/// Logical sort keys for product listings.
///
/// ORDER BY cannot take bound parameters, so each key maps to a fixed column
/// expression instead of anything user-supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    Category,
    Price,
}

impl SortKey {
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::Name => "p.Product_Name",
            SortKey::Category => "c.Category_Name",
            SortKey::Price => "p.Price",
        }
    }
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "category" => Ok(SortKey::Category),
            "price" => Ok(SortKey::Price),
            other => Err(Error::InvalidArgument(format!("unknown sort key: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    /// Anything other than `asc` sorts descending
    fn from_str(s: &str) -> Result<Self> {
        Ok(if s.eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        })
    }
}

/// Product search criteria
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFilter {
    /// Substring of the product name
    pub name: String,
    /// Substring of the category name
    pub category: String,
    pub min_price: f64,
    pub max_price: f64,
    pub sort_by: SortKey,
    pub order: SortOrder,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            name: String::new(),
            category: String::new(),
            min_price: 0.0,
            max_price: 5000.0,
            sort_by: SortKey::default(),
            order: SortOrder::default(),
        }
    }
}

impl Shop {
    /// Search products with filter values bound as parameters
    pub fn search_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let sql = format!(
            "SELECT p.*, c.Category_Name FROM Products AS p
             INNER JOIN Category AS c ON p.Category_ID = c.Category_ID
             WHERE p.Product_Name LIKE ?1
               AND c.Category_Name LIKE ?2
               AND p.Price >= ?3
               AND p.Price <= ?4
             ORDER BY {} {}",
            filter.sort_by.column(),
            filter.order.as_sql()
        );
        let rows = self.gateway.select(
            &sql,
            params![
                format!("%{}%", filter.name),
                format!("%{}%", filter.category),
                filter.min_price,
                filter.max_price,
            ],
            Fetch::All,
        )?;
        debug!("Product search matched {} rows", rows.len());
        records::collect(&rows)
    }

    pub fn product(&self, id: i64) -> Result<Option<Product>> {
        self.gateway
            .select_one(
                "SELECT p.*, c.Category_Name FROM Products AS p
                 INNER JOIN Category AS c ON p.Category_ID = c.Category_ID
                 WHERE p.Product_ID = ?1",
                [id],
            )?
            .as_ref()
            .map(Product::try_from)
            .transpose()
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        let rows = self
            .gateway
            .select("SELECT * FROM Category ORDER BY Category_Name", [], Fetch::All)?;
        records::collect(&rows)
    }

    pub fn category(&self, id: i64) -> Result<Option<Category>> {
        self.gateway
            .select_one("SELECT * FROM Category WHERE Category_ID = ?1", [id])?
            .as_ref()
            .map(Category::try_from)
            .transpose()
    }

    pub fn supplier(&self, id: i64) -> Result<Option<Supplier>> {
        self.gateway
            .select_one("SELECT * FROM Suppliers WHERE Supplier_ID = ?1", [id])?
            .as_ref()
            .map(Supplier::try_from)
            .transpose()
    }

    /// Products ranked by total quantity ordered
    pub fn best_sellers(&self, limit: usize) -> Result<Vec<BestSeller>> {
        let rows = self.gateway.select(
            "SELECT p.Product_ID, p.Product_Name, p.Price, SUM(o.Order_Quantity) AS Total_Ordered
             FROM Orders AS o
             JOIN Products AS p ON o.Product_ID = p.Product_ID
             GROUP BY p.Product_ID
             HAVING Total_Ordered > 0
             ORDER BY Total_Ordered DESC, p.Product_Name ASC",
            [],
            Fetch::Many(limit),
        )?;
        records::collect(&rows)
    }

    /// Store an image file on the product named like the file stem.
    ///
    /// Returns false when no product has that name.
    pub fn attach_image(&self, path: &Path) -> Result<bool> {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            return Ok(false);
        };
        let bytes = std::fs::read(path)?;
        let applied = self.gateway.mutate(
            "UPDATE Products SET Product_Image = ?1 WHERE Product_Name = ?2",
            params![bytes, name],
        )?;
        debug!("Image {} matched {} products", path.display(), applied.changes);
        Ok(applied.changes > 0)
    }

    /// Attach every image in a directory; returns how many matched a product
    pub fn load_images(&self, dir: &Path) -> Result<usize> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        entries.sort();

        let mut matched = 0;
        for path in entries {
            if self.attach_image(&path)? {
                matched += 1;
            }
        }
        info!("Loaded {} product images from {}", matched, dir.display());
        Ok(matched)
    }
}
