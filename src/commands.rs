use std::path::Path;
use std::time::Instant;

use indicatif::HumanDuration;
use serde::Serialize;
use storefront::config::{self, ResolvedPaths, StorefrontConfig};
use storefront::shop::{LoginOutcome, NewCustomer, ProductFilter};
use storefront::storage::SEED_SCRIPT;
use storefront::ui::{self, Icons, Spinner};
use storefront::{Archiver, ExportOptions, Shop};
use tabled::Tabled;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_format(format: &str) -> anyhow::Result<Self> {
        match format {
            "text" => Ok(OutputMode::Human),
            "json" => Ok(OutputMode::Json),
            other => anyhow::bail!("unknown output format '{}' (expected text or json)", other),
        }
    }

    pub fn is_human(&self) -> bool {
        *self == OutputMode::Human
    }
}

pub fn emit_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Write `storefront.toml` with the effective paths unless one already exists
pub fn write_default_config(
    path: &Path,
    current: &StorefrontConfig,
    paths: &ResolvedPaths,
    force: bool,
) -> anyhow::Result<()> {
    if path.exists() && !force {
        ui::info("Config", &format!("keeping existing {}", path.display()));
        return Ok(());
    }
    let config = StorefrontConfig {
        database: Some(paths.database.display().to_string()),
        schema_script: current.schema_script.clone(),
        assets_dir: Some(paths.assets_dir.display().to_string()),
        backup_path: Some(paths.backup_path.display().to_string()),
        lock_file: Some(paths.lock_file.display().to_string()),
    };
    config::write_config(path, &config, force)?;
    ui::success(&format!("Wrote {}", path.display()));
    Ok(())
}

/// Recreate the schema and seed data, then attach product images
pub fn seed_store(shop: &Shop, paths: &ResolvedPaths) -> anyhow::Result<()> {
    ui::status(Icons::DATABASE, "Database", &paths.database.display().to_string());
    match &paths.schema_script {
        Some(script) => shop.gateway().run_script(script)?,
        None => shop.gateway().run_batch(SEED_SCRIPT)?,
    }

    if paths.assets_dir.is_dir() {
        let loaded = shop.load_images(&paths.assets_dir)?;
        ui::status(Icons::IMAGE, "Images", &loaded.to_string());
    } else {
        tracing::debug!("No assets directory at {}", paths.assets_dir.display());
    }
    ui::success("Store seeded");
    Ok(())
}

#[derive(Tabled)]
struct ProductRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Product")]
    name: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Stock")]
    stock: i64,
}

pub fn run_products(shop: &Shop, filter: &ProductFilter, mode: OutputMode) -> anyhow::Result<()> {
    let products = shop.search_products(filter)?;
    if !mode.is_human() {
        return emit_json(&products);
    }

    ui::header(&format!("{} Products", Icons::SEARCH));
    if products.is_empty() {
        ui::warn("No products match the filter.");
        return Ok(());
    }
    let rows: Vec<ProductRow> = products
        .into_iter()
        .map(|p| ProductRow {
            id: p.id,
            name: p.name,
            category: p.category_name.unwrap_or_default(),
            price: ui::price(p.price),
            stock: p.stock_level,
        })
        .collect();
    println!("{}", ui::render(&rows));
    Ok(())
}

pub fn run_categories(shop: &Shop, mode: OutputMode) -> anyhow::Result<()> {
    let categories = shop.categories()?;
    if !mode.is_human() {
        return emit_json(&categories);
    }

    ui::section("Categories");
    for category in categories {
        ui::summary_row(&format!("{:>3}", category.id), &category.name);
    }
    Ok(())
}

#[derive(Tabled)]
struct BestSellerRow {
    #[tabled(rename = "Product")]
    name: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Ordered")]
    ordered: i64,
}

pub fn run_best_sellers(shop: &Shop, limit: usize, mode: OutputMode) -> anyhow::Result<()> {
    let best = shop.best_sellers(limit)?;
    if !mode.is_human() {
        return emit_json(&best);
    }

    ui::header(&format!("{} Best sellers", Icons::STAR));
    if best.is_empty() {
        ui::warn("Nothing has been ordered yet.");
        return Ok(());
    }
    let rows: Vec<BestSellerRow> = best
        .into_iter()
        .map(|b| BestSellerRow {
            name: b.name,
            price: ui::price(b.price),
            ordered: b.total_ordered,
        })
        .collect();
    println!("{}", ui::render(&rows));
    Ok(())
}

pub fn run_reviews(shop: &Shop, product_id: i64, mode: OutputMode) -> anyhow::Result<()> {
    let reviews = shop.reviews_for(product_id)?;
    if !mode.is_human() {
        return emit_json(&reviews);
    }

    let Some(product) = shop.product(product_id)? else {
        anyhow::bail!("no product with id {}", product_id);
    };
    ui::section(&format!("Reviews of {}", product.name));
    if reviews.is_empty() {
        println!("  {}", ui::muted("No reviews yet."));
    }
    for review in reviews {
        let text = match &review.comment {
            Some(comment) => format!("{} ({}): {}", review.author, review.date, comment),
            None => format!("{} ({})", review.author, review.date),
        };
        ui::rating(review.stars, &text);
    }
    Ok(())
}

pub fn run_register(shop: &Shop, customer: &NewCustomer) -> anyhow::Result<()> {
    match shop.register(customer) {
        Ok(id) => {
            ui::success(&format!("Registered {} (customer {})", customer.username, id));
            Ok(())
        }
        Err(failure) if failure.is_duplicate() => anyhow::bail!("Username is already taken!"),
        Err(failure) => {
            tracing::debug!("Registration failed: {}", failure);
            anyhow::bail!("Database error")
        }
    }
}

pub fn run_login(shop: &mut Shop, username: &str, password: &str) -> anyhow::Result<()> {
    match shop.login(username, password)? {
        LoginOutcome::UnknownUser => anyhow::bail!("No account with that username."),
        LoginOutcome::WrongPassword => anyhow::bail!("Incorrect password."),
        LoginOutcome::Authenticated(customer) => {
            ui::success(&format!("Welcome back, {}!", customer.firstname));
            ui::status(Icons::PERSON, "Customer", &customer.id.to_string());

            let basket = shop.basket_for(customer.id)?;
            let items = shop.basket_items(basket.id)?;
            let value = shop.basket_value(basket.id)?;
            ui::status(
                Icons::BASKET,
                "Basket",
                &format!("{} items, {}", items.len(), ui::price(value)),
            );

            let orders = shop.orders_for(customer.id)?;
            ui::status(Icons::PACKAGE, "Orders", &orders.len().to_string());
            for order in orders.iter().take(5) {
                ui::summary_row(&format!("#{} {}", order.id, order.date), order.status.as_str());
            }
            Ok(())
        }
    }
}

pub fn run_export(shop: &mut Shop, path: &Path, skip_images: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let spinner = Spinner::new(&format!("Backing up to {}", path.display()));
    let summary = Archiver::new(shop.gateway_mut()).export(path, ExportOptions { skip_images });
    spinner.finish_and_clear();
    let summary = summary?;

    ui::success(&format!("{} Backup written to {}", Icons::SAVE, path.display()));
    ui::summary_row("Tables:", &summary.tables.to_string());
    ui::summary_row("Rows:", &summary.rows.to_string());
    ui::timing(&HumanDuration(start.elapsed()).to_string());
    Ok(())
}

pub fn run_restore(shop: &mut Shop, path: &Path) -> anyhow::Result<()> {
    let start = Instant::now();
    let spinner = Spinner::new(&format!("Restoring from {}", path.display()));
    let summary = Archiver::new(shop.gateway_mut()).restore(path);
    spinner.finish_and_clear();
    let summary = summary?;

    ui::success(&format!("{} Restored from {}", Icons::RESTORE, path.display()));
    ui::summary_row("Tables:", &summary.tables.to_string());
    ui::summary_row("Rows:", &summary.rows.to_string());
    ui::timing(&HumanDuration(start.elapsed()).to_string());
    Ok(())
}

#[derive(Serialize)]
struct TableCount {
    table: String,
    rows: usize,
}

pub fn run_stats(shop: &Shop, mode: OutputMode) -> anyhow::Result<()> {
    let stats = shop.gateway().stats()?;
    if !mode.is_human() {
        let counts: Vec<TableCount> = stats
            .tables
            .iter()
            .map(|(table, rows)| TableCount {
                table: table.to_string(),
                rows: *rows,
            })
            .collect();
        return emit_json(&counts);
    }

    ui::header(&format!("{} Storefront Statistics", Icons::STATS));
    let counts: Vec<(String, String)> = stats
        .tables
        .iter()
        .map(|(table, rows)| (table.to_string(), rows.to_string()))
        .chain(std::iter::once(("Total".to_string(), stats.total_rows().to_string())))
        .collect();
    let borrowed: Vec<(&str, &str)> = counts.iter().map(|(l, v)| (l.as_str(), v.as_str())).collect();
    println!("{}", ui::stats_table(&borrowed));
    Ok(())
}
