//! Storefront CLI - command-line front end for the hardware shop store

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use storefront::config::{self, ResolvedPaths};
use storefront::{ui, Gateway, InstanceLock, Shop};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::OutputMode;

#[derive(Parser)]
#[command(name = "storefront")]
#[command(version)]
#[command(about = "Storefront - catalog, accounts and XML backups for a small hardware shop")]
#[command(long_about = r#"
Storefront manages the shop's SQLite store:
  • Product search, categories and best sellers
  • Customer registration and login
  • Full schema and data backup to XML, and restore from it

Example usage:
  storefront init
  storefront products --category laptop --sort price --order desc
  storefront export --skip-images backup/shop.xml
  storefront restore backup/shop.xml
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Drop and recreate the schema from the seed script before running
    #[arg(long, global = true)]
    reload_db: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and build a fresh seeded store
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Search the product catalog
    Products {
        /// Substring of the product name
        #[arg(short, long, default_value = "")]
        name: String,

        /// Substring of the category name
        #[arg(long, default_value = "")]
        category: String,

        #[arg(long, default_value = "0")]
        min_price: f64,

        #[arg(long, default_value = "5000")]
        max_price: f64,

        /// Sort key (name, category, price)
        #[arg(short, long, default_value = "name")]
        sort: String,

        /// Sort direction (asc, desc)
        #[arg(short, long, default_value = "asc")]
        order: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List product categories
    Categories {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the most ordered products
    BestSellers {
        /// Maximum number of products
        #[arg(short, long, default_value = "6")]
        limit: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show reviews of a product
    Reviews {
        /// Product id
        #[arg(short, long)]
        product: i64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Create a customer account
    Register {
        #[arg(long)]
        firstname: String,

        #[arg(long)]
        surname: String,

        #[arg(long)]
        gender: String,

        #[arg(long)]
        email: String,

        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        password: String,
    },

    /// Check a username and password
    Login {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        password: String,
    },

    /// Back up schema and data to an XML document
    Export {
        /// Destination file (defaults to the configured backup path)
        path: Option<PathBuf>,

        /// Leave image columns out of the backup
        #[arg(long)]
        skip_images: bool,
    },

    /// Rebuild schema and data from an XML document
    Restore {
        /// Source file (defaults to the configured backup path)
        path: Option<PathBuf>,
    },

    /// Show per-table row counts
    Stats {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let file_config = config::load_config(Some(&config_path))?.unwrap_or_default();
    let paths = file_config.resolve(cli.database.clone());

    if let Commands::Init { force } = &cli.command {
        commands::write_default_config(&config_path, &file_config, &paths, *force)?;
    }

    config::ensure_db_dir(&paths.database)?;
    let _lock = InstanceLock::acquire(&paths.lock_file)?;

    let gateway = Gateway::open(&paths.database)?;
    let reseed = cli.reload_db || matches!(cli.command, Commands::Init { .. }) || !gateway.has_schema()?;
    let mut shop = Shop::new(gateway);
    if reseed {
        commands::seed_store(&shop, &paths)?;
    }

    dispatch(cli.command, &mut shop, &paths)
}

fn dispatch(command: Commands, shop: &mut Shop, paths: &ResolvedPaths) -> anyhow::Result<()> {
    match command {
        Commands::Init { .. } => commands::run_stats(shop, OutputMode::Human),

        Commands::Products {
            name,
            category,
            min_price,
            max_price,
            sort,
            order,
            format,
        } => {
            let filter = storefront::shop::ProductFilter {
                name,
                category,
                min_price,
                max_price,
                sort_by: sort.parse()?,
                order: order.parse()?,
            };
            commands::run_products(shop, &filter, OutputMode::from_format(&format)?)
        }

        Commands::Categories { format } => commands::run_categories(shop, OutputMode::from_format(&format)?),

        Commands::BestSellers { limit, format } => {
            commands::run_best_sellers(shop, limit, OutputMode::from_format(&format)?)
        }

        Commands::Reviews { product, format } => {
            commands::run_reviews(shop, product, OutputMode::from_format(&format)?)
        }

        Commands::Register {
            firstname,
            surname,
            gender,
            email,
            username,
            password,
        } => {
            let customer = storefront::shop::NewCustomer {
                firstname,
                surname,
                gender,
                email,
                username,
                password,
            };
            commands::run_register(shop, &customer)
        }

        Commands::Login { username, password } => commands::run_login(shop, &username, &password),

        Commands::Export { path, skip_images } => {
            let path = path.unwrap_or_else(|| paths.backup_path.clone());
            commands::run_export(shop, &path, skip_images)
        }

        Commands::Restore { path } => {
            let path = path.unwrap_or_else(|| paths.backup_path.clone());
            commands::run_restore(shop, &path)
        }

        Commands::Stats { format } => commands::run_stats(shop, OutputMode::from_format(&format)?),
    }
}
