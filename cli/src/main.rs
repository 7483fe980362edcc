mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::commands::{
    cmd_add, cmd_delete, cmd_expired, cmd_expiring, cmd_list, cmd_meal_delete, cmd_meal_list,
    cmd_meal_log, cmd_meal_stats, cmd_meal_totals, cmd_product_add, cmd_product_delete,
    cmd_product_list, cmd_product_show, cmd_receipt_add, cmd_receipt_delete, cmd_receipt_list,
    cmd_receipt_process, cmd_receipt_show, cmd_show, cmd_sync_catalog, cmd_sync_retry,
    cmd_sync_run, cmd_sync_status, cmd_update,
};
use crate::commands::helpers::json_error;
use crate::commands::{AddItemArgs, LogMealArgs, NewProductArgs, UpdateItemArgs};
use crate::config::Config;
use pantry_core::service::PantryService;

#[derive(Parser)]
#[command(
    name = "pantry",
    version,
    about = "Track pantry items, expiration dates, meals and receipts"
)]
struct Cli {
    /// Database file (default: platform data directory)
    #[arg(long, global = true, env = "PANTRY_DB", value_name = "PATH")]
    db: Option<PathBuf>,
    /// User whose records are read and written
    #[arg(long, global = true, env = "PANTRY_USER")]
    user: Option<String>,
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the product catalog
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },
    /// Add an item to the pantry
    Add {
        /// Product id, barcode or name (unknown names create a new product)
        product: String,
        /// Quantity
        #[arg(short, long, default_value = "1")]
        quantity: i64,
        /// Unit: units, kg, g, L, mL, lb, oz
        #[arg(short, long, default_value = "units")]
        unit: String,
        /// Storage location: fridge, pantry, freezer
        #[arg(short, long, default_value = "pantry")]
        location: String,
        /// Purchase date (YYYY-MM-DD or today/yesterday/tomorrow, default: now)
        #[arg(long)]
        purchased: Option<String>,
        /// Expiration date (default: purchase date plus the product's shelf life)
        #[arg(short, long)]
        expires: Option<String>,
        /// Category for a newly created product
        #[arg(long)]
        category: Option<String>,
        /// Shelf life in days for a newly created product
        #[arg(long)]
        shelf_life: Option<i64>,
        /// Optional notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// List pantry items, soonest expiration first
    List {
        /// Only show items in this location
        #[arg(short, long)]
        location: Option<String>,
    },
    /// Show items expiring within N days (expired items included)
    Expiring {
        #[arg(short, long, default_value = "3")]
        days: i64,
    },
    /// Show expired items
    Expired,
    /// Show a pantry item
    Show {
        /// Item ID
        id: String,
    },
    /// Update a pantry item
    Update {
        /// Item ID
        id: String,
        /// New quantity
        #[arg(short, long, allow_hyphen_values = true)]
        quantity: Option<i64>,
        /// New expiration date (YYYY-MM-DD or today/yesterday/tomorrow)
        #[arg(short, long)]
        expires: Option<String>,
        /// New storage location
        #[arg(short, long)]
        location: Option<String>,
        /// New notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a pantry item
    Delete {
        /// Item ID
        id: String,
    },
    /// Log and review meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Manage scanned receipts
    Receipt {
        #[command(subcommand)]
        command: ReceiptCommands,
    },
    /// Inspect and drain the pending-sync queue
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
enum ProductCommands {
    /// Add a product to the catalog
    Add {
        /// Product name
        name: String,
        /// Category: fruits, vegetables, dairy, meat, seafood, grains, bakery,
        /// beverages, snacks, condiments, frozen, canned, other
        #[arg(short, long, default_value = "other")]
        category: String,
        /// Default shelf life in days
        #[arg(short, long, default_value = "7")]
        shelf_life: i64,
        /// Barcode
        #[arg(short, long)]
        barcode: Option<String>,
        /// Image URL
        #[arg(long)]
        image_url: Option<String>,
        /// Calories per serving (enables nutrition info)
        #[arg(long)]
        calories: Option<i64>,
        /// Serving size label, e.g. "250ml"
        #[arg(long, default_value = "1 serving")]
        serving: String,
        /// Protein grams per serving
        #[arg(long, default_value = "0")]
        protein: f64,
        /// Carbs grams per serving
        #[arg(long, default_value = "0")]
        carbs: f64,
        /// Fat grams per serving
        #[arg(long, default_value = "0")]
        fat: f64,
    },
    /// List or search products
    List {
        /// Only this category
        #[arg(short, long)]
        category: Option<String>,
        /// Case-insensitive name filter
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Show a product by ID or barcode
    Show {
        /// Product ID or barcode
        id: String,
    },
    /// Delete a product (refused while pantry items use it)
    Delete {
        /// Product ID
        id: String,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Log a meal
    Log {
        /// Meal type: breakfast, lunch, dinner, snack
        meal: String,
        /// Calories
        #[arg(short, long, allow_hyphen_values = true)]
        calories: i64,
        /// Protein grams
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        protein: f64,
        /// Carbs grams
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        carbs: f64,
        /// Fat grams
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        fat: f64,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(short, long)]
        date: Option<String>,
        /// Photo of the meal
        #[arg(long)]
        image_url: Option<String>,
        /// Optional notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// List meals for a date or a date range
    List {
        /// Date (default: today)
        #[arg(short, long, conflicts_with_all = ["from", "to"])]
        date: Option<String>,
        /// Range start (inclusive)
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// Range end (inclusive)
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
    /// Show daily totals for the last N days
    Totals {
        #[arg(short, long, default_value = "7")]
        days: u32,
    },
    /// Show average daily intake over the last seven days
    Stats,
    /// Delete a meal log
    Delete {
        /// Log ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ReceiptCommands {
    /// Record a scanned receipt
    Add {
        /// Image path or URL
        image: String,
        /// Scan date (default: now)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// List receipts, newest first
    List,
    /// Show a receipt and its extracted items
    Show {
        /// Receipt ID
        id: String,
    },
    /// Attach extracted items and mark the receipt processed
    Process {
        /// Receipt ID
        id: String,
        /// Extracted item as "name:quantity[:price]" (repeatable)
        #[arg(short, long = "item", value_name = "ITEM")]
        items: Vec<String>,
    },
    /// Delete a receipt
    Delete {
        /// Receipt ID
        id: String,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Show sync status counts and the queued changes
    Status,
    /// Push queued changes to the backend
    Run,
    /// Move failed records back to pending
    Retry,
    /// Refresh the product catalog from the backend
    Catalog,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli) {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        } else {
            eprintln!("Error: {e:#}");
        }
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db, cli.user)?;
    debug!(db = %config.db_path.display(), user = %config.user_id, "opening pantry store");
    let svc = PantryService::open(&config.db_path, &config.user_id)?;
    let json = cli.json;

    match cli.command {
        Commands::Product { command } => match command {
            ProductCommands::Add {
                name,
                category,
                shelf_life,
                barcode,
                image_url,
                calories,
                serving,
                protein,
                carbs,
                fat,
            } => cmd_product_add(
                &svc,
                NewProductArgs {
                    name,
                    category,
                    shelf_life,
                    barcode,
                    image_url,
                    calories,
                    serving,
                    protein,
                    carbs,
                    fat,
                },
                json,
            ),
            ProductCommands::List { category, search } => {
                cmd_product_list(&svc, category.as_deref(), search.as_deref(), json)
            }
            ProductCommands::Show { id } => cmd_product_show(&svc, &id, json),
            ProductCommands::Delete { id } => cmd_product_delete(&svc, &id, json),
        },
        Commands::Add {
            product,
            quantity,
            unit,
            location,
            purchased,
            expires,
            category,
            shelf_life,
            notes,
        } => cmd_add(
            &svc,
            AddItemArgs {
                product,
                quantity,
                unit,
                location,
                purchased,
                expires,
                category,
                shelf_life,
                notes,
            },
            json,
        ),
        Commands::List { location } => cmd_list(&svc, location.as_deref(), json),
        Commands::Expiring { days } => cmd_expiring(&svc, days, json),
        Commands::Expired => cmd_expired(&svc, json),
        Commands::Show { id } => cmd_show(&svc, &id, json),
        Commands::Update {
            id,
            quantity,
            expires,
            location,
            notes,
        } => cmd_update(
            &svc,
            &id,
            UpdateItemArgs {
                quantity,
                expires,
                location,
                notes,
            },
            json,
        ),
        Commands::Delete { id } => cmd_delete(&svc, &id, json),
        Commands::Meal { command } => match command {
            MealCommands::Log {
                meal,
                calories,
                protein,
                carbs,
                fat,
                date,
                image_url,
                notes,
            } => cmd_meal_log(
                &svc,
                LogMealArgs {
                    meal,
                    calories,
                    protein,
                    carbs,
                    fat,
                    date,
                    image_url,
                    notes,
                },
                json,
            ),
            MealCommands::List { date, from, to } => cmd_meal_list(&svc, date, from, to, json),
            MealCommands::Totals { days } => cmd_meal_totals(&svc, days, json),
            MealCommands::Stats => cmd_meal_stats(&svc, json),
            MealCommands::Delete { id } => cmd_meal_delete(&svc, &id, json),
        },
        Commands::Receipt { command } => match command {
            ReceiptCommands::Add { image, date } => cmd_receipt_add(&svc, image, date, json),
            ReceiptCommands::List => cmd_receipt_list(&svc, json),
            ReceiptCommands::Show { id } => cmd_receipt_show(&svc, &id, json),
            ReceiptCommands::Process { id, items } => {
                cmd_receipt_process(&svc, &id, &items, json)
            }
            ReceiptCommands::Delete { id } => cmd_receipt_delete(&svc, &id, json),
        },
        Commands::Sync { command } => match command {
            SyncCommands::Status => cmd_sync_status(&svc, json),
            SyncCommands::Run => cmd_sync_run(&svc, json),
            SyncCommands::Retry => cmd_sync_retry(&svc, json),
            SyncCommands::Catalog => cmd_sync_catalog(&svc, json),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pantry", "expiring", "--days", "5", "--json", "--user", "bob",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.user.as_deref(), Some("bob"));
        assert!(matches!(cli.command, Commands::Expiring { days: 5 }));
    }

    #[test]
    fn test_negative_quantity_reaches_validation() {
        let cli = Cli::try_parse_from(["pantry", "update", "abc", "--quantity", "-2"]).unwrap();
        match cli.command {
            Commands::Update { quantity, .. } => assert_eq!(quantity, Some(-2)),
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_receipt_items_repeat() {
        let cli = Cli::try_parse_from([
            "pantry", "receipt", "process", "r1", "--item", "Milk:2", "-i", "Eggs:12:3.49",
        ])
        .unwrap();
        match cli.command {
            Commands::Receipt {
                command: ReceiptCommands::Process { id, items },
            } => {
                assert_eq!(id, "r1");
                assert_eq!(items, vec!["Milk:2", "Eggs:12:3.49"]);
            }
            _ => panic!("expected receipt process"),
        }
    }
}
