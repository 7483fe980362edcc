//! One repository interface per entity.
//!
//! Callers depend on these traits; `PantryService` implements all of them over
//! the local SQLite store. Pantry, nutrition and receipt repositories are
//! scoped to the service's current user.

use anyhow::Result;
use chrono::NaiveDate;

use crate::models::{
    DailyNutrition, NewNutritionLog, NewPantryItem, NewReceipt, NutritionAverages, NutritionLog,
    PantryItem, Product, ProductCategory, Receipt, ReceiptItem, StorageLocation,
};
use crate::sync::{CatalogSource, SyncBackend, SyncReport};

pub trait ProductRepository {
    fn all_products(&self) -> Result<Vec<Product>>;
    fn products_by_category(&self, category: ProductCategory) -> Result<Vec<Product>>;
    /// Case-insensitive substring match on the name.
    fn search_products(&self, query: &str) -> Result<Vec<Product>>;
    fn product_by_id(&self, id: &str) -> Result<Option<Product>>;
    fn product_by_barcode(&self, barcode: &str) -> Result<Option<Product>>;
    fn add_product(&self, product: &Product) -> Result<Product>;
    fn update_product(&self, product: &Product) -> Result<Product>;
    /// Fails while any pantry item still references the product.
    /// Returns `false` when nothing was deleted.
    fn delete_product(&self, id: &str) -> Result<bool>;
    /// Upsert every product the source returns. Returns how many were stored.
    fn sync_catalog(&self, source: &dyn CatalogSource) -> Result<usize>;
}

pub trait PantryRepository {
    fn all_items(&self) -> Result<Vec<PantryItem>>;
    fn items_by_location(&self, location: StorageLocation) -> Result<Vec<PantryItem>>;
    /// Items expiring within `within_days` of now. Already expired items are included.
    fn expiring_items(&self, within_days: i64) -> Result<Vec<PantryItem>>;
    fn expired_items(&self) -> Result<Vec<PantryItem>>;
    fn item_by_id(&self, id: &str) -> Result<Option<PantryItem>>;
    fn add_item(&self, item: NewPantryItem) -> Result<PantryItem>;
    fn update_item(&self, item: &PantryItem) -> Result<PantryItem>;
    fn update_quantity(&self, id: &str, quantity: i64) -> Result<PantryItem>;
    fn delete_item(&self, id: &str) -> Result<bool>;
    /// Push the whole pending-sync queue, oldest first.
    fn sync_with_backend(&self, backend: &dyn SyncBackend) -> Result<SyncReport>;
}

pub trait NutritionRepository {
    fn all_logs(&self) -> Result<Vec<NutritionLog>>;
    fn logs_by_date(&self, date: NaiveDate) -> Result<Vec<NutritionLog>>;
    /// Both ends inclusive.
    fn logs_by_date_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NutritionLog>>;
    fn daily_totals(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyNutrition>>;
    fn log_by_id(&self, id: &str) -> Result<Option<NutritionLog>>;
    fn add_log(&self, log: NewNutritionLog) -> Result<NutritionLog>;
    fn update_log(&self, log: &NutritionLog) -> Result<NutritionLog>;
    fn delete_log(&self, id: &str) -> Result<bool>;
    fn weekly_average_calories(&self) -> Result<f64>;
    fn weekly_average_macros(&self) -> Result<NutritionAverages>;
}

pub trait ReceiptRepository {
    fn all_receipts(&self) -> Result<Vec<Receipt>>;
    fn receipt_by_id(&self, id: &str) -> Result<Option<Receipt>>;
    fn add_receipt(&self, receipt: NewReceipt) -> Result<Receipt>;
    fn mark_processed(&self, id: &str, items: Vec<ReceiptItem>) -> Result<Receipt>;
    fn delete_receipt(&self, id: &str) -> Result<bool>;
}
