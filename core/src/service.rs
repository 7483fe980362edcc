use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::models::{
    DailyNutrition, EntityType, ItemStatus, NewNutritionLog, NewPantryItem, NewReceipt,
    NutritionAverages, NutritionLog, PantryItem, PendingSync, Product, ProductCategory, Receipt,
    ReceiptItem, StorageLocation, SyncOperation, SyncStatus, SyncStatusCounts, validate_nutrition,
    validate_product, validate_quantity, validate_receipt_items,
};
use crate::repository::{
    NutritionRepository, PantryRepository, ProductRepository, ReceiptRepository,
};
use crate::sync::{CatalogSource, SyncBackend, SyncFailure, SyncReport};

/// Source of the current time for status derivation and timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day that meal dates and weekly windows are measured against.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Local-first store for one user's pantry, nutrition logs and receipts.
///
/// Every write marks the record PENDING and queues the mutation for upload in
/// the same transaction. The queue is drained by `sync_with_backend`.
pub struct PantryService {
    db: Database,
    user_id: String,
    clock: Box<dyn Clock>,
}

impl PantryService {
    pub fn new(db: Database, user_id: &str) -> Self {
        Self {
            db,
            user_id: user_id.to_string(),
            clock: Box::new(SystemClock),
        }
    }

    pub fn open(db_path: &Path, user_id: &str) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self::new(db, user_id))
    }

    pub fn open_in_memory(user_id: &str) -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::new(db, user_id))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn set_clock(&mut self, clock: impl Clock + 'static) {
        self.clock = Box::new(clock);
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // --- Sync queue ---

    pub fn pending_sync(&self) -> Result<Vec<PendingSync>> {
        let queue = self.db.list_pending_sync()?;
        debug!(queued = queue.len(), "read pending sync queue");
        Ok(queue)
    }

    pub fn sync_status_counts(&self) -> Result<SyncStatusCounts> {
        self.db.sync_status_counts(&self.user_id)
    }

    /// Move every failed record of the current user back to PENDING.
    pub fn retry_errored(&self) -> Result<usize> {
        let moved = self.db.reset_errored(&self.user_id)?;
        info!(records = moved, "reset failed records to pending");
        Ok(moved)
    }

    /// Whether a row with this id exists and belongs to another user.
    fn is_foreign(&self, entity_type: EntityType, id: &str) -> Result<bool> {
        Ok(self
            .db
            .owner_of(entity_type, id)?
            .is_some_and(|owner| owner != self.user_id))
    }

    fn enqueue<T: Serialize>(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation: SyncOperation,
        payload: &T,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_string(payload)?;
        self.db
            .enqueue_sync(entity_type, entity_id, operation, &payload, now)
    }

    fn enqueue_delete(&self, entity_type: EntityType, entity_id: &str) -> Result<()> {
        let payload = serde_json::json!({ "id": entity_id });
        self.enqueue(
            entity_type,
            entity_id,
            SyncOperation::Delete,
            &payload,
            self.clock.now(),
        )
    }

    fn confirm_upload(&self, change: &PendingSync) -> Result<()> {
        let tx = self.db.transaction()?;
        self.db.delete_pending_sync(&change.id)?;
        if change.operation != SyncOperation::Delete {
            self.db
                .set_sync_status(change.entity_type, &change.entity_id, SyncStatus::Synced)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn record_failure(&self, change: &PendingSync, error: &str) -> Result<()> {
        let tx = self.db.transaction()?;
        self.db.record_sync_failure(&change.id, error)?;
        if change.operation != SyncOperation::Delete {
            self.db
                .set_sync_status(change.entity_type, &change.entity_id, SyncStatus::Error)?;
        }
        tx.commit()?;
        Ok(())
    }

    // --- Pantry write path ---

    fn save_item(&self, item: &PantryItem, operation: SyncOperation) -> Result<()> {
        let tx = self.db.transaction()?;
        if self.db.ensure_product(&item.product, item.updated_at)? {
            debug!(product = %item.product.id, "created missing product for pantry item");
        }
        self.db.upsert_pantry_item(item)?;
        self.enqueue(
            EntityType::PantryItem,
            &item.id,
            operation,
            item,
            item.updated_at,
        )?;
        tx.commit()?;
        Ok(())
    }

    fn save_log(&self, log: &NutritionLog, operation: SyncOperation) -> Result<()> {
        let tx = self.db.transaction()?;
        self.db.upsert_nutrition_log(log)?;
        self.enqueue(
            EntityType::NutritionLog,
            &log.id,
            operation,
            log,
            self.clock.now(),
        )?;
        tx.commit()?;
        Ok(())
    }

    fn save_receipt(&self, receipt: &Receipt, operation: SyncOperation) -> Result<()> {
        let tx = self.db.transaction()?;
        self.db.upsert_receipt(receipt)?;
        self.enqueue(
            EntityType::Receipt,
            &receipt.id,
            operation,
            receipt,
            self.clock.now(),
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl ProductRepository for PantryService {
    fn all_products(&self) -> Result<Vec<Product>> {
        self.db.list_products()
    }

    fn products_by_category(&self, category: ProductCategory) -> Result<Vec<Product>> {
        self.db.list_products_by_category(category)
    }

    fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        self.db.search_products(query)
    }

    fn product_by_id(&self, id: &str) -> Result<Option<Product>> {
        self.db.get_product(id)
    }

    fn product_by_barcode(&self, barcode: &str) -> Result<Option<Product>> {
        self.db.get_product_by_barcode(barcode)
    }

    fn add_product(&self, product: &Product) -> Result<Product> {
        validate_product(product)?;
        self.db.upsert_product(product, self.clock.now())?;
        self.db.get_product(&product.id)?.context("Product not found")
    }

    fn update_product(&self, product: &Product) -> Result<Product> {
        validate_product(product)?;
        self.db
            .get_product(&product.id)?
            .context("Product not found")?;
        self.db.upsert_product(product, self.clock.now())?;
        self.db.get_product(&product.id)?.context("Product not found")
    }

    fn delete_product(&self, id: &str) -> Result<bool> {
        let in_use = self.db.count_items_for_product(id)?;
        if in_use > 0 {
            bail!("Product is still used by {in_use} pantry item(s)");
        }
        self.db.delete_product(id)
    }

    fn sync_catalog(&self, source: &dyn CatalogSource) -> Result<usize> {
        let products = source.fetch_products()?;
        let now = self.clock.now();
        let tx = self.db.transaction()?;
        for product in &products {
            validate_product(product)
                .with_context(|| format!("Invalid catalog product '{}'", product.id))?;
            self.db.upsert_product(product, now)?;
        }
        tx.commit()?;
        info!(products = products.len(), "catalog synced");
        Ok(products.len())
    }
}

impl PantryRepository for PantryService {
    fn all_items(&self) -> Result<Vec<PantryItem>> {
        self.db.list_pantry_items(&self.user_id, self.clock.now())
    }

    fn items_by_location(&self, location: StorageLocation) -> Result<Vec<PantryItem>> {
        self.db
            .list_pantry_items_by_location(&self.user_id, location, self.clock.now())
    }

    fn expiring_items(&self, within_days: i64) -> Result<Vec<PantryItem>> {
        if within_days < 0 {
            bail!("Days cannot be negative (got {within_days})");
        }
        let now = self.clock.now();
        let threshold = Duration::try_days(within_days)
            .and_then(|window| now.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.db
            .list_pantry_items_expiring_before(&self.user_id, threshold, now)
    }

    fn expired_items(&self) -> Result<Vec<PantryItem>> {
        self.db
            .list_expired_pantry_items(&self.user_id, self.clock.now())
    }

    fn item_by_id(&self, id: &str) -> Result<Option<PantryItem>> {
        let item = self.db.get_pantry_item(id, self.clock.now())?;
        Ok(item.filter(|item| item.user_id == self.user_id))
    }

    fn add_item(&self, item: NewPantryItem) -> Result<PantryItem> {
        validate_quantity(item.quantity)?;
        validate_product(&item.product)?;
        let now = self.clock.now();
        let item = PantryItem {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            status: ItemStatus::from_expiration(item.expiration_date, now),
            product: item.product,
            quantity: item.quantity,
            unit: item.unit,
            location: item.location,
            purchase_date: item.purchase_date,
            expiration_date: item.expiration_date,
            notes: item.notes,
            sync_status: SyncStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.save_item(&item, SyncOperation::Create)?;
        self.item_by_id(&item.id)?.context("Pantry item not found")
    }

    fn update_item(&self, item: &PantryItem) -> Result<PantryItem> {
        validate_quantity(item.quantity)?;
        validate_product(&item.product)?;
        let now = self.clock.now();
        let operation = match self.db.owner_of(EntityType::PantryItem, &item.id)? {
            Some(owner) if owner != self.user_id => bail!("Pantry item not found: {}", item.id),
            Some(_) => SyncOperation::Update,
            None => SyncOperation::Create,
        };
        let item = PantryItem {
            user_id: self.user_id.clone(),
            sync_status: SyncStatus::Pending,
            status: ItemStatus::from_expiration(item.expiration_date, now),
            updated_at: now,
            ..item.clone()
        };
        self.save_item(&item, operation)?;
        self.item_by_id(&item.id)?.context("Pantry item not found")
    }

    fn update_quantity(&self, id: &str, quantity: i64) -> Result<PantryItem> {
        validate_quantity(quantity)?;
        let now = self.clock.now();
        if self.is_foreign(EntityType::PantryItem, id)? {
            bail!("Pantry item not found: {id}");
        }
        let tx = self.db.transaction()?;
        if !self.db.update_pantry_item_quantity(id, quantity, now)? {
            bail!("Pantry item not found: {id}");
        }
        let item = self
            .db
            .get_pantry_item(id, now)?
            .context("Pantry item not found")?;
        self.enqueue(EntityType::PantryItem, id, SyncOperation::Update, &item, now)?;
        tx.commit()?;
        Ok(item)
    }

    fn delete_item(&self, id: &str) -> Result<bool> {
        if self.is_foreign(EntityType::PantryItem, id)? {
            return Ok(false);
        }
        let tx = self.db.transaction()?;
        let removed = self.db.delete_pantry_item(id)?;
        if removed {
            self.enqueue_delete(EntityType::PantryItem, id)?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn sync_with_backend(&self, backend: &dyn SyncBackend) -> Result<SyncReport> {
        let queue = self.pending_sync()?;
        let mut report = SyncReport {
            attempted: queue.len(),
            ..SyncReport::default()
        };

        for change in &queue {
            match backend.push(change) {
                Ok(()) => {
                    self.confirm_upload(change)?;
                    report.synced += 1;
                }
                Err(e) => {
                    let error = format!("{e:#}");
                    warn!(
                        entity_type = change.entity_type.as_str(),
                        entity_id = %change.entity_id,
                        retry_count = change.retry_count + 1,
                        error = %error,
                        "upload failed"
                    );
                    self.record_failure(change, &error)?;
                    report.failed.push(SyncFailure {
                        entity_type: change.entity_type,
                        entity_id: change.entity_id.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            attempted = report.attempted,
            synced = report.synced,
            failed = report.failed.len(),
            "sync finished"
        );
        Ok(report)
    }
}

impl NutritionRepository for PantryService {
    fn all_logs(&self) -> Result<Vec<NutritionLog>> {
        self.db.list_nutrition_logs(&self.user_id)
    }

    fn logs_by_date(&self, date: NaiveDate) -> Result<Vec<NutritionLog>> {
        self.db
            .list_nutrition_logs_between(&self.user_id, date, date)
    }

    fn logs_by_date_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NutritionLog>> {
        self.db
            .list_nutrition_logs_between(&self.user_id, start, end)
    }

    fn daily_totals(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DailyNutrition>> {
        let mut totals = self
            .db
            .daily_nutrition_totals(&self.user_id, start, end)?;
        let logs = self
            .db
            .list_nutrition_logs_between(&self.user_id, start, end)?;
        for day in &mut totals {
            day.meals = logs
                .iter()
                .filter(|log| log.meal_date == day.date)
                .cloned()
                .collect();
        }
        Ok(totals)
    }

    fn log_by_id(&self, id: &str) -> Result<Option<NutritionLog>> {
        let log = self.db.get_nutrition_log(id)?;
        Ok(log.filter(|log| log.user_id == self.user_id))
    }

    fn add_log(&self, log: NewNutritionLog) -> Result<NutritionLog> {
        validate_nutrition(log.calories, log.protein_g, log.carbs_g, log.fat_g)?;
        let log = NutritionLog {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            meal_date: log.meal_date,
            meal_type: log.meal_type,
            calories: log.calories,
            protein_g: log.protein_g,
            carbs_g: log.carbs_g,
            fat_g: log.fat_g,
            image_url: log.image_url,
            notes: log.notes,
            sync_status: SyncStatus::Pending,
            created_at: self.clock.now(),
        };
        self.save_log(&log, SyncOperation::Create)?;
        self.log_by_id(&log.id)?.context("Nutrition log not found")
    }

    fn update_log(&self, log: &NutritionLog) -> Result<NutritionLog> {
        validate_nutrition(log.calories, log.protein_g, log.carbs_g, log.fat_g)?;
        let operation = match self.db.owner_of(EntityType::NutritionLog, &log.id)? {
            Some(owner) if owner != self.user_id => bail!("Nutrition log not found: {}", log.id),
            Some(_) => SyncOperation::Update,
            None => SyncOperation::Create,
        };
        let log = NutritionLog {
            user_id: self.user_id.clone(),
            sync_status: SyncStatus::Pending,
            ..log.clone()
        };
        self.save_log(&log, operation)?;
        self.log_by_id(&log.id)?.context("Nutrition log not found")
    }

    fn delete_log(&self, id: &str) -> Result<bool> {
        if self.is_foreign(EntityType::NutritionLog, id)? {
            return Ok(false);
        }
        let tx = self.db.transaction()?;
        let removed = self.db.delete_nutrition_log(id)?;
        if removed {
            self.enqueue_delete(EntityType::NutritionLog, id)?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn weekly_average_calories(&self) -> Result<f64> {
        Ok(self.weekly_average_macros()?.calories)
    }

    fn weekly_average_macros(&self) -> Result<NutritionAverages> {
        let today = self.clock.today();
        let start = today - Duration::days(6);
        self.db
            .average_daily_nutrition(&self.user_id, start, today)
    }
}

impl ReceiptRepository for PantryService {
    fn all_receipts(&self) -> Result<Vec<Receipt>> {
        self.db.list_receipts(&self.user_id)
    }

    fn receipt_by_id(&self, id: &str) -> Result<Option<Receipt>> {
        let receipt = self.db.get_receipt(id)?;
        Ok(receipt.filter(|receipt| receipt.user_id == self.user_id))
    }

    fn add_receipt(&self, receipt: NewReceipt) -> Result<Receipt> {
        if receipt.image_url.trim().is_empty() {
            bail!("Receipt image must not be empty");
        }
        let receipt = Receipt {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            image_url: receipt.image_url,
            scan_date: receipt.scan_date,
            processed: false,
            extracted_items: None,
            sync_status: SyncStatus::Pending,
            created_at: self.clock.now(),
        };
        self.save_receipt(&receipt, SyncOperation::Create)?;
        self.receipt_by_id(&receipt.id)?.context("Receipt not found")
    }

    fn mark_processed(&self, id: &str, items: Vec<ReceiptItem>) -> Result<Receipt> {
        validate_receipt_items(&items)?;
        let mut receipt = self.receipt_by_id(id)?.context("Receipt not found")?;
        receipt.processed = true;
        receipt.extracted_items = Some(items);
        receipt.sync_status = SyncStatus::Pending;
        self.save_receipt(&receipt, SyncOperation::Update)?;
        self.receipt_by_id(id)?.context("Receipt not found")
    }

    fn delete_receipt(&self, id: &str) -> Result<bool> {
        if self.is_foreign(EntityType::Receipt, id)? {
            return Ok(false);
        }
        let tx = self.db.transaction()?;
        let removed = self.db.delete_receipt(id)?;
        if removed {
            self.enqueue_delete(EntityType::Receipt, id)?;
        }
        tx.commit()?;
        Ok(removed)
    }
}
