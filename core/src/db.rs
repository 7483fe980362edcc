use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use uuid::Uuid;

use crate::models::{
    DailyNutrition, EntityType, ItemStatus, MealType, MeasurementUnit, NutritionAverages,
    NutritionLog, PantryItem, PendingSync, Product, ProductCategory, Receipt, ReceiptItem,
    StorageLocation, SyncOperation, SyncStatus, SyncStatusCounts,
};

const PRODUCT_COLUMNS: &str = "p.id, p.name, p.category, p.default_shelf_life_days, p.barcode,
     p.image_url, p.nutrition_info";

const PANTRY_ITEM_SELECT: &str = "SELECT pi.id, pi.user_id, pi.quantity, pi.unit, pi.location,
            pi.purchase_date, pi.expiration_date, pi.notes, pi.sync_status,
            pi.created_at, pi.updated_at,
            p.id, p.name, p.category, p.default_shelf_life_days, p.barcode,
            p.image_url, p.nutrition_info
     FROM pantry_items pi
     JOIN products p ON p.id = pi.product_id";

const NUTRITION_LOG_SELECT: &str = "SELECT id, user_id, meal_date, meal_type, calories, protein_g,
            carbs_g, fat_g, image_url, notes, sync_status, created_at
     FROM nutrition_logs";

const RECEIPT_SELECT: &str = "SELECT id, user_id, image_url, scan_date, processed,
            extracted_items, sync_status, created_at
     FROM receipts";

const PENDING_SYNC_SELECT: &str = "SELECT id, entity_type, entity_id, operation, payload,
            created_at, retry_count, last_error
     FROM pending_sync";

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS products (
                    id TEXT PRIMARY KEY NOT NULL,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    default_shelf_life_days INTEGER NOT NULL,
                    barcode TEXT,
                    image_url TEXT,
                    nutrition_info TEXT,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS pantry_items (
                    id TEXT PRIMARY KEY NOT NULL,
                    user_id TEXT NOT NULL,
                    product_id TEXT NOT NULL,
                    product_name TEXT NOT NULL,
                    quantity INTEGER NOT NULL,
                    unit TEXT NOT NULL,
                    location TEXT NOT NULL,
                    purchase_date INTEGER NOT NULL,
                    expiration_date INTEGER NOT NULL,
                    notes TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    sync_status TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS nutrition_logs (
                    id TEXT PRIMARY KEY NOT NULL,
                    user_id TEXT NOT NULL,
                    meal_date TEXT NOT NULL,
                    meal_type TEXT NOT NULL,
                    calories INTEGER NOT NULL,
                    protein_g REAL NOT NULL,
                    carbs_g REAL NOT NULL,
                    fat_g REAL NOT NULL,
                    image_url TEXT,
                    notes TEXT,
                    created_at INTEGER NOT NULL,
                    sync_status TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS receipts (
                    id TEXT PRIMARY KEY NOT NULL,
                    user_id TEXT NOT NULL,
                    image_url TEXT NOT NULL,
                    scan_date INTEGER NOT NULL,
                    processed INTEGER NOT NULL DEFAULT 0,
                    extracted_items TEXT,
                    created_at INTEGER NOT NULL,
                    sync_status TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS pending_sync (
                    id TEXT PRIMARY KEY NOT NULL,
                    entity_type TEXT NOT NULL,
                    entity_id TEXT NOT NULL,
                    operation TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    retry_count INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT,
                    UNIQUE (entity_type, entity_id)
                );

                CREATE INDEX IF NOT EXISTS idx_products_barcode ON products(barcode);
                CREATE INDEX IF NOT EXISTS idx_products_category ON products(category);
                CREATE INDEX IF NOT EXISTS idx_products_name ON products(name);
                CREATE INDEX IF NOT EXISTS idx_pantry_items_user ON pantry_items(user_id, expiration_date);
                CREATE INDEX IF NOT EXISTS idx_pantry_items_product ON pantry_items(product_id);
                CREATE INDEX IF NOT EXISTS idx_nutrition_logs_user_date ON nutrition_logs(user_id, meal_date);
                CREATE INDEX IF NOT EXISTS idx_receipts_user ON receipts(user_id);
                CREATE INDEX IF NOT EXISTS idx_pending_sync_created ON pending_sync(created_at);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    /// Begin a transaction on the shared connection. Every other method on
    /// `self` runs inside it until the returned guard is committed or dropped.
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    // --- Row mapping helpers ---

    fn instant_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
        let ms: i64 = row.get(idx)?;
        DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
    }

    fn date_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
        let s: String = row.get(idx)?;
        NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    // Expects PRODUCT_COLUMNS starting at `base`.
    fn product_at(row: &rusqlite::Row, base: usize) -> rusqlite::Result<Product> {
        let category: String = row.get(base + 2)?;
        let nutrition_info: Option<String> = row.get(base + 6)?;
        Ok(Product {
            id: row.get(base)?,
            name: row.get(base + 1)?,
            category: ProductCategory::from_db(&category),
            default_shelf_life_days: row.get(base + 3)?,
            barcode: row.get(base + 4)?,
            image_url: row.get(base + 5)?,
            nutrition_info: nutrition_info.and_then(|json| serde_json::from_str(&json).ok()),
        })
    }

    fn product_from_row(row: &rusqlite::Row) -> rusqlite::Result<Product> {
        Self::product_at(row, 0)
    }

    // Expects the columns of PANTRY_ITEM_SELECT.
    fn pantry_item_from_row(row: &rusqlite::Row, now: DateTime<Utc>) -> rusqlite::Result<PantryItem> {
        let unit: String = row.get(3)?;
        let location: String = row.get(4)?;
        let sync_status: String = row.get(8)?;
        let expiration_date = Self::instant_at(row, 6)?;
        Ok(PantryItem {
            id: row.get(0)?,
            user_id: row.get(1)?,
            quantity: row.get(2)?,
            unit: MeasurementUnit::from_db(&unit),
            location: StorageLocation::from_db(&location),
            purchase_date: Self::instant_at(row, 5)?,
            expiration_date,
            notes: row.get(7)?,
            sync_status: SyncStatus::from_db(&sync_status),
            status: ItemStatus::from_expiration(expiration_date, now),
            created_at: Self::instant_at(row, 9)?,
            updated_at: Self::instant_at(row, 10)?,
            product: Self::product_at(row, 11)?,
        })
    }

    fn nutrition_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<NutritionLog> {
        let meal_type: String = row.get(3)?;
        let sync_status: String = row.get(10)?;
        Ok(NutritionLog {
            id: row.get(0)?,
            user_id: row.get(1)?,
            meal_date: Self::date_at(row, 2)?,
            meal_type: MealType::from_db(&meal_type),
            calories: row.get(4)?,
            protein_g: row.get(5)?,
            carbs_g: row.get(6)?,
            fat_g: row.get(7)?,
            image_url: row.get(8)?,
            notes: row.get(9)?,
            sync_status: SyncStatus::from_db(&sync_status),
            created_at: Self::instant_at(row, 11)?,
        })
    }

    fn receipt_from_row(row: &rusqlite::Row) -> rusqlite::Result<Receipt> {
        let extracted: Option<String> = row.get(5)?;
        let sync_status: String = row.get(6)?;
        Ok(Receipt {
            id: row.get(0)?,
            user_id: row.get(1)?,
            image_url: row.get(2)?,
            scan_date: Self::instant_at(row, 3)?,
            processed: row.get(4)?,
            extracted_items: extracted
                .and_then(|json| serde_json::from_str::<Vec<ReceiptItem>>(&json).ok()),
            sync_status: SyncStatus::from_db(&sync_status),
            created_at: Self::instant_at(row, 7)?,
        })
    }

    fn pending_sync_from_row(row: &rusqlite::Row) -> rusqlite::Result<PendingSync> {
        let entity_type: String = row.get(1)?;
        let operation: String = row.get(3)?;
        let bad_text = |idx: usize, e: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
        };
        Ok(PendingSync {
            id: row.get(0)?,
            entity_type: EntityType::parse(&entity_type).map_err(|e| bad_text(1, e))?,
            entity_id: row.get(2)?,
            operation: SyncOperation::parse(&operation).map_err(|e| bad_text(3, e))?,
            payload: row.get(4)?,
            created_at: Self::instant_at(row, 5)?,
            retry_count: row.get(6)?,
            last_error: row.get(7)?,
        })
    }

    // --- Products ---

    /// Insert or overwrite a catalog entry. The stored `created_at` survives
    /// an overwrite, and pantry rows pick up a renamed product.
    pub fn upsert_product(&self, product: &Product, now: DateTime<Utc>) -> Result<()> {
        let nutrition_info = product
            .nutrition_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO products (id, name, category, default_shelf_life_days, barcode, image_url, nutrition_info, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                default_shelf_life_days = excluded.default_shelf_life_days,
                barcode = excluded.barcode,
                image_url = excluded.image_url,
                nutrition_info = excluded.nutrition_info",
            params![
                product.id,
                product.name,
                product.category.as_str(),
                product.default_shelf_life_days,
                product.barcode,
                product.image_url,
                nutrition_info,
                now.timestamp_millis(),
            ],
        )?;
        self.conn.execute(
            "UPDATE pantry_items SET product_name = ?1 WHERE product_id = ?2",
            params![product.name, product.id],
        )?;
        Ok(())
    }

    /// Insert the product only if no row with its id exists yet.
    /// Returns `true` when a row was created.
    pub fn ensure_product(&self, product: &Product, now: DateTime<Utc>) -> Result<bool> {
        if self.get_product(&product.id)?.is_some() {
            return Ok(false);
        }
        self.upsert_product(product, now)?;
        Ok(true)
    }

    pub fn get_product(&self, id: &str) -> Result<Option<Product>> {
        let product = self
            .conn
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = ?1"),
                params![id],
                Self::product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    pub fn get_product_by_barcode(&self, barcode: &str) -> Result<Option<Product>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.barcode = ?1 ORDER BY p.created_at LIMIT 1"
        ))?;
        let mut rows = stmt.query(params![barcode])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::product_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_products(&self) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p ORDER BY p.name"
        ))?;
        let products = stmt
            .query_map([], Self::product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    pub fn list_products_by_category(&self, category: ProductCategory) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.category = ?1 ORDER BY p.name"
        ))?;
        let products = stmt
            .query_map(params![category.as_str()], Self::product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    /// Case-insensitive substring match on the product name.
    pub fn search_products(&self, query: &str) -> Result<Vec<Product>> {
        let escaped = query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p
             WHERE p.name LIKE ?1 ESCAPE '\\'
             ORDER BY p.name"
        ))?;
        let products = stmt
            .query_map(params![pattern], Self::product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    pub fn delete_product(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM products WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn count_items_for_product(&self, product_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM pantry_items WHERE product_id = ?1",
            params![product_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // --- Pantry items ---

    /// Insert or overwrite an item. The stored owner and `created_at` survive an overwrite.
    /// The listing name is taken from the catalog row when one exists.
    pub fn upsert_pantry_item(&self, item: &PantryItem) -> Result<()> {
        self.conn.execute(
            "INSERT INTO pantry_items (id, user_id, product_id, product_name, quantity, unit, location,
                                       purchase_date, expiration_date, notes, created_at, updated_at, sync_status)
             VALUES (?1, ?2, ?3, COALESCE((SELECT name FROM products WHERE id = ?3), ?4),
                     ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                product_id = excluded.product_id,
                product_name = excluded.product_name,
                quantity = excluded.quantity,
                unit = excluded.unit,
                location = excluded.location,
                purchase_date = excluded.purchase_date,
                expiration_date = excluded.expiration_date,
                notes = excluded.notes,
                updated_at = excluded.updated_at,
                sync_status = excluded.sync_status",
            params![
                item.id,
                item.user_id,
                item.product.id,
                item.product.name,
                item.quantity,
                item.unit.as_str(),
                item.location.as_str(),
                item.purchase_date.timestamp_millis(),
                item.expiration_date.timestamp_millis(),
                item.notes,
                item.created_at.timestamp_millis(),
                item.updated_at.timestamp_millis(),
                item.sync_status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Fetch one item. Items whose product row is missing are not returned.
    pub fn get_pantry_item(&self, id: &str, now: DateTime<Utc>) -> Result<Option<PantryItem>> {
        let item = self
            .conn
            .query_row(
                &format!("{PANTRY_ITEM_SELECT} WHERE pi.id = ?1"),
                params![id],
                |row| Self::pantry_item_from_row(row, now),
            )
            .optional()?;
        Ok(item)
    }


    pub fn list_pantry_items(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<PantryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PANTRY_ITEM_SELECT} WHERE pi.user_id = ?1 ORDER BY pi.expiration_date, pi.product_name"
        ))?;
        let items = stmt
            .query_map(params![user_id], |row| Self::pantry_item_from_row(row, now))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn list_pantry_items_by_location(
        &self,
        user_id: &str,
        location: StorageLocation,
        now: DateTime<Utc>,
    ) -> Result<Vec<PantryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PANTRY_ITEM_SELECT}
             WHERE pi.user_id = ?1 AND pi.location = ?2
             ORDER BY pi.expiration_date, pi.product_name"
        ))?;
        let items = stmt
            .query_map(params![user_id, location.as_str()], |row| {
                Self::pantry_item_from_row(row, now)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Items expiring at or before `before`, already expired ones included.
    pub fn list_pantry_items_expiring_before(
        &self,
        user_id: &str,
        before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PantryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PANTRY_ITEM_SELECT}
             WHERE pi.user_id = ?1 AND pi.expiration_date <= ?2
             ORDER BY pi.expiration_date, pi.product_name"
        ))?;
        let items = stmt
            .query_map(params![user_id, before.timestamp_millis()], |row| {
                Self::pantry_item_from_row(row, now)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn list_expired_pantry_items(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<PantryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PANTRY_ITEM_SELECT}
             WHERE pi.user_id = ?1 AND pi.expiration_date < ?2
             ORDER BY pi.expiration_date, pi.product_name"
        ))?;
        let items = stmt
            .query_map(params![user_id, now.timestamp_millis()], |row| {
                Self::pantry_item_from_row(row, now)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Set a new quantity and mark the row pending. Returns `false` if no row matched.
    pub fn update_pantry_item_quantity(
        &self,
        id: &str,
        quantity: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE pantry_items SET quantity = ?1, updated_at = ?2, sync_status = ?3 WHERE id = ?4",
            params![
                quantity,
                updated_at.timestamp_millis(),
                SyncStatus::Pending.as_str(),
                id
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_pantry_item(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM pantry_items WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Nutrition logs ---

    pub fn upsert_nutrition_log(&self, log: &NutritionLog) -> Result<()> {
        self.conn.execute(
            "INSERT INTO nutrition_logs (id, user_id, meal_date, meal_type, calories, protein_g, carbs_g,
                                         fat_g, image_url, notes, created_at, sync_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                meal_date = excluded.meal_date,
                meal_type = excluded.meal_type,
                calories = excluded.calories,
                protein_g = excluded.protein_g,
                carbs_g = excluded.carbs_g,
                fat_g = excluded.fat_g,
                image_url = excluded.image_url,
                notes = excluded.notes,
                sync_status = excluded.sync_status",
            params![
                log.id,
                log.user_id,
                log.meal_date.format(DATE_FORMAT).to_string(),
                log.meal_type.as_str(),
                log.calories,
                log.protein_g,
                log.carbs_g,
                log.fat_g,
                log.image_url,
                log.notes,
                log.created_at.timestamp_millis(),
                log.sync_status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_nutrition_log(&self, id: &str) -> Result<Option<NutritionLog>> {
        let log = self
            .conn
            .query_row(
                &format!("{NUTRITION_LOG_SELECT} WHERE id = ?1"),
                params![id],
                Self::nutrition_log_from_row,
            )
            .optional()?;
        Ok(log)
    }

    pub fn list_nutrition_logs(&self, user_id: &str) -> Result<Vec<NutritionLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NUTRITION_LOG_SELECT} WHERE user_id = ?1 ORDER BY meal_date DESC, created_at"
        ))?;
        let logs = stmt
            .query_map(params![user_id], Self::nutrition_log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// Logs with `start <= meal_date <= end`.
    pub fn list_nutrition_logs_between(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NutritionLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NUTRITION_LOG_SELECT}
             WHERE user_id = ?1 AND meal_date >= ?2 AND meal_date <= ?3
             ORDER BY meal_date, created_at"
        ))?;
        let logs = stmt
            .query_map(
                params![
                    user_id,
                    start.format(DATE_FORMAT).to_string(),
                    end.format(DATE_FORMAT).to_string()
                ],
                Self::nutrition_log_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// Per-day sums for days in range that have logs. `meals` is left empty.
    pub fn daily_nutrition_totals(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyNutrition>> {
        let mut stmt = self.conn.prepare(
            "SELECT meal_date, SUM(calories), SUM(protein_g), SUM(carbs_g), SUM(fat_g)
             FROM nutrition_logs
             WHERE user_id = ?1 AND meal_date >= ?2 AND meal_date <= ?3
             GROUP BY meal_date
             ORDER BY meal_date",
        )?;
        let totals = stmt
            .query_map(
                params![
                    user_id,
                    start.format(DATE_FORMAT).to_string(),
                    end.format(DATE_FORMAT).to_string()
                ],
                |row| {
                    Ok(DailyNutrition {
                        date: Self::date_at(row, 0)?,
                        total_calories: row.get(1)?,
                        total_protein: row.get(2)?,
                        total_carbs: row.get(3)?,
                        total_fat: row.get(4)?,
                        meals: Vec::new(),
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(totals)
    }

    /// Average of the daily sums over days in range that have logs.
    pub fn average_daily_nutrition(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<NutritionAverages> {
        let (calories, protein_g, carbs_g, fat_g): (
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
        ) = self.conn.query_row(
            "SELECT AVG(cal), AVG(protein), AVG(carbs), AVG(fat) FROM (
                SELECT SUM(calories) AS cal, SUM(protein_g) AS protein,
                       SUM(carbs_g) AS carbs, SUM(fat_g) AS fat
                FROM nutrition_logs
                WHERE user_id = ?1 AND meal_date >= ?2 AND meal_date <= ?3
                GROUP BY meal_date
            )",
            params![
                user_id,
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string()
            ],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        Ok(NutritionAverages {
            calories: calories.unwrap_or(0.0),
            protein_g: protein_g.unwrap_or(0.0),
            carbs_g: carbs_g.unwrap_or(0.0),
            fat_g: fat_g.unwrap_or(0.0),
        })
    }

    pub fn delete_nutrition_log(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM nutrition_logs WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Receipts ---

    pub fn upsert_receipt(&self, receipt: &Receipt) -> Result<()> {
        let extracted = receipt
            .extracted_items
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO receipts (id, user_id, image_url, scan_date, processed, extracted_items, created_at, sync_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                image_url = excluded.image_url,
                scan_date = excluded.scan_date,
                processed = excluded.processed,
                extracted_items = excluded.extracted_items,
                sync_status = excluded.sync_status",
            params![
                receipt.id,
                receipt.user_id,
                receipt.image_url,
                receipt.scan_date.timestamp_millis(),
                receipt.processed,
                extracted,
                receipt.created_at.timestamp_millis(),
                receipt.sync_status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_receipt(&self, id: &str) -> Result<Option<Receipt>> {
        let receipt = self
            .conn
            .query_row(
                &format!("{RECEIPT_SELECT} WHERE id = ?1"),
                params![id],
                Self::receipt_from_row,
            )
            .optional()?;
        Ok(receipt)
    }

    pub fn list_receipts(&self, user_id: &str) -> Result<Vec<Receipt>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RECEIPT_SELECT} WHERE user_id = ?1 ORDER BY scan_date DESC"
        ))?;
        let receipts = stmt
            .query_map(params![user_id], Self::receipt_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(receipts)
    }

    pub fn delete_receipt(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM receipts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // --- Sync status ---

    pub fn set_sync_status(
        &self,
        entity_type: EntityType,
        id: &str,
        status: SyncStatus,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            &format!(
                "UPDATE {} SET sync_status = ?1 WHERE id = ?2",
                entity_type.table_name()
            ),
            params![status.as_str(), id],
        )?;
        Ok(rows > 0)
    }

    /// The user owning a row, or `None` if no row has this id.
    pub fn owner_of(&self, entity_type: EntityType, id: &str) -> Result<Option<String>> {
        let owner = self
            .conn
            .query_row(
                &format!(
                    "SELECT user_id FROM {} WHERE id = ?1",
                    entity_type.table_name()
                ),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    /// Move every ERROR row of the user back to PENDING. Returns the number of rows moved.
    pub fn reset_errored(&self, user_id: &str) -> Result<usize> {
        let mut total = 0;
        for entity_type in EntityType::ALL {
            total += self.conn.execute(
                &format!(
                    "UPDATE {} SET sync_status = ?1 WHERE sync_status = ?2 AND user_id = ?3",
                    entity_type.table_name()
                ),
                params![
                    SyncStatus::Pending.as_str(),
                    SyncStatus::Error.as_str(),
                    user_id
                ],
            )?;
        }
        Ok(total)
    }

    pub fn sync_status_counts(&self, user_id: &str) -> Result<SyncStatusCounts> {
        let mut counts = SyncStatusCounts::default();
        for entity_type in EntityType::ALL {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT sync_status, COUNT(*) FROM {} WHERE user_id = ?1 GROUP BY sync_status",
                entity_type.table_name()
            ))?;
            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (status, n) in rows {
                match SyncStatus::from_db(&status) {
                    SyncStatus::Synced => counts.synced += n,
                    SyncStatus::Pending => counts.pending += n,
                    SyncStatus::Error => counts.error += n,
                }
            }
        }
        counts.queued = self
            .conn
            .query_row("SELECT COUNT(*) FROM pending_sync", [], |row| row.get(0))?;
        Ok(counts)
    }

    // --- Pending sync queue ---

    /// Queue a mutation, folding it into any row already queued for the same entity.
    pub fn enqueue_sync(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation: SyncOperation,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(queued) = self.get_pending_sync(entity_type, entity_id)? else {
            self.conn.execute(
                "INSERT INTO pending_sync (id, entity_type, entity_id, operation, payload, created_at, retry_count, last_error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL)",
                params![
                    Uuid::new_v4().to_string(),
                    entity_type.as_str(),
                    entity_id,
                    operation.as_str(),
                    payload,
                    now.timestamp_millis(),
                ],
            )?;
            return Ok(());
        };

        match SyncOperation::coalesce(queued.operation, operation) {
            Some(merged) => {
                self.conn.execute(
                    "UPDATE pending_sync
                     SET operation = ?1, payload = ?2, retry_count = 0, last_error = NULL
                     WHERE id = ?3",
                    params![merged.as_str(), payload, queued.id],
                )?;
            }
            None => {
                self.delete_pending_sync(&queued.id)?;
            }
        }
        Ok(())
    }

    pub fn get_pending_sync(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<PendingSync>> {
        let pending = self
            .conn
            .query_row(
                &format!("{PENDING_SYNC_SELECT} WHERE entity_type = ?1 AND entity_id = ?2"),
                params![entity_type.as_str(), entity_id],
                Self::pending_sync_from_row,
            )
            .optional()?;
        Ok(pending)
    }

    /// The whole queue, oldest first.
    pub fn list_pending_sync(&self) -> Result<Vec<PendingSync>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PENDING_SYNC_SELECT} ORDER BY created_at, rowid"
        ))?;
        let pending = stmt
            .query_map([], Self::pending_sync_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pending)
    }

    pub fn record_sync_failure(&self, id: &str, error: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE pending_sync SET retry_count = retry_count + 1, last_error = ?1 WHERE id = ?2",
            params![error, id],
        )?;
        Ok(rows > 0)
    }

    pub fn delete_pending_sync(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM pending_sync WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn clear_pending_sync(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM pending_sync", [])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn milk() -> Product {
        Product {
            id: "prod-milk".to_string(),
            name: "Milk".to_string(),
            category: ProductCategory::Dairy,
            default_shelf_life_days: 7,
            barcode: Some("4006381333931".to_string()),
            image_url: None,
            nutrition_info: Some(crate::models::NutritionInfo {
                serving_size: "250ml".to_string(),
                calories: 150,
                protein_g: 8.0,
                carbs_g: 12.0,
                fat_g: 8.0,
                fiber_g: None,
                sugar_g: Some(12.0),
                sodium_mg: Some(105.0),
            }),
        }
    }

    fn item(id: &str, product: &Product, expires_in: Duration) -> PantryItem {
        PantryItem {
            id: id.to_string(),
            user_id: "alice".to_string(),
            product: product.clone(),
            quantity: 1,
            unit: MeasurementUnit::Liters,
            location: StorageLocation::Fridge,
            purchase_date: now() - Duration::days(1),
            expiration_date: now() + expires_in,
            notes: None,
            sync_status: SyncStatus::Pending,
            status: ItemStatus::from_expiration(now() + expires_in, now()),
            created_at: now(),
            updated_at: now(),
        }
    }

    fn log(id: &str, date: NaiveDate, calories: i64) -> NutritionLog {
        NutritionLog {
            id: id.to_string(),
            user_id: "alice".to_string(),
            meal_date: date,
            meal_type: MealType::Lunch,
            calories,
            protein_g: 10.0,
            carbs_g: 20.0,
            fat_g: 5.0,
            image_url: None,
            notes: None,
            sync_status: SyncStatus::Pending,
            created_at: now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_upsert_and_get_product() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&milk(), now()).unwrap();

        let fetched = db.get_product("prod-milk").unwrap().unwrap();
        assert_eq!(fetched, milk());
        assert!(db.get_product("nope").unwrap().is_none());
    }

    #[test]
    fn test_get_product_by_barcode() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&milk(), now()).unwrap();

        let found = db.get_product_by_barcode("4006381333931").unwrap().unwrap();
        assert_eq!(found.id, "prod-milk");
        assert!(db.get_product_by_barcode("0000").unwrap().is_none());
    }

    #[test]
    fn test_ensure_product_does_not_overwrite() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.ensure_product(&milk(), now()).unwrap());

        let mut renamed = milk();
        renamed.name = "Oat Milk".to_string();
        assert!(!db.ensure_product(&renamed, now()).unwrap());
        assert_eq!(db.get_product("prod-milk").unwrap().unwrap().name, "Milk");
    }

    #[test]
    fn test_upsert_product_keeps_created_at_and_renames_items() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&milk(), now()).unwrap();
        db.upsert_pantry_item(&item("i1", &milk(), Duration::days(5)))
            .unwrap();

        let mut renamed = milk();
        renamed.name = "Whole Milk".to_string();
        db.upsert_product(&renamed, now() + Duration::days(1))
            .unwrap();

        let created: i64 = db
            .conn
            .query_row(
                "SELECT created_at FROM products WHERE id = 'prod-milk'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(created, now().timestamp_millis());

        let product_name: String = db
            .conn
            .query_row(
                "SELECT product_name FROM pantry_items WHERE id = 'i1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(product_name, "Whole Milk");
    }

    #[test]
    fn test_search_and_category_filters() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&milk(), now()).unwrap();
        db.upsert_product(&Product::new("Apples", ProductCategory::Fruits, 14), now())
            .unwrap();
        db.upsert_product(&Product::new("100% Juice", ProductCategory::Beverages, 10), now())
            .unwrap();

        assert_eq!(db.list_products().unwrap().len(), 3);
        let hits = db.search_products("MIL").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Milk");
        // '%' is matched literally
        assert_eq!(db.search_products("100%").unwrap().len(), 1);
        assert_eq!(db.search_products("%").unwrap().len(), 1);

        let fruits = db.list_products_by_category(ProductCategory::Fruits).unwrap();
        assert_eq!(fruits.len(), 1);
        assert_eq!(fruits[0].name, "Apples");
    }

    #[test]
    fn test_unreadable_nutrition_json_reads_as_none() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&milk(), now()).unwrap();
        db.conn
            .execute(
                "UPDATE products SET nutrition_info = '{broken' WHERE id = 'prod-milk'",
                [],
            )
            .unwrap();
        assert!(db
            .get_product("prod-milk")
            .unwrap()
            .unwrap()
            .nutrition_info
            .is_none());
    }

    #[test]
    fn test_pantry_item_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&milk(), now()).unwrap();
        let inserted = item("i1", &milk(), Duration::days(2));
        db.upsert_pantry_item(&inserted).unwrap();

        let fetched = db.get_pantry_item("i1", now()).unwrap().unwrap();
        assert_eq!(fetched, inserted);
        assert_eq!(fetched.status, ItemStatus::ExpiringSoon);

        // Status is recomputed against the read time
        let later = db
            .get_pantry_item("i1", now() + Duration::days(3))
            .unwrap()
            .unwrap();
        assert_eq!(later.status, ItemStatus::Expired);
    }

    #[test]
    fn test_orphan_pantry_item_is_skipped() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_pantry_item(&item("i1", &milk(), Duration::days(2)))
            .unwrap();
        assert_eq!(
            db.owner_of(EntityType::PantryItem, "i1").unwrap().as_deref(),
            Some("alice")
        );
        assert!(db.get_pantry_item("i1", now()).unwrap().is_none());
        assert!(db.list_pantry_items("alice", now()).unwrap().is_empty());
    }

    #[test]
    fn test_list_pantry_filters() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&milk(), now()).unwrap();
        db.upsert_pantry_item(&item("soon", &milk(), Duration::days(2)))
            .unwrap();
        db.upsert_pantry_item(&item("later", &milk(), Duration::days(20)))
            .unwrap();
        db.upsert_pantry_item(&item("gone", &milk(), -Duration::days(1)))
            .unwrap();
        let mut frozen = item("frozen", &milk(), Duration::days(90));
        frozen.location = StorageLocation::Freezer;
        db.upsert_pantry_item(&frozen).unwrap();
        let mut other_user = item("bob", &milk(), Duration::days(1));
        other_user.user_id = "bob".to_string();
        db.upsert_pantry_item(&other_user).unwrap();

        let all = db.list_pantry_items("alice", now()).unwrap();
        let ids: Vec<&str> = all.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["gone", "soon", "later", "frozen"]);

        let freezer = db
            .list_pantry_items_by_location("alice", StorageLocation::Freezer, now())
            .unwrap();
        assert_eq!(freezer.len(), 1);
        assert_eq!(freezer[0].id, "frozen");

        let expiring = db
            .list_pantry_items_expiring_before("alice", now() + Duration::days(3), now())
            .unwrap();
        let ids: Vec<&str> = expiring.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["gone", "soon"]);

        let expired = db.list_expired_pantry_items("alice", now()).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "gone");
        assert_eq!(expired[0].status, ItemStatus::Expired);
    }

    #[test]
    fn test_update_quantity_marks_pending() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&milk(), now()).unwrap();
        let mut synced = item("i1", &milk(), Duration::days(5));
        synced.sync_status = SyncStatus::Synced;
        db.upsert_pantry_item(&synced).unwrap();

        let later = now() + Duration::hours(1);
        assert!(db.update_pantry_item_quantity("i1", 4, later).unwrap());
        let fetched = db.get_pantry_item("i1", now()).unwrap().unwrap();
        assert_eq!(fetched.quantity, 4);
        assert_eq!(fetched.sync_status, SyncStatus::Pending);
        assert_eq!(fetched.updated_at, later);

        assert!(!db.update_pantry_item_quantity("missing", 4, later).unwrap());
    }

    #[test]
    fn test_upsert_pantry_item_keeps_owner_and_created_at() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&milk(), now()).unwrap();
        db.upsert_pantry_item(&item("i1", &milk(), Duration::days(5)))
            .unwrap();

        let mut edited = item("i1", &milk(), Duration::days(6));
        edited.user_id = "bob".to_string();
        edited.created_at = now() + Duration::days(1);
        edited.updated_at = now() + Duration::days(1);
        db.upsert_pantry_item(&edited).unwrap();

        let fetched = db.get_pantry_item("i1", now()).unwrap().unwrap();
        assert_eq!(fetched.user_id, "alice");
        assert_eq!(fetched.created_at, now());
        assert_eq!(fetched.updated_at, now() + Duration::days(1));
        assert_eq!(fetched.expiration_date, now() + Duration::days(6));
    }

    #[test]
    fn test_delete_pantry_item() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&milk(), now()).unwrap();
        db.upsert_pantry_item(&item("i1", &milk(), Duration::days(5)))
            .unwrap();
        assert_eq!(db.count_items_for_product("prod-milk").unwrap(), 1);

        assert!(db.delete_pantry_item("i1").unwrap());
        assert!(!db.delete_pantry_item("i1").unwrap());
        assert_eq!(db.count_items_for_product("prod-milk").unwrap(), 0);
    }

    #[test]
    fn test_nutrition_logs_by_range_and_totals() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_nutrition_log(&log("a", day(14), 400)).unwrap();
        db.upsert_nutrition_log(&log("b", day(15), 500)).unwrap();
        db.upsert_nutrition_log(&log("c", day(15), 300)).unwrap();
        db.upsert_nutrition_log(&log("d", day(20), 900)).unwrap();

        let fetched = db.get_nutrition_log("b").unwrap().unwrap();
        assert_eq!(fetched, log("b", day(15), 500));

        let range = db
            .list_nutrition_logs_between("alice", day(14), day(15))
            .unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(db.list_nutrition_logs("alice").unwrap().len(), 4);
        assert!(db.list_nutrition_logs("bob").unwrap().is_empty());

        let totals = db.daily_nutrition_totals("alice", day(14), day(15)).unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[1].date, day(15));
        assert_eq!(totals[1].total_calories, 800);
        assert!((totals[1].total_protein - 20.0).abs() < f64::EPSILON);
        assert!(totals[1].meals.is_empty());
    }

    #[test]
    fn test_average_daily_nutrition() {
        let db = Database::open_in_memory().unwrap();
        let empty = db.average_daily_nutrition("alice", day(1), day(30)).unwrap();
        assert_eq!(empty, NutritionAverages::default());

        db.upsert_nutrition_log(&log("a", day(14), 400)).unwrap();
        db.upsert_nutrition_log(&log("b", day(15), 500)).unwrap();
        db.upsert_nutrition_log(&log("c", day(15), 300)).unwrap();

        // (400 + 800) / 2 days
        let avg = db.average_daily_nutrition("alice", day(9), day(15)).unwrap();
        assert!((avg.calories - 600.0).abs() < 0.01);
        assert!((avg.protein_g - 15.0).abs() < 0.01);
        assert!((avg.carbs_g - 30.0).abs() < 0.01);
        assert!((avg.fat_g - 7.5).abs() < 0.01);
    }

    #[test]
    fn test_receipt_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let mut receipt = Receipt {
            id: "r1".to_string(),
            user_id: "alice".to_string(),
            image_url: "file:///receipts/r1.jpg".to_string(),
            scan_date: now(),
            processed: false,
            extracted_items: None,
            sync_status: SyncStatus::Pending,
            created_at: now(),
        };
        db.upsert_receipt(&receipt).unwrap();
        assert_eq!(db.get_receipt("r1").unwrap().unwrap(), receipt);

        receipt.processed = true;
        receipt.extracted_items = Some(vec![ReceiptItem {
            name: "Bananas".to_string(),
            quantity: 6,
            price: Some(1.99),
            category: Some(ProductCategory::Fruits),
        }]);
        db.upsert_receipt(&receipt).unwrap();
        let fetched = db.get_receipt("r1").unwrap().unwrap();
        assert!(fetched.processed);
        assert_eq!(fetched.extracted_items, receipt.extracted_items);
        assert_eq!(db.list_receipts("alice").unwrap().len(), 1);

        assert!(db.delete_receipt("r1").unwrap());
        assert!(!db.delete_receipt("r1").unwrap());
        assert!(db.owner_of(EntityType::Receipt, "r1").unwrap().is_none());
    }

    #[test]
    fn test_enqueue_and_coalesce() {
        let db = Database::open_in_memory().unwrap();
        db.enqueue_sync(EntityType::PantryItem, "i1", SyncOperation::Create, "{\"v\":1}", now())
            .unwrap();
        db.enqueue_sync(EntityType::PantryItem, "i1", SyncOperation::Update, "{\"v\":2}", now())
            .unwrap();

        let queue = db.list_pending_sync().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].operation, SyncOperation::Create);
        assert_eq!(queue[0].payload, "{\"v\":2}");

        // Deleting something never uploaded leaves nothing to send
        db.enqueue_sync(EntityType::PantryItem, "i1", SyncOperation::Delete, "{}", now())
            .unwrap();
        assert!(db.list_pending_sync().unwrap().is_empty());
    }

    #[test]
    fn test_enqueue_resets_failure_state() {
        let db = Database::open_in_memory().unwrap();
        db.enqueue_sync(EntityType::NutritionLog, "n1", SyncOperation::Update, "{}", now())
            .unwrap();
        let queued = db
            .get_pending_sync(EntityType::NutritionLog, "n1")
            .unwrap()
            .unwrap();
        assert!(db.record_sync_failure(&queued.id, "timeout").unwrap());
        assert!(db.record_sync_failure(&queued.id, "refused").unwrap());

        let failed = db
            .get_pending_sync(EntityType::NutritionLog, "n1")
            .unwrap()
            .unwrap();
        assert_eq!(failed.retry_count, 2);
        assert_eq!(failed.last_error.as_deref(), Some("refused"));

        db.enqueue_sync(EntityType::NutritionLog, "n1", SyncOperation::Delete, "{}", now())
            .unwrap();
        let replaced = db
            .get_pending_sync(EntityType::NutritionLog, "n1")
            .unwrap()
            .unwrap();
        assert_eq!(replaced.id, queued.id);
        assert_eq!(replaced.operation, SyncOperation::Delete);
        assert_eq!(replaced.retry_count, 0);
        assert!(replaced.last_error.is_none());
    }

    #[test]
    fn test_pending_sync_is_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        db.enqueue_sync(EntityType::Receipt, "r1", SyncOperation::Create, "{}", now() + Duration::seconds(5))
            .unwrap();
        db.enqueue_sync(EntityType::PantryItem, "i1", SyncOperation::Create, "{}", now())
            .unwrap();

        let queue = db.list_pending_sync().unwrap();
        assert_eq!(queue[0].entity_id, "i1");
        assert_eq!(queue[1].entity_id, "r1");

        assert_eq!(db.clear_pending_sync().unwrap(), 2);
        assert!(db.list_pending_sync().unwrap().is_empty());
    }

    #[test]
    fn test_sync_status_transitions_and_counts() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_product(&milk(), now()).unwrap();
        db.upsert_pantry_item(&item("i1", &milk(), Duration::days(5)))
            .unwrap();
        db.upsert_pantry_item(&item("i2", &milk(), Duration::days(5)))
            .unwrap();
        db.upsert_nutrition_log(&log("n1", day(15), 500)).unwrap();
        db.enqueue_sync(EntityType::PantryItem, "i1", SyncOperation::Create, "{}", now())
            .unwrap();

        assert!(db
            .set_sync_status(EntityType::PantryItem, "i1", SyncStatus::Synced)
            .unwrap());
        assert!(db
            .set_sync_status(EntityType::NutritionLog, "n1", SyncStatus::Error)
            .unwrap());
        assert!(!db
            .set_sync_status(EntityType::Receipt, "missing", SyncStatus::Synced)
            .unwrap());

        let counts = db.sync_status_counts("alice").unwrap();
        assert_eq!(
            counts,
            SyncStatusCounts {
                synced: 1,
                pending: 1,
                error: 1,
                queued: 1,
            }
        );

        assert_eq!(db.reset_errored("alice").unwrap(), 1);
        assert_eq!(
            db.get_nutrition_log("n1").unwrap().unwrap().sync_status,
            SyncStatus::Pending
        );
    }

    #[test]
    fn test_transaction_rolls_back_on_drop() {
        let db = Database::open_in_memory().unwrap();
        {
            let _tx = db.transaction().unwrap();
            db.upsert_product(&milk(), now()).unwrap();
        }
        assert!(db.get_product("prod-milk").unwrap().is_none());

        let tx = db.transaction().unwrap();
        db.upsert_product(&milk(), now()).unwrap();
        tx.commit().unwrap();
        assert!(db.get_product("prod-milk").unwrap().is_some());
    }

    #[test]
    fn test_open_on_disk_persists_and_migrates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pantry.db");
        {
            let db = Database::open(&path).unwrap();
            db.upsert_product(&milk(), now()).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert!(db.get_product("prod-milk").unwrap().is_some());
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
