use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Items with this many days or fewer left are reported as expiring soon.
pub const EXPIRING_SOON_DAYS: i64 = 3;

/// Longest shelf life a product may declare.
pub const MAX_SHELF_LIFE_DAYS: i64 = 36_500;

// --- Catalog ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductCategory {
    Fruits,
    Vegetables,
    Dairy,
    Meat,
    Seafood,
    Grains,
    Bakery,
    Beverages,
    Snacks,
    Condiments,
    Frozen,
    Canned,
    Other,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 13] = [
        Self::Fruits,
        Self::Vegetables,
        Self::Dairy,
        Self::Meat,
        Self::Seafood,
        Self::Grains,
        Self::Bakery,
        Self::Beverages,
        Self::Snacks,
        Self::Condiments,
        Self::Frozen,
        Self::Canned,
        Self::Other,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fruits => "FRUITS",
            Self::Vegetables => "VEGETABLES",
            Self::Dairy => "DAIRY",
            Self::Meat => "MEAT",
            Self::Seafood => "SEAFOOD",
            Self::Grains => "GRAINS",
            Self::Bakery => "BAKERY",
            Self::Beverages => "BEVERAGES",
            Self::Snacks => "SNACKS",
            Self::Condiments => "CONDIMENTS",
            Self::Frozen => "FROZEN",
            Self::Canned => "CANNED",
            Self::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let upper = value.trim().to_uppercase();
        match Self::ALL.iter().find(|c| c.as_str() == upper) {
            Some(c) => Ok(*c),
            None => bail!(
                "Invalid category '{value}'. Must be one of: {}",
                Self::ALL
                    .iter()
                    .map(|c| c.as_str().to_lowercase())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Lenient mapping for stored values; anything unrecognised is `Other`.
    #[must_use]
    pub fn from_db(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::Other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionInfo {
    pub serving_size: String,
    pub calories: i64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiber_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sugar_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sodium_mg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: ProductCategory,
    pub default_shelf_life_days: i64,
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition_info: Option<NutritionInfo>,
}

impl Product {
    /// A fresh catalog entry with a generated id.
    #[must_use]
    pub fn new(name: &str, category: ProductCategory, default_shelf_life_days: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            category,
            default_shelf_life_days,
            barcode: None,
            image_url: None,
            nutrition_info: None,
        }
    }

    #[must_use]
    pub fn with_barcode(mut self, barcode: &str) -> Self {
        self.barcode = Some(barcode.to_string());
        self
    }

    /// Expiration implied by the shelf life when nothing better is known.
    pub fn default_expiration(&self, purchased: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Duration::try_days(self.default_shelf_life_days)
            .and_then(|shelf_life| purchased.checked_add_signed(shelf_life))
            .context("Shelf life runs past the supported date range")
    }
}

pub fn validate_product(product: &Product) -> Result<()> {
    if product.id.trim().is_empty() {
        bail!("Product id must not be empty");
    }
    if product.name.trim().is_empty() {
        bail!("Product name must not be empty");
    }
    if product.default_shelf_life_days < 0 {
        bail!("Shelf life cannot be negative");
    }
    if product.default_shelf_life_days > MAX_SHELF_LIFE_DAYS {
        bail!("Shelf life cannot exceed {MAX_SHELF_LIFE_DAYS} days");
    }
    Ok(())
}

// --- Pantry ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageLocation {
    Fridge,
    Pantry,
    Freezer,
}

impl StorageLocation {
    pub const ALL: [StorageLocation; 3] = [Self::Fridge, Self::Pantry, Self::Freezer];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fridge => "FRIDGE",
            Self::Pantry => "PANTRY",
            Self::Freezer => "FREEZER",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_uppercase().as_str() {
            "FRIDGE" => Ok(Self::Fridge),
            "PANTRY" => Ok(Self::Pantry),
            "FREEZER" => Ok(Self::Freezer),
            _ => bail!("Invalid location '{value}'. Must be one of: fridge, pantry, freezer"),
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::Pantry)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementUnit {
    #[serde(rename = "units")]
    Units,
    #[serde(rename = "kg")]
    Kilograms,
    #[serde(rename = "g")]
    Grams,
    #[serde(rename = "L")]
    Liters,
    #[serde(rename = "mL")]
    Milliliters,
    #[serde(rename = "lb")]
    Pounds,
    #[serde(rename = "oz")]
    Ounces,
}

impl MeasurementUnit {
    /// Short display form, also the stored representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Units => "units",
            Self::Kilograms => "kg",
            Self::Grams => "g",
            Self::Liters => "L",
            Self::Milliliters => "mL",
            Self::Pounds => "lb",
            Self::Ounces => "oz",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "units" | "unit" | "pcs" => Ok(Self::Units),
            "kg" | "kilogram" | "kilograms" => Ok(Self::Kilograms),
            "g" | "gram" | "grams" => Ok(Self::Grams),
            "l" | "liter" | "liters" | "litre" | "litres" => Ok(Self::Liters),
            "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => {
                Ok(Self::Milliliters)
            }
            "lb" | "lbs" | "pound" | "pounds" => Ok(Self::Pounds),
            "oz" | "ounce" | "ounces" => Ok(Self::Ounces),
            _ => bail!("Unknown unit '{value}'. Supported: units, kg, g, L, mL, lb, oz"),
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::Units)
    }
}

/// Freshness of an item relative to a point in time. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Fresh,
    ExpiringSoon,
    Expired,
}

impl ItemStatus {
    /// Derive the status from the time left until `expiration` as seen at `now`.
    ///
    /// Both boundaries are inclusive on the expiring-soon side: exactly three
    /// days left and exactly zero left are both `ExpiringSoon`.
    #[must_use]
    pub fn from_expiration(expiration: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let remaining = expiration - now;
        if remaining < Duration::zero() {
            Self::Expired
        } else if remaining <= Duration::days(EXPIRING_SOON_DAYS) {
            Self::ExpiringSoon
        } else {
            Self::Fresh
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "FRESH",
            Self::ExpiringSoon => "EXPIRING_SOON",
            Self::Expired => "EXPIRED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PantryItem {
    pub id: String,
    pub user_id: String,
    pub product: Product,
    pub quantity: i64,
    pub unit: MeasurementUnit,
    pub location: StorageLocation,
    pub purchase_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub sync_status: SyncStatus,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPantryItem {
    pub product: Product,
    pub quantity: i64,
    pub unit: MeasurementUnit,
    pub location: StorageLocation,
    pub purchase_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub notes: Option<String>,
}

pub fn validate_quantity(quantity: i64) -> Result<()> {
    if quantity < 0 {
        bail!("Quantity cannot be negative (got {quantity})");
    }
    Ok(())
}

// --- Nutrition ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    pub const ALL: [MealType; 4] = [Self::Breakfast, Self::Lunch, Self::Dinner, Self::Snack];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "BREAKFAST",
            Self::Lunch => "LUNCH",
            Self::Dinner => "DINNER",
            Self::Snack => "SNACK",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_uppercase().as_str() {
            "BREAKFAST" => Ok(Self::Breakfast),
            "LUNCH" => Ok(Self::Lunch),
            "DINNER" => Ok(Self::Dinner),
            "SNACK" => Ok(Self::Snack),
            _ => bail!(
                "Invalid meal type '{value}'. Must be one of: breakfast, lunch, dinner, snack"
            ),
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::Snack)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionLog {
    pub id: String,
    pub user_id: String,
    pub meal_date: NaiveDate,
    pub meal_type: MealType,
    pub calories: i64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNutritionLog {
    pub meal_date: NaiveDate,
    pub meal_type: MealType,
    pub calories: i64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub image_url: Option<String>,
    pub notes: Option<String>,
}

pub fn validate_nutrition(calories: i64, protein_g: f64, carbs_g: f64, fat_g: f64) -> Result<()> {
    if calories < 0 || protein_g < 0.0 || carbs_g < 0.0 || fat_g < 0.0 {
        bail!("Nutrition values cannot be negative");
    }
    if !(protein_g.is_finite() && carbs_g.is_finite() && fat_g.is_finite()) {
        bail!("Nutrition values must be finite numbers");
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyNutrition {
    pub date: NaiveDate,
    pub total_calories: i64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub meals: Vec<NutritionLog>,
}

/// Per-day averages over the days that have at least one log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NutritionAverages {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

// --- Receipts ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ProductCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub id: String,
    pub user_id: String,
    pub image_url: String,
    pub scan_date: DateTime<Utc>,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_items: Option<Vec<ReceiptItem>>,
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub image_url: String,
    pub scan_date: DateTime<Utc>,
}

pub fn validate_receipt_items(items: &[ReceiptItem]) -> Result<()> {
    for item in items {
        if item.name.trim().is_empty() {
            bail!("Receipt item name must not be empty");
        }
        validate_quantity(item.quantity)?;
        if item.price.is_some_and(|p| p < 0.0) {
            bail!("Price of '{}' cannot be negative", item.name);
        }
    }
    Ok(())
}

// --- Sync ---

/// Whether a local mutation has been confirmed by the remote backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Synced,
    Pending,
    Error,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "SYNCED",
            Self::Pending => "PENDING",
            Self::Error => "ERROR",
        }
    }

    /// Unknown stored values are treated as not yet uploaded.
    #[must_use]
    pub fn from_db(value: &str) -> Self {
        match value {
            "SYNCED" => Self::Synced,
            "ERROR" => Self::Error,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    PantryItem,
    NutritionLog,
    Receipt,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [Self::PantryItem, Self::NutritionLog, Self::Receipt];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PantryItem => "PANTRY_ITEM",
            Self::NutritionLog => "NUTRITION_LOG",
            Self::Receipt => "RECEIPT",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "PANTRY_ITEM" => Ok(Self::PantryItem),
            "NUTRITION_LOG" => Ok(Self::NutritionLog),
            "RECEIPT" => Ok(Self::Receipt),
            _ => bail!("Unknown entity type '{value}'"),
        }
    }

    /// Table holding rows of this entity type.
    #[must_use]
    pub fn table_name(self) -> &'static str {
        match self {
            Self::PantryItem => "pantry_items",
            Self::NutritionLog => "nutrition_logs",
            Self::Receipt => "receipts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => bail!("Unknown sync operation '{value}'"),
        }
    }

    /// Fold a new mutation into the one already queued for the same entity.
    /// `None` means the queued row should be dropped entirely.
    #[must_use]
    pub fn coalesce(queued: Self, incoming: Self) -> Option<Self> {
        match (queued, incoming) {
            (Self::Create, Self::Delete) => None,
            (Self::Create, _) => Some(Self::Create),
            (_, op) => Some(op),
        }
    }
}

/// A local mutation waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingSync {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: SyncOperation,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub retry_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Row counts per sync status across all syncable tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatusCounts {
    pub synced: i64,
    pub pending: i64,
    pub error: i64,
    pub queued: i64,
}
