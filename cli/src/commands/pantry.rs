use anyhow::{Result, bail};

use pantry_core::models::{
    MeasurementUnit, NewPantryItem, PantryItem, Product, ProductCategory, StorageLocation,
    validate_product,
};
use pantry_core::repository::{PantryRepository, ProductRepository};
use pantry_core::service::PantryService;

use super::helpers::{
    delete_message, describe_expiry, exit_not_found, parse_category, parse_date, parse_instant,
    print_item_table, start_of_day, status_label,
};

/// Shelf life given to products created on the fly by `pantry add`.
const DEFAULT_SHELF_LIFE_DAYS: i64 = 7;

pub(crate) struct AddItemArgs {
    pub product: String,
    pub quantity: i64,
    pub unit: String,
    pub location: String,
    pub purchased: Option<String>,
    pub expires: Option<String>,
    pub category: Option<String>,
    pub shelf_life: Option<i64>,
    pub notes: Option<String>,
}

pub(crate) struct UpdateItemArgs {
    pub quantity: Option<i64>,
    pub expires: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Find a catalog product by id, barcode or exact name (case-insensitive).
/// Anything else becomes a new, not yet stored product.
fn resolve_product(
    svc: &PantryService,
    query: &str,
    category: Option<&str>,
    shelf_life: Option<i64>,
) -> Result<Product> {
    let query = query.trim();
    if query.is_empty() {
        bail!("Product must not be empty");
    }
    if let Some(p) = svc.product_by_id(query)? {
        return Ok(p);
    }
    if let Some(p) = svc.product_by_barcode(query)? {
        return Ok(p);
    }
    if let Some(p) = svc
        .search_products(query)?
        .into_iter()
        .find(|p| p.name.to_lowercase() == query.to_lowercase())
    {
        return Ok(p);
    }

    let category = parse_category(category)?.unwrap_or(ProductCategory::Other);
    Ok(Product::new(
        query,
        category,
        shelf_life.unwrap_or(DEFAULT_SHELF_LIFE_DAYS),
    ))
}

fn print_item(item: &PantryItem, svc: &PantryService) {
    let now = svc.now();
    println!("{} [{}]", item.product.name, item.id);
    println!("  Quantity:  {} {}", item.quantity, item.unit.as_str());
    println!("  Location:  {}", item.location.as_str().to_lowercase());
    println!("  Purchased: {}", item.purchase_date.format("%Y-%m-%d"));
    println!(
        "  Expires:   {} ({}, {})",
        item.expiration_date.format("%Y-%m-%d"),
        describe_expiry(item.expiration_date, now),
        status_label(item.status)
    );
    if let Some(ref n) = item.notes {
        println!("  Notes:     {n}");
    }
    println!("  Sync:      {}", item.sync_status.as_str().to_lowercase());
}

fn print_items(svc: &PantryService, items: &[PantryItem], empty_message: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
    } else if items.is_empty() {
        eprintln!("{empty_message}");
    } else {
        print_item_table(items, svc.now());
    }
    Ok(())
}

pub(crate) fn cmd_add(svc: &PantryService, args: AddItemArgs, json: bool) -> Result<()> {
    let unit = MeasurementUnit::parse(&args.unit)?;
    let location = StorageLocation::parse(&args.location)?;
    let product = resolve_product(
        svc,
        &args.product,
        args.category.as_deref(),
        args.shelf_life,
    )?;

    let purchase_date = parse_instant(args.purchased, svc.now(), svc.today())?;
    let expiration_date = match args.expires {
        Some(s) => start_of_day(parse_date(Some(s), svc.today())?),
        None => {
            validate_product(&product)?;
            product.default_expiration(purchase_date)?
        }
    };

    let item = svc.add_item(NewPantryItem {
        product,
        quantity: args.quantity,
        unit,
        location,
        purchase_date,
        expiration_date,
        notes: args.notes,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!(
            "Added {} {} {} to {}, expires {} ({}) [id: {}]",
            item.quantity,
            item.unit.as_str(),
            item.product.name,
            item.location.as_str().to_lowercase(),
            item.expiration_date.format("%Y-%m-%d"),
            describe_expiry(item.expiration_date, svc.now()),
            item.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_list(svc: &PantryService, location: Option<&str>, json: bool) -> Result<()> {
    let items = match location {
        Some(l) => svc.items_by_location(StorageLocation::parse(l)?)?,
        None => svc.all_items()?,
    };
    print_items(
        svc,
        &items,
        "Your pantry is empty. Use `pantry add` to add an item.",
        json,
    )
}

pub(crate) fn cmd_expiring(svc: &PantryService, days: i64, json: bool) -> Result<()> {
    let items = svc.expiring_items(days)?;
    print_items(
        svc,
        &items,
        &format!("Nothing expires within {days} days."),
        json,
    )
}

pub(crate) fn cmd_expired(svc: &PantryService, json: bool) -> Result<()> {
    let items = svc.expired_items()?;
    print_items(svc, &items, "Nothing has expired.", json)
}

pub(crate) fn cmd_show(svc: &PantryService, id: &str, json: bool) -> Result<()> {
    let Some(item) = svc.item_by_id(id)? else {
        exit_not_found(&format!("Item {id} not found"), json);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        print_item(&item, svc);
    }
    Ok(())
}

pub(crate) fn cmd_update(
    svc: &PantryService,
    id: &str,
    args: UpdateItemArgs,
    json: bool,
) -> Result<()> {
    if args.quantity.is_none()
        && args.expires.is_none()
        && args.location.is_none()
        && args.notes.is_none()
    {
        bail!("Nothing to update. Provide at least one of --quantity, --expires, --location, or --notes");
    }

    let Some(current) = svc.item_by_id(id)? else {
        exit_not_found(&format!("Item {id} not found"), json);
    };

    let item = if args.expires.is_none() && args.location.is_none() && args.notes.is_none() {
        let quantity = args.quantity.unwrap_or(current.quantity);
        svc.update_quantity(id, quantity)?
    } else {
        let mut edited = current;
        if let Some(q) = args.quantity {
            edited.quantity = q;
        }
        if let Some(s) = args.expires {
            edited.expiration_date = start_of_day(parse_date(Some(s), svc.today())?);
        }
        if let Some(l) = args.location {
            edited.location = StorageLocation::parse(&l)?;
        }
        if let Some(n) = args.notes {
            edited.notes = Some(n).filter(|n| !n.trim().is_empty());
        }
        svc.update_item(&edited)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!(
            "Updated {}: {} {} in {}, expires {} ({})",
            item.product.name,
            item.quantity,
            item.unit.as_str(),
            item.location.as_str().to_lowercase(),
            item.expiration_date.format("%Y-%m-%d"),
            status_label(item.status)
        );
    }
    Ok(())
}

pub(crate) fn cmd_delete(svc: &PantryService, id: &str, json: bool) -> Result<()> {
    let removed = svc.delete_item(id)?;
    println!("{}", delete_message("item", id, removed, json));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_product_by_id_barcode_and_name() {
        let svc = PantryService::open_in_memory("local").unwrap();
        let milk = svc
            .add_product(&Product::new("Milk", ProductCategory::Dairy, 7).with_barcode("123"))
            .unwrap();

        assert_eq!(resolve_product(&svc, &milk.id, None, None).unwrap().id, milk.id);
        assert_eq!(resolve_product(&svc, "123", None, None).unwrap().id, milk.id);
        assert_eq!(resolve_product(&svc, "mILK", None, None).unwrap().id, milk.id);
    }

    #[test]
    fn test_resolve_product_creates_new() {
        let svc = PantryService::open_in_memory("local").unwrap();
        svc.add_product(&Product::new("Milk", ProductCategory::Dairy, 7))
            .unwrap();

        // Substring matches do not count as the same product
        let oat = resolve_product(&svc, "Oat Milk", Some("beverages"), Some(10)).unwrap();
        assert_eq!(oat.name, "Oat Milk");
        assert_eq!(oat.category, ProductCategory::Beverages);
        assert_eq!(oat.default_shelf_life_days, 10);
        assert!(svc.product_by_id(&oat.id).unwrap().is_none());

        let plain = resolve_product(&svc, "Rice", None, None).unwrap();
        assert_eq!(plain.category, ProductCategory::Other);
        assert_eq!(plain.default_shelf_life_days, DEFAULT_SHELF_LIFE_DAYS);

        assert!(resolve_product(&svc, "Rice", Some("rocks"), None).is_err());
        assert!(resolve_product(&svc, "  ", None, None).is_err());
    }

    #[test]
    fn test_add_then_update_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        let svc = PantryService::open(&dir.path().join("pantry.db"), "local").unwrap();
        cmd_add(
            &svc,
            AddItemArgs {
                product: "Yogurt".to_string(),
                quantity: 4,
                unit: "units".to_string(),
                location: "fridge".to_string(),
                purchased: None,
                expires: Some("2030-01-10".to_string()),
                category: Some("dairy".to_string()),
                shelf_life: None,
                notes: None,
            },
            true,
        )
        .unwrap();

        let items = svc.all_items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product.category, ProductCategory::Dairy);
        assert_eq!(items[0].expiration_date.format("%Y-%m-%d").to_string(), "2030-01-10");

        let id = items[0].id.clone();
        cmd_update(
            &svc,
            &id,
            UpdateItemArgs {
                quantity: Some(2),
                expires: None,
                location: Some("freezer".to_string()),
                notes: None,
            },
            true,
        )
        .unwrap();
        let item = svc.item_by_id(&id).unwrap().unwrap();
        assert_eq!(item.quantity, 2);
        assert_eq!(item.location, StorageLocation::Freezer);

        assert!(
            cmd_update(
                &svc,
                &id,
                UpdateItemArgs {
                    quantity: Some(-1),
                    expires: None,
                    location: None,
                    notes: None,
                },
                true,
            )
            .is_err()
        );
        assert_eq!(svc.item_by_id(&id).unwrap().unwrap().quantity, 2);
    }
}
