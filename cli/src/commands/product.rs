use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use pantry_core::models::{NutritionInfo, Product, ProductCategory};
use pantry_core::repository::ProductRepository;
use pantry_core::service::PantryService;

use super::helpers::{delete_message, exit_not_found, parse_category, truncate};

pub(crate) struct NewProductArgs {
    pub name: String,
    pub category: String,
    pub shelf_life: i64,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub calories: Option<i64>,
    pub serving: String,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

pub(crate) fn cmd_product_add(svc: &PantryService, args: NewProductArgs, json: bool) -> Result<()> {
    let category = ProductCategory::parse(&args.category)?;
    let mut product = Product::new(args.name.trim(), category, args.shelf_life);
    product.barcode = args.barcode.filter(|b| !b.trim().is_empty());
    product.image_url = args.image_url;
    product.nutrition_info = args.calories.map(|calories| NutritionInfo {
        serving_size: args.serving,
        calories,
        protein_g: args.protein,
        carbs_g: args.carbs,
        fat_g: args.fat,
        fiber_g: None,
        sugar_g: None,
        sodium_mg: None,
    });

    let product = svc.add_product(&product)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&product)?);
    } else {
        println!(
            "Added product {} ({}, keeps {} days) [id: {}]",
            product.name,
            product.category.as_str().to_lowercase(),
            product.default_shelf_life_days,
            product.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_product_list(
    svc: &PantryService,
    category: Option<&str>,
    search: Option<&str>,
    json: bool,
) -> Result<()> {
    let category = parse_category(category)?;
    let mut products = match search {
        Some(q) => svc.search_products(q)?,
        None => match category {
            Some(c) => svc.products_by_category(c)?,
            None => svc.all_products()?,
        },
    };
    if let (Some(_), Some(c)) = (search, category) {
        products.retain(|p| p.category == c);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&products)?);
        return Ok(());
    }
    if products.is_empty() {
        eprintln!("No products found. Use `pantry product add` to create one.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct ProductRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Shelf life")]
        shelf_life: String,
        #[tabled(rename = "Barcode")]
        barcode: String,
        #[tabled(rename = "Cal/serving")]
        calories: String,
    }

    let rows: Vec<ProductRow> = products
        .iter()
        .map(|p| ProductRow {
            id: p.id.clone(),
            name: truncate(&p.name, 35),
            category: p.category.as_str().to_lowercase(),
            shelf_life: format!("{}d", p.default_shelf_life_days),
            barcode: p.barcode.clone().unwrap_or_default(),
            calories: p
                .nutrition_info
                .as_ref()
                .map_or("-".into(), |n| n.calories.to_string()),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .with(Modify::new(Columns::new(5..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_product_show(svc: &PantryService, id: &str, json: bool) -> Result<()> {
    let product = match svc.product_by_id(id)? {
        Some(p) => p,
        None => match svc.product_by_barcode(id)? {
            Some(p) => p,
            None => exit_not_found(&format!("Product {id} not found"), json),
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&product)?);
        return Ok(());
    }

    println!("{}", product.name);
    println!("  ID:         {}", product.id);
    println!("  Category:   {}", product.category.as_str().to_lowercase());
    println!("  Shelf life: {} days", product.default_shelf_life_days);
    if let Some(ref barcode) = product.barcode {
        println!("  Barcode:    {barcode}");
    }
    if let Some(ref url) = product.image_url {
        println!("  Image:      {url}");
    }
    if let Some(ref n) = product.nutrition_info {
        println!(
            "  Per {}: {} kcal, P {:.1}g, C {:.1}g, F {:.1}g",
            n.serving_size, n.calories, n.protein_g, n.carbs_g, n.fat_g
        );
    }
    Ok(())
}

pub(crate) fn cmd_product_delete(svc: &PantryService, id: &str, json: bool) -> Result<()> {
    let removed = svc.delete_product(id)?;
    println!("{}", delete_message("product", id, removed, json));
    Ok(())
}
