use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use pantry_core::models::{NewReceipt, Receipt};
use pantry_core::repository::ReceiptRepository;
use pantry_core::service::PantryService;

use super::helpers::{
    delete_message, exit_not_found, parse_instant, parse_receipt_item, truncate,
};

pub(crate) fn cmd_receipt_add(
    svc: &PantryService,
    image: String,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let scan_date = parse_instant(date, svc.now(), svc.today())?;
    let receipt = svc.add_receipt(NewReceipt {
        image_url: image,
        scan_date,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        println!(
            "Saved receipt from {} [id: {}]",
            receipt.scan_date.format("%Y-%m-%d"),
            receipt.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_receipt_list(svc: &PantryService, json: bool) -> Result<()> {
    let receipts = svc.all_receipts()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipts)?);
        return Ok(());
    }
    if receipts.is_empty() {
        eprintln!("No receipts yet. Use `pantry receipt add` to save one.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct ReceiptRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Scanned")]
        scanned: String,
        #[tabled(rename = "Image")]
        image: String,
        #[tabled(rename = "Items")]
        items: String,
        #[tabled(rename = "Sync")]
        sync: String,
    }

    let rows: Vec<ReceiptRow> = receipts
        .iter()
        .map(|r| ReceiptRow {
            id: r.id.clone(),
            scanned: r.scan_date.format("%Y-%m-%d").to_string(),
            image: truncate(&r.image_url, 40),
            items: match (&r.extracted_items, r.processed) {
                (Some(items), true) => items.len().to_string(),
                _ => "unprocessed".to_string(),
            },
            sync: r.sync_status.as_str().to_lowercase(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

fn print_receipt(receipt: &Receipt) {
    println!("Receipt {}", receipt.id);
    println!("  Scanned: {}", receipt.scan_date.format("%Y-%m-%d"));
    println!("  Image:   {}", receipt.image_url);
    println!("  Sync:    {}", receipt.sync_status.as_str().to_lowercase());

    let Some(ref items) = receipt.extracted_items else {
        println!("  Not processed yet");
        return;
    };
    let mut total = 0.0;
    for item in items {
        match item.price {
            Some(price) => {
                total += price;
                println!("  - {} x{}  {price:.2}", item.name, item.quantity);
            }
            None => println!("  - {} x{}", item.name, item.quantity),
        }
    }
    if total > 0.0 {
        println!("  Total: {total:.2}");
    }
}

pub(crate) fn cmd_receipt_show(svc: &PantryService, id: &str, json: bool) -> Result<()> {
    let Some(receipt) = svc.receipt_by_id(id)? else {
        exit_not_found(&format!("Receipt {id} not found"), json);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        print_receipt(&receipt);
    }
    Ok(())
}

pub(crate) fn cmd_receipt_process(
    svc: &PantryService,
    id: &str,
    items: &[String],
    json: bool,
) -> Result<()> {
    let items = items
        .iter()
        .map(String::as_str)
        .map(parse_receipt_item)
        .collect::<Result<Vec<_>>>()?;

    if svc.receipt_by_id(id)?.is_none() {
        exit_not_found(&format!("Receipt {id} not found"), json);
    }
    let receipt = svc.mark_processed(id, items)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    } else {
        print_receipt(&receipt);
    }
    Ok(())
}

pub(crate) fn cmd_receipt_delete(svc: &PantryService, id: &str, json: bool) -> Result<()> {
    let removed = svc.delete_receipt(id)?;
    println!("{}", delete_message("receipt", id, removed, json));
    Ok(())
}
