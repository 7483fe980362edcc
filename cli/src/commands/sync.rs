use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use pantry_core::repository::{PantryRepository, ProductRepository};
use pantry_core::service::PantryService;
use pantry_core::sync::{EmptyCatalog, OfflineBackend};

use super::helpers::truncate;

pub(crate) fn cmd_sync_status(svc: &PantryService, json: bool) -> Result<()> {
    let counts = svc.sync_status_counts()?;
    let queue = svc.pending_sync()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "counts": counts,
                "queue": queue,
            }))?
        );
        return Ok(());
    }

    println!(
        "Synced: {}  Pending: {}  Failed: {}  Queued changes: {}",
        counts.synced, counts.pending, counts.error, counts.queued
    );
    if queue.is_empty() {
        return Ok(());
    }

    #[derive(Tabled)]
    struct QueueRow {
        #[tabled(rename = "Queued")]
        queued: String,
        #[tabled(rename = "Type")]
        entity_type: String,
        #[tabled(rename = "Entity")]
        entity_id: String,
        #[tabled(rename = "Op")]
        operation: String,
        #[tabled(rename = "Retries")]
        retries: i64,
        #[tabled(rename = "Last error")]
        last_error: String,
    }

    let rows: Vec<QueueRow> = queue
        .iter()
        .map(|q| QueueRow {
            queued: q.created_at.format("%Y-%m-%d %H:%M").to_string(),
            entity_type: q.entity_type.as_str().to_lowercase(),
            entity_id: q.entity_id.clone(),
            operation: q.operation.as_str().to_lowercase(),
            retries: q.retry_count,
            last_error: q
                .last_error
                .as_deref()
                .map(|e| truncate(e, 40))
                .unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_sync_run(svc: &PantryService, json: bool) -> Result<()> {
    let report = svc.sync_with_backend(&OfflineBackend)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Pushed {} of {} queued changes",
            report.synced, report.attempted
        );
        for failure in &report.failed {
            eprintln!(
                "  {} {}: {}",
                failure.entity_type.as_str().to_lowercase(),
                failure.entity_id,
                failure.error
            );
        }
    }
    Ok(())
}

pub(crate) fn cmd_sync_retry(svc: &PantryService, json: bool) -> Result<()> {
    let moved = svc.retry_errored()?;

    if json {
        println!("{}", serde_json::json!({ "reset": moved }));
    } else if moved == 0 {
        println!("No failed records");
    } else {
        println!("Marked {moved} failed record(s) for retry. Run `pantry sync run` to push them.");
    }
    Ok(())
}

pub(crate) fn cmd_sync_catalog(svc: &PantryService, json: bool) -> Result<()> {
    let stored = svc.sync_catalog(&EmptyCatalog)?;

    if json {
        println!("{}", serde_json::json!({ "products": stored }));
    } else {
        println!("Catalog refreshed: {stored} product(s) received");
    }
    Ok(())
}
