use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use pantry_core::models::{ItemStatus, PantryItem, ProductCategory, ReceiptItem};

/// Parse a date argument. Keywords and the default are relative to `today`.
pub(crate) fn parse_date(date_str: Option<String>, today: NaiveDate) -> Result<NaiveDate> {
    match date_str {
        None => Ok(today),
        Some(s) => match s.as_str() {
            "today" => Ok(today),
            "yesterday" => Ok(today - chrono::Duration::days(1)),
            "tomorrow" => Ok(today + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Midnight UTC at the start of `date`.
pub(crate) fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Parse an optional date argument into an instant, falling back to `now`.
pub(crate) fn parse_instant(
    date_str: Option<String>,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> Result<DateTime<Utc>> {
    match date_str {
        None => Ok(now),
        Some(s) => Ok(start_of_day(parse_date(Some(s), today)?)),
    }
}

/// Parse "name:quantity[:price]" into a receipt line.
pub(crate) fn parse_receipt_item(s: &str) -> Result<ReceiptItem> {
    let parts: Vec<&str> = s.split(':').map(str::trim).collect();
    let (name, quantity, price) = match parts.as_slice() {
        [name, qty] => (*name, *qty, None),
        [name, qty, price] => (*name, *qty, Some(*price)),
        _ => bail!("Invalid item '{s}'. Use 'name:quantity' or 'name:quantity:price'"),
    };
    if name.is_empty() {
        bail!("Invalid item '{s}': name is empty");
    }
    let quantity: i64 = quantity
        .parse()
        .with_context(|| format!("Invalid quantity in '{s}'"))?;
    let price = price
        .map(|p| {
            p.trim_start_matches('$')
                .parse::<f64>()
                .with_context(|| format!("Invalid price in '{s}'"))
        })
        .transpose()?;
    Ok(ReceiptItem {
        name: name.to_string(),
        quantity,
        price,
        category: None,
    })
}

pub(crate) fn parse_category(s: Option<&str>) -> Result<Option<ProductCategory>> {
    s.map(ProductCategory::parse).transpose()
}

/// "in 2d", "today", "1d ago", relative to `now` in whole days.
pub(crate) fn describe_expiry(expiration: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let hours = (expiration - now).num_hours();
    let days = hours.div_euclid(24);
    match days {
        0 => "today".to_string(),
        d if d > 0 => format!("in {d}d"),
        d => format!("{}d ago", -d),
    }
}

pub(crate) fn status_label(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Fresh => "fresh",
        ItemStatus::ExpiringSoon => "expiring soon",
        ItemStatus::Expired => "EXPIRED",
    }
}

pub(crate) fn print_item_table(items: &[PantryItem], now: DateTime<Utc>) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Product")]
        product: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "Location")]
        location: String,
        #[tabled(rename = "Expires")]
        expires: String,
        #[tabled(rename = "")]
        relative: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Sync")]
        sync: String,
    }

    let rows: Vec<ItemRow> = items
        .iter()
        .map(|item| ItemRow {
            id: item.id.clone(),
            product: truncate(&item.product.name, 30),
            quantity: format!("{} {}", item.quantity, item.unit.as_str()),
            location: item.location.as_str().to_lowercase(),
            expires: item.expiration_date.format("%Y-%m-%d").to_string(),
            relative: describe_expiry(item.expiration_date, now),
            status: status_label(item.status).to_string(),
            sync: item.sync_status.as_str().to_lowercase(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Outcome of a delete. An unknown id deletes nothing and is still a success.
pub(crate) fn delete_message(kind: &str, id: &str, removed: bool, json: bool) -> String {
    match (json, removed) {
        (true, true) => serde_json::json!({ "deleted": id }).to_string(),
        (true, false) => serde_json::json!({ "deleted": null }).to_string(),
        (false, true) => format!("Deleted {kind} {id}"),
        (false, false) => format!("No {kind} with id {id}, nothing to delete"),
    }
}

/// Report a missing record and exit with status 2.
pub(crate) fn exit_not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 16).unwrap()
    }

    #[test]
    fn test_parse_date_none() {
        assert_eq!(parse_date(None, today()).unwrap(), today());
    }

    #[test]
    fn test_parse_date_keywords() {
        assert_eq!(parse_date(Some("today".to_string()), today()).unwrap(), today());
        assert_eq!(
            parse_date(Some("yesterday".to_string()), today()).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string()), today()).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 17).unwrap()
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string()), today()).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string()), today()).is_err());
    }

    #[test]
    fn test_parse_instant() {
        assert_eq!(parse_instant(None, now(), today()).unwrap(), now());
        assert_eq!(
            parse_instant(Some("2024-06-20".to_string()), now(), today()).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 20, 0, 0, 0).unwrap()
        );
        // Keywords follow the caller's calendar day, not the UTC date of `now`
        assert_eq!(
            parse_instant(Some("today".to_string()), now(), today()).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_receipt_item() {
        let item = parse_receipt_item("Milk:2").unwrap();
        assert_eq!(item.name, "Milk");
        assert_eq!(item.quantity, 2);
        assert!(item.price.is_none());

        let item = parse_receipt_item("Eggs : 12 : $3.49").unwrap();
        assert_eq!(item.name, "Eggs");
        assert_eq!(item.quantity, 12);
        assert_eq!(item.price, Some(3.49));
    }

    #[test]
    fn test_parse_receipt_item_invalid() {
        assert!(parse_receipt_item("Milk").is_err());
        assert!(parse_receipt_item(":2").is_err());
        assert!(parse_receipt_item("Milk:two").is_err());
        assert!(parse_receipt_item("Milk:2:cheap").is_err());
        assert!(parse_receipt_item("a:1:2:3").is_err());
    }

    #[test]
    fn test_describe_expiry() {
        assert_eq!(describe_expiry(now() + Duration::days(2), now()), "in 2d");
        assert_eq!(describe_expiry(now() + Duration::hours(5), now()), "today");
        assert_eq!(describe_expiry(now() - Duration::hours(5), now()), "1d ago");
        assert_eq!(describe_expiry(now() - Duration::days(3), now()), "3d ago");
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(
            parse_category(Some("dairy")).unwrap(),
            Some(ProductCategory::Dairy)
        );
        assert_eq!(parse_category(None).unwrap(), None);
        assert!(parse_category(Some("rocks")).is_err());
    }

    #[test]
    fn test_json_error() {
        let json: serde_json::Value = serde_json::from_str(&json_error("Item \"x\" not found")).unwrap();
        assert_eq!(json["error"], "Item \"x\" not found");
    }

    #[test]
    fn test_delete_message() {
        assert_eq!(delete_message("item", "i1", true, false), "Deleted item i1");
        assert_eq!(
            delete_message("item", "i1", false, false),
            "No item with id i1, nothing to delete"
        );

        let json: serde_json::Value =
            serde_json::from_str(&delete_message("meal", "m1", true, true)).unwrap();
        assert_eq!(json["deleted"], "m1");
        let json: serde_json::Value =
            serde_json::from_str(&delete_message("meal", "m1", false, true)).unwrap();
        assert!(json["deleted"].is_null());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
        assert_eq!(truncate("日清カップヌードル", 8), "日清カップ...");
    }
}
