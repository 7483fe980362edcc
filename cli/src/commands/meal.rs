use anyhow::{Result, bail};
use chrono::Duration;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use pantry_core::models::{MealType, NewNutritionLog, NutritionLog};
use pantry_core::repository::NutritionRepository;
use pantry_core::service::PantryService;

use super::helpers::{delete_message, parse_date, truncate};

pub(crate) struct LogMealArgs {
    pub meal: String,
    pub calories: i64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub date: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
}

pub(crate) fn cmd_meal_log(svc: &PantryService, args: LogMealArgs, json: bool) -> Result<()> {
    let meal_type = MealType::parse(&args.meal)?;
    let meal_date = parse_date(args.date, svc.today())?;

    let log = svc.add_log(NewNutritionLog {
        meal_date,
        meal_type,
        calories: args.calories,
        protein_g: args.protein,
        carbs_g: args.carbs,
        fat_g: args.fat,
        image_url: args.image_url,
        notes: args.notes,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        println!(
            "Logged {} for {}: {} kcal (P {:.1}g, C {:.1}g, F {:.1}g) [id: {}]",
            log.meal_type.as_str().to_lowercase(),
            log.meal_date.format("%Y-%m-%d"),
            log.calories,
            log.protein_g,
            log.carbs_g,
            log.fat_g,
            log.id
        );
    }
    Ok(())
}

fn print_log_table(logs: &[NutritionLog]) {
    #[derive(Tabled)]
    struct LogRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Calories")]
        calories: i64,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let rows: Vec<LogRow> = logs
        .iter()
        .map(|l| LogRow {
            id: l.id.clone(),
            date: l.meal_date.format("%Y-%m-%d").to_string(),
            meal: l.meal_type.as_str().to_lowercase(),
            calories: l.calories,
            protein: format!("{:.1}g", l.protein_g),
            carbs: format!("{:.1}g", l.carbs_g),
            fat: format!("{:.1}g", l.fat_g),
            notes: l.notes.as_deref().map(|n| truncate(n, 30)).unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_meal_list(
    svc: &PantryService,
    date: Option<String>,
    from: Option<String>,
    to: Option<String>,
    json: bool,
) -> Result<()> {
    let logs = match (from, to) {
        (Some(from), Some(to)) => {
            let start = parse_date(Some(from), svc.today())?;
            let end = parse_date(Some(to), svc.today())?;
            if start > end {
                bail!("Range start {start} is after range end {end}");
            }
            svc.logs_by_date_range(start, end)?
        }
        _ => svc.logs_by_date(parse_date(date, svc.today())?)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
    } else if logs.is_empty() {
        eprintln!("No meals logged. Use `pantry meal log` to record one.");
    } else {
        print_log_table(&logs);
    }
    Ok(())
}

pub(crate) fn cmd_meal_totals(svc: &PantryService, days: u32, json: bool) -> Result<()> {
    if days == 0 {
        bail!("Days must be at least 1");
    }
    let end = svc.today();
    let start = end - Duration::days(i64::from(days) - 1);
    let totals = svc.daily_totals(start, end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
        return Ok(());
    }
    if totals.is_empty() {
        eprintln!("No meals logged in the last {days} days.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct TotalRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Meals")]
        meals: usize,
        #[tabled(rename = "Calories")]
        calories: i64,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let rows: Vec<TotalRow> = totals
        .iter()
        .map(|d| TotalRow {
            date: d.date.format("%Y-%m-%d").to_string(),
            meals: d.meals.len(),
            calories: d.total_calories,
            protein: format!("{:.1}g", d.total_protein),
            carbs: format!("{:.1}g", d.total_carbs),
            fat: format!("{:.1}g", d.total_fat),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_meal_stats(svc: &PantryService, json: bool) -> Result<()> {
    let averages = svc.weekly_average_macros()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&averages)?);
    } else {
        println!("Average per logged day, last 7 days:");
        println!("  Calories: {:.0} kcal", averages.calories);
        println!("  Protein:  {:.1}g", averages.protein_g);
        println!("  Carbs:    {:.1}g", averages.carbs_g);
        println!("  Fat:      {:.1}g", averages.fat_g);
    }
    Ok(())
}

pub(crate) fn cmd_meal_delete(svc: &PantryService, id: &str, json: bool) -> Result<()> {
    let removed = svc.delete_log(id)?;
    println!("{}", delete_message("meal", id, removed, json));
    Ok(())
}
