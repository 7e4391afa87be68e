//! Dashboard command.

use crate::error::Result;
use crate::model::TaskStatus;
use crate::storage::dashboard::{
    DailyCost, InitiativeStat, StatusCounts, cost_by_date, initiative_stats, status_counts,
};
use crate::storage::Database;
use chrono::{Duration, Utc};
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct DashboardOutput {
    status: StatusCounts,
    cost_by_date: Vec<DailyCost>,
    total_cost_usd: f64,
    initiatives: Vec<InitiativeStat>,
}

/// Show task counts, `days` of daily cost, and the top initiatives.
///
/// # Errors
///
/// Returns the first failing aggregate query.
pub fn execute(db: &Database, days: u32, initiatives: u32, json: bool) -> Result<()> {
    let since = Utc::now() - Duration::days(i64::from(days));
    let status = status_counts(db)?;
    let costs = cost_by_date(db, &since)?;
    let total_cost_usd = costs.iter().map(|c| c.cost_usd).sum::<f64>();
    let stats = initiative_stats(db, initiatives)?;

    if json {
        return super::print_json(&DashboardOutput {
            status,
            cost_by_date: costs,
            total_cost_usd,
            initiatives: stats,
        });
    }

    println!("{} ({} total)", "Tasks".cyan().bold(), status.total);
    for s in TaskStatus::ALL {
        let n = status.get(s);
        if n > 0 {
            println!("  {:<11} {n}", s.as_str());
        }
    }

    println!("\n{} (last {days} days: ${total_cost_usd:.2})", "Cost".cyan().bold());
    for day in &costs {
        println!("  {} ${:.2}", day.date, day.cost_usd);
    }

    if !stats.is_empty() {
        println!("\n{}", "Initiatives".cyan().bold());
        for s in &stats {
            let title = if s.title.is_empty() { "-" } else { s.title.as_str() };
            println!(
                "  {:<12} {:<30} {}/{} done",
                s.initiative_id.bold(),
                super::truncate(title, 30),
                s.completed_count,
                s.task_count
            );
        }
    }
    Ok(())
}
