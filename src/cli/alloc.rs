use super::{MarketData, ui};
use crate::core::valuation::{AllocationEntry, allocation};
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;
use tracing::warn;

/// Holdings of `participant` on the last day with an available valuation.
pub fn latest_allocation(
    data: &MarketData,
    participant: &str,
) -> Result<Option<(NaiveDate, Vec<AllocationEntry>)>> {
    let Some(date) = data
        .valuation(participant)
        .iter()
        .rev()
        .find(|p| p.value.is_some())
        .map(|p| p.date)
    else {
        return Ok(None);
    };
    let entries = allocation(
        participant,
        &data.positions,
        &data.prices,
        &data.normalizer,
        date,
    )?;
    Ok(Some((date, entries)))
}

pub fn render(
    participant: &str,
    date: NaiveDate,
    entries: &[AllocationEntry],
    currency: &str,
) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell(&format!("Value ({currency})")),
        ui::header_cell("Allocation"),
    ]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(&entry.ticker),
            ui::number_cell(format!("{:.2}", entry.value)),
            ui::number_cell(format!("{:.2}%", entry.weight_pct)),
        ]);
    }

    let total: f64 = entries.iter().map(|e| e.value).sum();
    format!(
        "Participant: {} on {date}\n\n{table}\n\nTotal Value ({}): {}",
        ui::style_text(participant, ui::StyleType::Title),
        ui::style_text(currency, ui::StyleType::TotalLabel),
        ui::style_text(&format!("{total:.2}"), ui::StyleType::TotalValue)
    )
}

pub fn run(data: &MarketData, currency: &str) -> Result<()> {
    let participants = data.participants();
    if participants.is_empty() {
        println!("No positions stored yet. Run `stockpicks update` first.");
        return Ok(());
    }

    for (i, participant) in participants.into_iter().enumerate() {
        if i > 0 {
            ui::print_separator();
        }
        match latest_allocation(data, participant)? {
            Some((date, entries)) => {
                println!("{}", render(participant, date, &entries, currency))
            }
            None => {
                warn!("No available valuation for {participant}");
                println!(
                    "Participant: {}\n\n{}",
                    ui::style_text(participant, ui::StyleType::Title),
                    ui::style_text("No valuation available yet", ui::StyleType::Subtle)
                );
            }
        }
    }
    Ok(())
}
