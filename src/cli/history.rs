use super::{MarketData, ui};
use crate::core::valuation::{ValuationPoint, percent_change_series, performance_summary};
use anyhow::{Result, bail};
use chrono::NaiveDate;
use comfy_table::Cell;

/// Valuation points for `participant` within the optional bounds.
pub fn build(
    data: &MarketData,
    participant: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<ValuationPoint>> {
    if !data.participants().contains(&participant) {
        bail!("No stored positions for participant: {participant}");
    }
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            bail!("--from {from} is after --to {to}");
        }
    }

    Ok(data
        .valuation(participant)
        .into_iter()
        .filter(|p| from.is_none_or(|from| p.date >= from))
        .filter(|p| to.is_none_or(|to| p.date <= to))
        .collect())
}

pub fn render(participant: &str, series: &[ValuationPoint], currency: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell(&format!("Value ({currency})")),
        ui::header_cell("Change"),
    ]);

    for (point, (_, change)) in series.iter().zip(percent_change_series(series)) {
        table.add_row(vec![
            Cell::new(point.date),
            ui::format_optional_cell(point.value, |v| format!("{v:.2}")),
            ui::optional_change_cell(change),
        ]);
    }

    let mut output = format!(
        "Participant: {}\n\n{table}",
        ui::style_text(participant, ui::StyleType::Title)
    );
    if let Some(summary) = performance_summary(series) {
        output.push_str(&format!(
            "\n\nReturn {} to {}: {}",
            summary.start_date,
            summary.end_date,
            ui::style_text(
                &format!("{:.2}%", summary.total_return_pct),
                ui::StyleType::TotalValue
            )
        ));
    }
    output
}

pub fn run(
    data: &MarketData,
    participant: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    currency: &str,
) -> Result<()> {
    let series = build(data, participant, from, to)?;
    println!("{}", render(participant, &series, currency));
    Ok(())
}
