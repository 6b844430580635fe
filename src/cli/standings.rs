use super::{MarketData, ui};
use crate::core::portfolio::{WeightCheck, weight_checks};
use crate::core::valuation::{PerformanceSummary, performance_summary, rank};
use comfy_table::{Cell, Color};
use tracing::debug;

/// Leaderboard rows, best total return first, plus participants that have no
/// available valuation yet.
pub fn build(data: &MarketData) -> (Vec<PerformanceSummary>, Vec<String>) {
    let mut summaries = Vec::new();
    let mut pending = Vec::new();

    for participant in data.participants() {
        let series = data.valuation(participant);
        match performance_summary(&series) {
            Some(summary) => summaries.push(summary),
            None => {
                debug!("{participant} has no available valuation");
                pending.push(participant.to_string());
            }
        }
    }
    (rank(summaries), pending)
}

pub fn render(standings: &[PerformanceSummary], pending: &[String], currency: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("Participant"),
        ui::header_cell(&format!("Start ({currency})")),
        ui::header_cell(&format!("Value ({currency})")),
        ui::header_cell("Return"),
        ui::header_cell("Annualized"),
        ui::header_cell("As of"),
    ]);

    for (i, s) in standings.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&s.participant),
            ui::number_cell(format!("{:.2}", s.initial_value)),
            ui::number_cell(format!("{:.2}", s.final_value)),
            ui::change_cell(s.total_return_pct),
            ui::optional_change_cell(s.annualized_return_pct),
            Cell::new(s.end_date),
        ]);
    }

    let mut output = format!(
        "{}\n\n{table}",
        ui::style_text("Standings", ui::StyleType::Title)
    );
    if !pending.is_empty() {
        output.push_str(&format!(
            "\n\n{} {}",
            ui::style_text("No valuation yet:", ui::StyleType::Subtle),
            pending.join(", ")
        ));
    }
    output
}

/// Weight totals per participant that picks by weight.
pub fn render_weight_checks(checks: &[WeightCheck]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Participant"),
        ui::header_cell("Total weight"),
        ui::header_cell("Status"),
    ]);
    for check in checks {
        let status = if check.is_complete() {
            Cell::new("OK").fg(Color::Green)
        } else {
            Cell::new("ERROR - Not 100%").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&check.participant),
            ui::number_cell(format!("{:.2}%", check.total * 100.0)),
            status,
        ]);
    }
    format!(
        "{}\n\n{table}",
        ui::style_text("Weights", ui::StyleType::Title)
    )
}

pub fn run(data: &MarketData, currency: &str) {
    let (standings, pending) = build(data);
    if standings.is_empty() && pending.is_empty() {
        println!("No positions stored yet. Run `stockpicks update` first.");
        return;
    }
    println!("{}", render(&standings, &pending, currency));

    let checks = weight_checks(&data.positions);
    if !checks.is_empty() {
        println!("\n{}", render_weight_checks(&checks));
    }
}
