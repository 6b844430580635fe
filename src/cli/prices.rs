use super::ui;
use crate::core::price::PriceObservation;
use crate::store::PriceStore;
use anyhow::{Result, bail};
use chrono::NaiveDate;
use comfy_table::Cell;

pub fn render(ticker: &str, rows: &[PriceObservation]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Close"),
        ui::header_cell("Currency"),
    ]);
    for row in rows {
        table.add_row(vec![
            Cell::new(row.date),
            ui::number_cell(format!("{:.4}", row.close_price)),
            Cell::new(&row.currency),
        ]);
    }
    format!(
        "Ticker: {} ({} stored closes)\n\n{table}",
        ui::style_text(ticker, ui::StyleType::Title),
        rows.len()
    )
}

/// Prints stored closes for `ticker`, from the competition start through today
/// unless bounded.
pub fn run(
    store: &PriceStore,
    ticker: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<()> {
    if from > to {
        bail!("--from {from} is after --to {to}");
    }
    let rows = store.query_range(ticker, from, to)?;
    if rows.is_empty() && !store.tickers()?.iter().any(|t| t == ticker) {
        let known = store.tickers()?.join(", ");
        bail!("No stored prices for {ticker}. Stored tickers: {known}");
    }
    println!("{}", render(ticker, &rows));
    Ok(())
}
