use super::ui;
use crate::core::config::AppConfig;
use crate::core::currency::FxRateProvider;
use crate::core::price::PriceHistoryProvider;
use crate::store::PriceStore;
use crate::update::{UpdateSummary, planned_series, run_update};
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

pub async fn run(
    config: &AppConfig,
    store: &mut PriceStore,
    price_provider: &dyn PriceHistoryProvider,
    fx_provider: &dyn FxRateProvider,
    today: NaiveDate,
) -> Result<UpdateSummary> {
    // FX pairs for currencies first seen this run are not counted up front
    let pb = ui::new_progress_bar(planned_series(config, store)? as u64, true);
    let summary = run_update(config, store, price_provider, fx_provider, today, &|key| {
        if pb.position() >= pb.length().unwrap_or(0) {
            pb.inc_length(1);
        }
        pb.set_message(key.to_string());
        pb.inc(1);
    })
    .await?;
    pb.finish_and_clear();

    println!("{}", render(&summary, today));
    Ok(summary)
}

pub fn render(summary: &UpdateSummary, today: NaiveDate) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Item"), ui::header_cell("Count")]);
    for (label, count) in [
        ("Series updated", summary.series_updated),
        ("Series already up to date", summary.series_up_to_date),
        ("Rows inserted", summary.rows_inserted),
        ("Positions sized", summary.positions_resolved),
        ("Conflicts", summary.conflicts.len()),
        ("Failures", summary.failures.len()),
    ] {
        table.add_row(vec![Cell::new(label), ui::number_cell(count.to_string())]);
    }

    let mut output = format!(
        "Update through {}\n\n{table}",
        ui::style_text(&today.to_string(), ui::StyleType::Title)
    );

    if !summary.conflicts.is_empty() {
        output.push_str(&format!(
            "\n\n{}",
            ui::style_text("Stored values kept over refetched ones:", ui::StyleType::TotalLabel)
        ));
        for conflict in &summary.conflicts {
            output.push_str(&format!("\n  {conflict}"));
        }
    }

    if !summary.failures.is_empty() {
        output.push_str(&format!(
            "\n\n{}",
            ui::style_text("Will retry next run:", ui::StyleType::Error)
        ));
        for failure in &summary.failures {
            output.push_str(&format!("\n  {}: {}", failure.key, failure.reason));
        }
    }
    output
}
