use super::ui;
use crate::core::{RateSource, RateTable};
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

/// Lists every currency quoted on the row resolved for `date`, with its rate
/// against the table's reference currency.
pub fn display_currencies(table: &RateTable, date: NaiveDate) -> Result<String> {
    let (as_of, row) = table.resolve(date)?;

    let mut currencies: Vec<_> = row.iter().collect();
    currencies.sort_by(|a, b| a.0.cmp(b.0));

    let mut output_table = ui::new_styled_table();
    output_table.set_header(vec![
        ui::header_cell("Currency"),
        ui::header_cell(&format!("Per 1 {}", table.reference())),
    ]);
    for (currency, rate) in currencies {
        output_table.add_row(vec![Cell::new(currency), ui::rate_cell(*rate)]);
    }

    Ok(format!(
        "{} currencies quoted on {} {}\n\n{}",
        row.len(),
        ui::style_text(&as_of.to_string(), ui::StyleType::Title),
        ui::style_text(
            &format!(
                "(archive covers {} to {})",
                table.earliest().unwrap_or(as_of),
                table.latest().unwrap_or(as_of)
            ),
            ui::StyleType::Subtle
        ),
        output_table
    ))
}

pub async fn run(source: &dyn RateSource, date: NaiveDate) -> Result<()> {
    let table = ui::with_spinner("Loading exchange rates", source.rate_table()).await?;
    println!("{}", display_currencies(&table, date)?);
    Ok(())
}
