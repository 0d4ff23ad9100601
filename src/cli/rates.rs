use super::ui;
use crate::core::{ConversionRequest, ConversionResult, RateSource, convert};
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

impl ConversionResult {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Currency"),
            ui::header_cell(&format!("Rate (1 {})", self.base)),
        ]);

        for (currency, rate) in &self.rates {
            let name = if *currency == self.base {
                ui::base_cell(currency)
            } else {
                Cell::new(currency)
            };
            table.add_row(vec![name, ui::rate_cell(*rate)]);
        }

        let mut output = format!(
            "Rates for {} on {}",
            ui::style_text(&self.base, ui::StyleType::Title),
            self.as_of
        );
        if self.as_of != self.requested_date {
            output.push_str(&ui::style_text(
                &format!(" (closest to {})", self.requested_date),
                ui::StyleType::Subtle,
            ));
        }
        output.push_str("\n\n");
        output.push_str(&table.to_string());
        output
    }
}

pub async fn run(
    source: &dyn RateSource,
    base: &str,
    targets: &[String],
    date: NaiveDate,
    max_gap_days: Option<u32>,
) -> Result<()> {
    let table = ui::with_spinner("Loading exchange rates", source.rate_table()).await?;
    let request = ConversionRequest::new(base, targets, date).with_max_gap_days(max_gap_days);
    let result = convert(&table, &request)?;
    println!("{}", result.display_as_table());
    Ok(())
}
