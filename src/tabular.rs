use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::extract::InstrumentRecord;

/// Fixed output header, leading index column unnamed (spreadsheet-style).
const HEADER: [&str; 7] = [
    "",
    "Id",
    "FullName",
    "ClassificationType",
    "CommodityDerivativeIndicator",
    "NotionalCurrency",
    "Issuer",
];

/// How record fields map onto the header.
///
/// The historical job emitted values in extraction order under a header whose
/// third and fourth data columns were swapped, so NotionalCurrency data landed
/// under the CommodityDerivativeIndicator header and vice versa. `Fixed`
/// labels every value correctly; `Legacy` reproduces the historical bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOrder {
    Fixed,
    Legacy,
}

/// Write the records as CSV next to the source payload, deriving the output
/// name by swapping the payload's extension for `csv`. Returns the CSV path.
///
/// The header is written even for an empty record list.
pub fn write_csv(
    records: &[InstrumentRecord],
    xml_path: impl AsRef<Path>,
    order: ColumnOrder,
) -> Result<PathBuf> {
    let csv_path = xml_path.as_ref().with_extension("csv");
    let mut writer = csv::Writer::from_path(&csv_path)
        .with_context(|| format!("creating {}", csv_path.display()))?;

    writer.write_record(HEADER)?;
    for (index, rec) in records.iter().enumerate() {
        let row = [
            index.to_string(),
            rec.id.clone(),
            rec.full_name.clone(),
            rec.classification.clone(),
            match order {
                ColumnOrder::Fixed => rec.commodity_derivative.clone(),
                ColumnOrder::Legacy => rec.notional_currency.clone(),
            },
            match order {
                ColumnOrder::Fixed => rec.notional_currency.clone(),
                ColumnOrder::Legacy => rec.commodity_derivative.clone(),
            },
            rec.issuer.clone(),
        ];
        writer.write_record(&row)?;
    }
    writer
        .flush()
        .with_context(|| format!("writing {}", csv_path.display()))?;

    info!(csv = %csv_path.display(), rows = records.len(), "csv written");
    Ok(csv_path)
}
