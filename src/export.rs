use crate::data_structures::{PriceSeries, RevenueSeries};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Serialize)]
struct PriceRow<'a> {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: u64,
    #[serde(rename = "Symbol")]
    symbol: &'a str,
}

#[derive(Serialize)]
struct RevenueRow<'a> {
    #[serde(rename = "Date")]
    date: &'a str,
    #[serde(rename = "Revenue")]
    revenue: f64,
}

/// Writes `{symbol}_prices.csv` and `{symbol}_revenue.csv` into `dir`.
pub fn export_csv(dir: &Path, prices: &PriceSeries, revenue: &RevenueSeries) -> anyhow::Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;

    let price_path = dir.join(format!("{}_prices.csv", prices.symbol));
    let mut writer = csv::Writer::from_path(&price_path)?;
    for record in &prices.records {
        writer.serialize(PriceRow {
            date: record.date.format("%Y-%m-%d").to_string(),
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
            symbol: &prices.symbol,
        })?;
    }
    writer.flush()?;

    let revenue_path = dir.join(format!("{}_revenue.csv", revenue.symbol));
    let mut writer = csv::Writer::from_path(&revenue_path)?;
    for record in &revenue.records {
        writer.serialize(RevenueRow {
            date: &record.date,
            revenue: record.revenue,
        })?;
    }
    writer.flush()?;

    info!(
        prices = %price_path.display(),
        revenue = %revenue_path.display(),
        "Exported cleaned series"
    );
    Ok((price_path, revenue_path))
}
