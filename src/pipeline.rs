use crate::chart::{self, ChartData, ChartTarget};
use crate::config::AppConfig;
use crate::data_structures::{PriceSeries, RevenueSeries};
use crate::export::export_csv;
use crate::macrotrends::MacrotrendsClient;
use crate::utils::Timer;
use crate::yahoo::YahooClient;
use anyhow::Context;
use chrono::{Local, NaiveDate};
use std::path::PathBuf;
use tracing::{debug, info, instrument};

const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub symbol: String,
    pub company: String,
    pub target: ChartTarget,
    pub export_dir: Option<PathBuf>,
    pub window_months: Option<u32>,
}

fn log_price_preview(prices: &PriceSeries) {
    info!(symbol = %prices.symbol, rows = prices.len(), "Price data loaded");
    for record in prices.head(PREVIEW_ROWS) {
        debug!(
            date = %record.date,
            open = record.open,
            high = record.high,
            low = record.low,
            close = record.close,
            volume = record.volume,
            "price"
        );
    }
}

fn log_revenue_preview(revenue: &RevenueSeries) {
    info!(symbol = %revenue.symbol, rows = revenue.len(), "Revenue data cleaned");
    for record in revenue.head(PREVIEW_ROWS) {
        debug!(date = %record.date, revenue = record.revenue, "revenue (head)");
    }
    for record in revenue.tail(PREVIEW_ROWS) {
        debug!(date = %record.date, revenue = record.revenue, "revenue (tail)");
    }
}

/// Window the two series around `today` and hand them to the chosen target.
pub fn draw(
    config: &AppConfig,
    request: &RunRequest,
    prices: &PriceSeries,
    revenue: &RevenueSeries,
    today: NaiveDate,
) -> anyhow::Result<Option<PathBuf>> {
    let window_months = request.window_months.unwrap_or(config.window_months);
    let data = ChartData::build(prices, revenue, &request.company, today, window_months);
    info!(
        cutoff = %data.cutoff,
        prices = data.prices.len(),
        revenue = data.revenue.len(),
        "Rendering chart"
    );
    chart::render(&data, &request.target, config.chart_height).context("Failed to render chart")
}

/// Fetch prices, scrape revenue and render, one stage after the other.
#[instrument(skip(config, request), fields(symbol = %request.symbol))]
pub async fn run(config: &AppConfig, request: &RunRequest) -> anyhow::Result<Option<PathBuf>> {
    let scraper = MacrotrendsClient::from_config(config)?;
    let user_agent = scraper.options().user_agent().unwrap_or_default().to_string();
    debug!(%user_agent, "Selected user agent for this run");

    let timer = Timer::start("Price fetch");
    let yahoo = YahooClient::new(&config.price_base_url, &user_agent, config.request_timeout)?;
    let prices = yahoo
        .get_history(&request.symbol)
        .await
        .with_context(|| format!("Failed to fetch price history for {}", request.symbol))?;
    timer.log_elapsed();
    log_price_preview(&prices);

    let timer = Timer::start("Revenue scrape");
    let revenue = scraper
        .fetch_revenue(&request.symbol, &request.company)
        .await
        .with_context(|| format!("Failed to scrape revenue for {}", request.symbol))?;
    timer.log_elapsed();
    log_revenue_preview(&revenue);

    if let Some(dir) = &request.export_dir {
        export_csv(dir, &prices, &revenue).context("Failed to export CSV")?;
    }

    draw(config, request, &prices, &revenue, Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{PriceRecord, RevenueRecord};

    #[test]
    fn test_draw_writes_windowed_document() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("tsla.html");
        let request = RunRequest {
            symbol: "TSLA".to_string(),
            company: "Tesla".to_string(),
            target: ChartTarget::Browser {
                output: Some(output.clone()),
                open: false,
            },
            export_dir: None,
            window_months: Some(3),
        };
        let prices = PriceSeries::new(
            "TSLA",
            vec![PriceRecord {
                date: NaiveDate::from_ymd_opt(2020, 6, 1).unwrap(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 179.62,
                volume: 1,
            }],
        );
        let revenue = RevenueSeries {
            symbol: "TSLA".to_string(),
            records: vec![
                RevenueRecord { date: "2020-09-30".to_string(), revenue: 8771.0 },
                RevenueRecord { date: "2020-03-31".to_string(), revenue: 5985.0 },
            ],
        };

        let today = NaiveDate::from_ymd_opt(2020, 9, 1).unwrap();
        let path = draw(&AppConfig::default(), &request, &prices, &revenue, today)
            .unwrap()
            .unwrap();
        assert_eq!(path, output);

        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains("<title>Tesla</title>"));
        assert!(html.contains("5985.0"));
        assert!(!html.contains("8771.0"));
    }
}
