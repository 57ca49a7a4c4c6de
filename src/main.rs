use clap::Parser;
use stock_revenue_chart::cli::Cli;
use stock_revenue_chart::config::AppConfig;
use stock_revenue_chart::pipeline;
use stock_revenue_chart::utils::init_logger;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logger()?;

    let request = Cli::parse().into_request();
    let app_config = AppConfig::load()?;

    tracing::info!(symbol = %request.symbol, company = %request.company, "Starting stock-revenue-chart");
    tracing::debug!(?app_config, "Loaded configuration");

    if let Some(path) = pipeline::run(&app_config, &request).await? {
        tracing::info!(path = %path.display(), "Chart ready");
    }

    Ok(())
}
