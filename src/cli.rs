use crate::chart::ChartTarget;
use crate::pipeline::RunRequest;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "stock-revenue-chart")]
#[command(about = "Chart a stock's price history against its quarterly revenue")]
pub struct Cli {
    /// Ticker symbol to chart
    #[arg(default_value = "AAPL")]
    pub symbol: String,

    /// Company name as used in the revenue page URL, also the chart title
    #[arg(default_value = "Apple")]
    pub company: String,

    /// Render ASCII panels in the terminal instead of an HTML chart
    #[arg(long)]
    pub terminal: bool,

    /// Write the HTML chart to this path instead of a temporary file
    #[arg(long, value_name = "PATH", conflicts_with = "terminal")]
    pub output: Option<PathBuf>,

    /// Write the HTML chart without opening a viewer
    #[arg(long)]
    pub no_open: bool,

    /// Also write the cleaned series as CSV files into this directory
    #[arg(long, value_name = "DIR")]
    pub export_csv: Option<PathBuf>,

    /// Override the configured window length in months
    #[arg(long)]
    pub window_months: Option<u32>,

    /// Terminal chart width in characters
    #[arg(long, default_value_t = 120)]
    pub width: u32,

    /// Terminal chart height in characters
    #[arg(long, default_value_t = 30)]
    pub height: u32,
}

impl Cli {
    pub fn chart_target(&self) -> ChartTarget {
        if self.terminal {
            ChartTarget::Terminal {
                width: self.width,
                height: self.height,
            }
        } else {
            ChartTarget::Browser {
                output: self.output.clone(),
                open: !self.no_open,
            }
        }
    }

    pub fn into_request(self) -> RunRequest {
        let target = self.chart_target();
        RunRequest {
            symbol: self.symbol.to_uppercase(),
            company: self.company,
            target,
            export_dir: self.export_csv,
            window_months: self.window_months,
        }
    }
}
