use crate::data_structures::{parse_display_date, PriceRecord, PriceSeries, RevenueRecord, RevenueSeries};
use chrono::{Months, NaiveDate};
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use textplots::{Chart, Plot, Shape};
use thiserror::Error;
use tracing::{info, warn};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
const VERTICAL_SPACING: f64 = 0.3;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no records on or before {0} to plot")]
    EmptyWindow(NaiveDate),
    #[error("failed to launch viewer: {0}")]
    Viewer(String),
}

#[derive(Debug, Clone)]
pub enum ChartTarget {
    /// Standalone HTML document, optionally opened in the local viewer.
    Browser { output: Option<PathBuf>, open: bool },
    /// ASCII panels on stdout.
    Terminal { width: u32, height: u32 },
}

impl Default for ChartTarget {
    fn default() -> Self {
        ChartTarget::Browser {
            output: None,
            open: true,
        }
    }
}

/// `today` minus `months` calendar months, clamped to the end of the month.
pub fn window_cutoff(today: NaiveDate, months: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// Both series restricted to records dated on or before the cutoff.
///
/// This keeps everything older than the window and drops the recent months,
/// which is the long-standing behavior of the chart.
#[derive(Debug, Clone)]
pub struct ChartData {
    pub title: String,
    pub cutoff: NaiveDate,
    pub prices: Vec<PriceRecord>,
    pub revenue: Vec<RevenueRecord>,
}

impl ChartData {
    pub fn build(
        prices: &PriceSeries,
        revenue: &RevenueSeries,
        title: &str,
        today: NaiveDate,
        window_months: u32,
    ) -> Self {
        let cutoff = window_cutoff(today, window_months);
        let cutoff_label = cutoff.format("%Y-%m-%d").to_string();

        let prices: Vec<PriceRecord> = prices
            .records
            .iter()
            .filter(|record| record.date <= cutoff)
            .cloned()
            .collect();

        // Displayed dates are compared as text against the ISO cutoff
        let revenue: Vec<RevenueRecord> = revenue
            .records
            .iter()
            .filter(|record| record.date.as_str() <= cutoff_label.as_str())
            .cloned()
            .collect();

        Self {
            title: title.to_string(),
            cutoff,
            prices,
            revenue,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty() && self.revenue.is_empty()
    }
}

/// Two stacked scatter panels sharing the date axis, range slider on top.
pub fn plotly_figure(data: &ChartData, height: u32) -> Value {
    let row_height = (1.0 - VERTICAL_SPACING) / 2.0;
    let top_domain = [1.0 - row_height, 1.0];
    let bottom_domain = [0.0, row_height];

    let price_x: Vec<String> = data
        .prices
        .iter()
        .map(|r| r.date.format("%Y-%m-%d").to_string())
        .collect();
    let price_y: Vec<f64> = data.prices.iter().map(|r| r.close).collect();
    let revenue_x: Vec<&str> = data.revenue.iter().map(|r| r.date.as_str()).collect();
    let revenue_y: Vec<f64> = data.revenue.iter().map(|r| r.revenue).collect();

    let subplot_title = |text: &str, y: f64| {
        json!({
            "text": text,
            "x": 0.5,
            "y": y,
            "xref": "paper",
            "yref": "paper",
            "xanchor": "center",
            "yanchor": "bottom",
            "showarrow": false,
            "font": { "size": 16 }
        })
    };

    json!({
        "data": [
            {
                "type": "scatter",
                "mode": "lines",
                "name": "Share Price",
                "x": price_x,
                "y": price_y,
                "xaxis": "x",
                "yaxis": "y"
            },
            {
                "type": "scatter",
                "mode": "lines",
                "name": "Revenue",
                "x": revenue_x,
                "y": revenue_y,
                "xaxis": "x2",
                "yaxis": "y2"
            }
        ],
        "layout": {
            "title": { "text": data.title },
            "showlegend": false,
            "height": height,
            "annotations": [
                subplot_title("Historical Share Price", top_domain[1]),
                subplot_title("Historical Revenue", bottom_domain[1])
            ],
            "xaxis": {
                "anchor": "y",
                "domain": [0.0, 1.0],
                "matches": "x2",
                "showticklabels": false,
                "title": { "text": "Date" },
                "rangeslider": { "visible": true }
            },
            "xaxis2": {
                "anchor": "y2",
                "domain": [0.0, 1.0],
                "title": { "text": "Date" }
            },
            "yaxis": {
                "anchor": "x",
                "domain": top_domain,
                "title": { "text": "Price ($US)" }
            },
            "yaxis2": {
                "anchor": "x2",
                "domain": bottom_domain,
                "title": { "text": "Revenue ($US Millions)" }
            }
        }
    })
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render_html(data: &ChartData, height: u32) -> Result<String, ChartError> {
    let figure = serde_json::to_string(&plotly_figure(data, height))?;
    // Keep the payload from closing the script element early
    let figure = figure.replace("</", "<\\/");

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="{cdn}"></script>
</head>
<body>
<div id="chart" style="width:100%;height:{height}px;"></div>
<script>
const figure = {figure};
Plotly.newPlot("chart", figure.data, figure.layout, {{ responsive: true }});
</script>
</body>
</html>
"#,
        title = escape_html(&data.title),
        cdn = PLOTLY_CDN,
        height = height,
        figure = figure,
    ))
}

/// Writes the document to `output`, or to a kept temporary file.
pub fn write_html(html: &str, output: Option<&Path>, title: &str) -> Result<PathBuf, ChartError> {
    if let Some(path) = output {
        std::fs::write(path, html)?;
        return Ok(path.to_path_buf());
    }

    let prefix: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let mut file = tempfile::Builder::new()
        .prefix(&format!("{}_stock_revenue_", prefix))
        .suffix(".html")
        .tempfile()?;
    file.write_all(html.as_bytes())?;
    let (_, path) = file.keep().map_err(|e| ChartError::Io(e.error))?;
    Ok(path)
}

pub fn open_in_viewer(path: &Path) -> Result<(), ChartError> {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else {
        Command::new("xdg-open")
    };

    command
        .arg(path)
        .spawn()
        .map(|_| ())
        .map_err(|e| ChartError::Viewer(e.to_string()))
}

fn panel_points<I>(points: I, origin: NaiveDate) -> Vec<(f32, f32)>
where
    I: Iterator<Item = (NaiveDate, f64)>,
{
    let mut samples: Vec<(f32, f32)> = points
        .map(|(date, value)| ((date - origin).num_days() as f32, value as f32))
        .collect();
    samples.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    samples
}

pub fn render_terminal(data: &ChartData, width: u32, height: u32) -> Result<(), ChartError> {
    let revenue_dates: Vec<(NaiveDate, f64)> = data
        .revenue
        .iter()
        .filter_map(|r| parse_display_date(&r.date).map(|date| (date, r.revenue)))
        .collect();

    let first = data
        .prices
        .iter()
        .map(|r| r.date)
        .chain(revenue_dates.iter().map(|(d, _)| *d))
        .min()
        .ok_or(ChartError::EmptyWindow(data.cutoff))?;
    let last = data
        .prices
        .iter()
        .map(|r| r.date)
        .chain(revenue_dates.iter().map(|(d, _)| *d))
        .max()
        .unwrap_or(first);

    let x_max = ((last - first).num_days() as f32).max(1.0);
    let plot_width = width.max(40);
    let plot_height = height.max(10);

    println!("{} (records on or before {})", data.title, data.cutoff);

    let panels = [
        (
            "Historical Share Price",
            "Price ($US)",
            panel_points(data.prices.iter().map(|r| (r.date, r.close)), first),
        ),
        (
            "Historical Revenue",
            "Revenue ($US Millions)",
            panel_points(revenue_dates.into_iter(), first),
        ),
    ];

    for (title, y_label, samples) in panels.iter() {
        println!("\n{} [{}] from {} to {}", title, y_label, first, last);
        if samples.len() < 2 {
            warn!(panel = *title, points = samples.len(), "Not enough points to draw panel");
            continue;
        }
        Chart::new(plot_width, plot_height, 0.0, x_max)
            .lineplot(&Shape::Lines(samples))
            .display();
    }
    println!();
    Ok(())
}

/// Renders to the chosen target. Returns the document path for browser output.
pub fn render(data: &ChartData, target: &ChartTarget, height: u32) -> Result<Option<PathBuf>, ChartError> {
    if data.is_empty() {
        warn!(cutoff = %data.cutoff, "Chart window holds no records");
    }

    match target {
        ChartTarget::Browser { output, open } => {
            let html = render_html(data, height)?;
            let path = write_html(&html, output.as_deref(), &data.title)?;
            info!(path = %path.display(), "Wrote chart document");
            if *open {
                open_in_viewer(&path)?;
            }
            Ok(Some(path))
        }
        ChartTarget::Terminal { width, height } => {
            render_terminal(data, *width, *height)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn price(date: NaiveDate, close: f64) -> PriceRecord {
        PriceRecord {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1,
        }
    }

    fn revenue(date: &str, value: f64) -> RevenueRecord {
        RevenueRecord {
            date: date.to_string(),
            revenue: value,
        }
    }

    fn sample() -> ChartData {
        let prices = PriceSeries::new(
            "AAPL",
            vec![
                price(date(2023, 1, 3), 125.0),
                price(date(2024, 4, 18), 167.0),
                price(date(2024, 4, 19), 165.0),
                price(date(2024, 4, 22), 166.0),
                price(date(2024, 10, 18), 235.0),
            ],
        );
        let revenue = RevenueSeries {
            symbol: "AAPL".to_string(),
            records: vec![
                revenue("2024-09-30", 94930.0),
                revenue("2024-03-31", 90753.0),
                revenue("2023-12-31", 119575.0),
                revenue("2023", 383285.0),
            ],
        };
        ChartData::build(&prices, &revenue, "Apple", date(2024, 10, 19), 6)
    }

    #[test]
    fn test_window_cutoff() {
        assert_eq!(window_cutoff(date(2024, 10, 19), 6), date(2024, 4, 19));
        assert_eq!(window_cutoff(date(2024, 8, 31), 6), date(2024, 2, 29));
    }

    #[test]
    fn test_only_records_on_or_before_cutoff_survive() {
        let data = sample();
        assert_eq!(data.cutoff, date(2024, 4, 19));
        assert_eq!(data.prices.len(), 3);
        assert!(data.prices.iter().all(|r| r.date <= data.cutoff));
        assert_eq!(data.prices.last().unwrap().date, date(2024, 4, 19));

        let kept: Vec<&str> = data.revenue.iter().map(|r| r.date.as_str()).collect();
        assert_eq!(kept, vec!["2024-03-31", "2023-12-31", "2023"]);
    }

    #[test]
    fn test_figure_layout() {
        let figure = plotly_figure(&sample(), 900);
        let layout = &figure["layout"];
        assert_eq!(layout["title"]["text"], "Apple");
        assert_eq!(layout["height"], 900);
        assert_eq!(layout["showlegend"], false);
        assert_eq!(layout["xaxis"]["rangeslider"]["visible"], true);
        assert_eq!(layout["xaxis"]["matches"], "x2");
        assert_eq!(layout["yaxis"]["title"]["text"], "Price ($US)");
        assert_eq!(layout["yaxis2"]["title"]["text"], "Revenue ($US Millions)");
        assert_eq!(layout["annotations"][1]["text"], "Historical Revenue");

        let traces = figure["data"].as_array().unwrap();
        assert_eq!(traces[0]["x"][0], "2023-01-03");
        assert_eq!(traces[0]["y"].as_array().unwrap().len(), 3);
        assert_eq!(traces[1]["yaxis"], "y2");
        assert_eq!(traces[1]["y"][0], 90753.0);
    }

    #[test]
    fn test_html_document_escapes_title() {
        let mut data = sample();
        data.title = "AT&T </script>".to_string();
        let html = render_html(&data, 900).unwrap();
        assert!(html.contains("<title>AT&amp;T &lt;/script&gt;</title>"));
        assert!(html.contains(PLOTLY_CDN));
        assert_eq!(html.matches("</script>").count(), 2);
    }

    #[test]
    fn test_write_html_to_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.html");
        let written = write_html("<html></html>", Some(&path), "Apple").unwrap();
        assert_eq!(written, path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<html></html>");
    }

    #[test]
    fn test_browser_target_without_viewer() {
        let dir = tempfile::tempdir().unwrap();
        let target = ChartTarget::Browser {
            output: Some(dir.path().join("apple.html")),
            open: false,
        };
        let path = render(&sample(), &target, 900).unwrap().unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("Historical Share Price"));
    }

    #[test]
    fn test_terminal_render_on_empty_window_fails() {
        let data = ChartData::build(
            &PriceSeries::new("AAPL", vec![price(date(2024, 10, 18), 1.0)]),
            &RevenueSeries::default(),
            "Apple",
            date(2024, 10, 19),
            6,
        );
        assert!(data.is_empty());
        assert!(matches!(
            render_terminal(&data, 80, 20),
            Err(ChartError::EmptyWindow(_))
        ));
    }

    #[test]
    fn test_terminal_render() {
        assert!(render_terminal(&sample(), 80, 20).is_ok());
    }
}
