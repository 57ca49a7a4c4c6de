use crate::data_structures::{PriceRecord, PriceSeries};
use chrono::DateTime;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum YahooError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unexpected status {status} for {symbol}")]
    Status { symbol: String, status: u16 },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("no data for {0}")]
    NoData(String),
}

/// Daily price history from the Yahoo Finance chart endpoint.
pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, YahooError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(YahooClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn history_url(&self, symbol: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}?range=max&interval=1d&includeAdjustedClose=true",
            self.base_url,
            symbol.to_uppercase()
        )
    }

    /// Fetches the maximal available daily history. Failures are not retried.
    #[instrument(skip(self))]
    pub async fn get_history(&self, symbol: &str) -> Result<PriceSeries, YahooError> {
        let url = self.history_url(symbol);
        debug!(%url, "Requesting price history");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json, text/plain, */*")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(YahooError::Status {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let data: Value = serde_json::from_str(&body)?;
        let series = parse_chart(symbol, &data)?;

        info!(symbol, rows = series.len(), "Fetched price history");
        Ok(series)
    }
}

fn column<'a>(quote: &'a Value, key: &str) -> Result<&'a Vec<Value>, YahooError> {
    quote
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| YahooError::InvalidResponse(format!("Missing key: {}", key)))
}

/// Converts a chart response into a date-keyed series.
pub fn parse_chart(symbol: &str, data: &Value) -> Result<PriceSeries, YahooError> {
    let chart = data
        .get("chart")
        .ok_or_else(|| YahooError::InvalidResponse("Missing key: chart".to_string()))?;

    if let Some(error) = chart.get("error").filter(|e| !e.is_null()) {
        let description = error
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        return Err(YahooError::InvalidResponse(description.to_string()));
    }

    let result = chart
        .get("result")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| YahooError::NoData(symbol.to_string()))?;

    // Missing timestamps means the symbol has no trading history
    let Some(times) = result.get("timestamp").and_then(|v| v.as_array()) else {
        return Err(YahooError::NoData(symbol.to_string()));
    };

    let gmt_offset = result
        .get("meta")
        .and_then(|m| m.get("gmtoffset"))
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let quote = result
        .get("indicators")
        .and_then(|i| i.get("quote"))
        .and_then(|q| q.as_array())
        .and_then(|q| q.first())
        .ok_or_else(|| YahooError::InvalidResponse("Missing key: indicators.quote".to_string()))?;

    let opens = column(quote, "open")?;
    let highs = column(quote, "high")?;
    let lows = column(quote, "low")?;
    let closes = column(quote, "close")?;
    let volumes = column(quote, "volume")?;

    let length = times.len();
    if [opens.len(), highs.len(), lows.len(), closes.len(), volumes.len()]
        .iter()
        .any(|&len| len != length)
    {
        return Err(YahooError::InvalidResponse("Inconsistent array lengths".to_string()));
    }

    let mut records = Vec::with_capacity(length);
    for i in 0..length {
        let timestamp = times[i].as_i64().ok_or_else(|| {
            YahooError::InvalidResponse(format!("Invalid timestamp format at index {}: {:?}", i, &times[i]))
        })?;

        // Placeholder rows carry a timestamp but null prices
        let Some(close) = closes[i].as_f64() else {
            continue;
        };

        let time = DateTime::from_timestamp(timestamp + gmt_offset, 0).ok_or_else(|| {
            YahooError::InvalidResponse(format!("Cannot convert timestamp {} to date at index {}", timestamp, i))
        })?;

        records.push(PriceRecord {
            date: time.date_naive(),
            open: opens[i].as_f64().unwrap_or(close),
            high: highs[i].as_f64().unwrap_or(close),
            low: lows[i].as_f64().unwrap_or(close),
            close,
            volume: volumes[i].as_u64().unwrap_or(0),
        });
    }

    if records.is_empty() {
        return Err(YahooError::NoData(symbol.to_string()));
    }

    Ok(PriceSeries::new(symbol, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fixture() -> Value {
        json!({
            "chart": {
                "result": [{
                    "meta": { "symbol": "AAPL", "gmtoffset": -14400 },
                    "timestamp": [1609770600, 1609857000, 1609943400],
                    "indicators": {
                        "quote": [{
                            "open": [133.52, 128.89, null],
                            "high": [133.61, 131.74, null],
                            "low": [126.76, 128.43, null],
                            "close": [129.41, 131.01, null],
                            "volume": [143301900u64, 97664900u64, null]
                        }],
                        "adjclose": [{ "adjclose": [126.83, 128.40, null] }]
                    }
                }],
                "error": null
            }
        })
    }

    #[tokio::test]
    async fn test_yahoo_client_creation() {
        let client = YahooClient::new("https://query1.finance.yahoo.com/", "test-agent", Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_get_history_connection_refused() {
        let client = YahooClient::new("http://127.0.0.1:1", "test-agent", Duration::from_secs(5)).unwrap();
        match client.get_history("AAPL").await {
            Err(YahooError::Http(_)) => {}
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    /// Serves one canned HTTP response on a local port and returns its base URL.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_get_history_error_status() {
        let base = serve_once("HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let client = YahooClient::new(&base, "test-agent", Duration::from_secs(5)).unwrap();
        match client.get_history("aapl").await {
            Err(YahooError::Status { symbol, status }) => {
                assert_eq!(symbol, "aapl");
                assert_eq!(status, 503);
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_history_bad_json() {
        let base = serve_once("HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 9\r\nconnection: close\r\n\r\nnot json!").await;
        let client = YahooClient::new(&base, "test-agent", Duration::from_secs(5)).unwrap();
        assert!(matches!(
            client.get_history("AAPL").await,
            Err(YahooError::Serialization(_))
        ));
    }

    #[test]
    fn test_history_url() {
        let client = YahooClient::new("https://query1.finance.yahoo.com", "test-agent", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.history_url("tsla"),
            "https://query1.finance.yahoo.com/v8/finance/chart/TSLA?range=max&interval=1d&includeAdjustedClose=true"
        );
    }

    #[test]
    fn test_parse_chart_exposes_dates() {
        let series = parse_chart("AAPL", &fixture()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.records[0].date, NaiveDate::from_ymd_opt(2021, 1, 4).unwrap());
        assert_eq!(series.records[1].date, NaiveDate::from_ymd_opt(2021, 1, 5).unwrap());
        assert_eq!(series.records[0].close, 129.41);
        assert_eq!(series.records[0].volume, 143301900);
    }

    #[test]
    fn test_parse_chart_error_object() {
        let data = json!({
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
            }
        });
        match parse_chart("NOPE", &data) {
            Err(YahooError::InvalidResponse(msg)) => assert!(msg.contains("delisted")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_chart_inconsistent_lengths() {
        let mut data = fixture();
        data["chart"]["result"][0]["indicators"]["quote"][0]["close"] = json!([1.0]);
        assert!(matches!(parse_chart("AAPL", &data), Err(YahooError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_chart_without_timestamps() {
        let data = json!({ "chart": { "result": [{ "meta": {}, "indicators": { "quote": [{}] } }], "error": null } });
        assert!(matches!(parse_chart("AAPL", &data), Err(YahooError::NoData(_))));
    }
}
