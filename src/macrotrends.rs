use crate::config::{AppConfig, RetryPolicy};
use crate::data_structures::{
    parse_revenue, strip_revenue_text, RawRevenueRow, RevenueRecord, RevenueSeries,
};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The page stayed blocked or unavailable for the whole retry budget.
    #[error("Unable to parse blocked HTML contents! {url} returned {status} after {attempts} attempts")]
    Retrieval { url: String, attempts: u32, status: u16 },
    #[error("expected at least {expected} tbody elements, found {found}")]
    MissingTable { expected: usize, found: usize },
    #[error("row {row} has {cells} cells, expected at least 2")]
    MalformedRow { row: usize, cells: usize },
    #[error("invalid selector {0}")]
    Selector(String),
    #[error("no user agents configured")]
    NoUserAgent,
}

#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

impl PageResponse {
    /// Only a plain 200 carries the page; every other status is retried.
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Transport used to GET a page. One request per call, no retries.
#[async_trait]
pub trait PageSource {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<PageResponse, ScrapeError>;
}

pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    pub fn new(timeout: Duration) -> Result<Self, ScrapeError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<PageResponse, ScrapeError> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9");

        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(PageResponse { status, body })
    }
}

/// Request parameters fixed for the whole run, retries included.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub headers: Vec<(String, String)>,
    pub retry: RetryPolicy,
}

impl ScrapeOptions {
    pub fn new(user_agent: &str, retry: RetryPolicy) -> Self {
        Self {
            headers: vec![("User-Agent".to_string(), user_agent.to_string())],
            retry,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ScrapeError> {
        let user_agent = pick_user_agent(&config.user_agents, config.user_agent_seed)?;
        Ok(Self::new(user_agent, config.retry))
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("user-agent"))
            .map(|(_, value)| value.as_str())
    }
}

/// Picks one agent from the pool. A seed makes the choice reproducible.
pub fn pick_user_agent(agents: &[String], seed: Option<u64>) -> Result<&str, ScrapeError> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    agents
        .choose(&mut rng)
        .map(String::as_str)
        .ok_or(ScrapeError::NoUserAgent)
}

pub fn revenue_url(base_url: &str, symbol: &str, company: &str) -> String {
    format!(
        "{}/stocks/charts/{}/{}/revenue",
        base_url.trim_end_matches('/'),
        symbol,
        company.to_lowercase()
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalState {
    Pending,
    Retrying(u32),
    Done,
    Exhausted,
}

impl fmt::Display for RetrievalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalState::Pending => f.write_str("Pending"),
            RetrievalState::Retrying(n) => write!(f, "Retrying[{}]", n),
            RetrievalState::Done => f.write_str("Done"),
            RetrievalState::Exhausted => f.write_str("Exhausted"),
        }
    }
}

fn transition(state: &mut RetrievalState, next: RetrievalState, url: &str) {
    debug!(url, "{} → {}", state, next);
    *state = next;
}

/// GETs `url` and parses the body. Any status other than 200 is retried
/// `options.retry.max_retries` times with a fixed delay; transport errors are
/// returned immediately.
#[instrument(skip(source, options))]
pub async fn retrieve_html<S>(source: &S, url: &str, options: &ScrapeOptions) -> Result<Html, ScrapeError>
where
    S: PageSource + ?Sized,
{
    let mut state = RetrievalState::Pending;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let response = source.get(url, &options.headers).await?;

        if response.is_success() {
            transition(&mut state, RetrievalState::Done, url);
            info!(attempts, bytes = response.body.len(), "Retrieved page");
            return Ok(Html::parse_document(&response.body));
        }

        let retries_used = attempts - 1;
        if retries_used >= options.retry.max_retries {
            transition(&mut state, RetrievalState::Exhausted, url);
            warn!(attempts, status = response.status, "Retry budget exhausted");
            return Err(ScrapeError::Retrieval {
                url: url.to_string(),
                attempts,
                status: response.status,
            });
        }

        transition(&mut state, RetrievalState::Retrying(retries_used + 1), url);
        warn!(
            attempt = attempts,
            status = response.status,
            delay_secs = options.retry.delay.as_secs_f64(),
            "Page blocked or unavailable, retrying"
        );
        sleep(options.retry.delay).await;
    }
}

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Selector(format!("{}: {}", css, e)))
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Reads (date, revenue) pairs from the second `tbody` on the page. The first
/// one holds the annual table; the second holds the quarterly figures.
///
/// The HTML5 parser gives every table a `tbody`, so a table written without
/// one still counts toward the position.
pub fn extract_revenue_rows(document: &Html) -> Result<Vec<RawRevenueRow>, ScrapeError> {
    let tbody = selector("tbody")?;
    let tr = selector("tr")?;
    let td = selector("td")?;

    let bodies: Vec<ElementRef<'_>> = document.select(&tbody).collect();
    let table = bodies.get(1).ok_or(ScrapeError::MissingTable {
        expected: 2,
        found: bodies.len(),
    })?;

    let mut rows = Vec::new();
    for (index, row) in table.select(&tr).enumerate() {
        let cells: Vec<ElementRef<'_>> = row.select(&td).collect();
        if cells.len() < 2 {
            return Err(ScrapeError::MalformedRow {
                row: index,
                cells: cells.len(),
            });
        }
        rows.push(RawRevenueRow {
            date: cell_text(&cells[0]),
            revenue: cell_text(&cells[1]),
        });
    }

    Ok(rows)
}

/// Strips separators and currency symbols and drops rows that do not leave a
/// non-negative amount behind.
pub fn clean_revenue(symbol: &str, rows: Vec<RawRevenueRow>) -> RevenueSeries {
    let total = rows.len();
    let mut records = Vec::with_capacity(total);

    for row in rows {
        let cleaned = strip_revenue_text(&row.revenue);
        if cleaned.is_empty() {
            debug!(date = %row.date, "Dropping row with empty revenue");
            continue;
        }
        match parse_revenue(&cleaned) {
            Some(revenue) => records.push(RevenueRecord {
                date: row.date,
                revenue,
            }),
            None => warn!(date = %row.date, revenue = %row.revenue, "Dropping row with unparseable revenue"),
        }
    }

    debug!(symbol, kept = records.len(), dropped = total - records.len(), "Cleaned revenue rows");
    RevenueSeries {
        symbol: symbol.to_string(),
        records,
    }
}

pub struct MacrotrendsClient<S> {
    source: S,
    base_url: String,
    options: ScrapeOptions,
}

impl MacrotrendsClient<HttpPageSource> {
    pub fn from_config(config: &AppConfig) -> Result<Self, ScrapeError> {
        let source = HttpPageSource::new(config.request_timeout)?;
        let options = ScrapeOptions::from_config(config)?;
        Ok(Self::new(source, &config.revenue_base_url, options))
    }
}

impl<S: PageSource> MacrotrendsClient<S> {
    pub fn new(source: S, base_url: &str, options: ScrapeOptions) -> Self {
        Self {
            source,
            base_url: base_url.to_string(),
            options,
        }
    }

    pub fn options(&self) -> &ScrapeOptions {
        &self.options
    }

    #[instrument(skip(self))]
    pub async fn fetch_revenue(&self, symbol: &str, company: &str) -> Result<RevenueSeries, ScrapeError> {
        let url = revenue_url(&self.base_url, symbol, company);
        let document = retrieve_html(&self.source, &url, &self.options).await?;
        let rows = extract_revenue_rows(&document)?;
        info!(symbol, rows = rows.len(), "Parsed revenue table");
        Ok(clean_revenue(symbol, rows))
    }
}
