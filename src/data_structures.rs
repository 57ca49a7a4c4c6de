use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// --- Price Data ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Full daily history for one ticker, ascending by date.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub records: Vec<PriceRecord>,
}

impl PriceSeries {
    pub fn new(symbol: &str, mut records: Vec<PriceRecord>) -> Self {
        records.sort_by(|a, b| a.date.cmp(&b.date));
        Self {
            symbol: symbol.to_string(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn head(&self, n: usize) -> &[PriceRecord] {
        &self.records[..n.min(self.records.len())]
    }
}

// --- Revenue Data ---

/// One table row as displayed on the page, before cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRevenueRow {
    pub date: String,
    pub revenue: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueRecord {
    pub date: String,
    pub revenue: f64,
}

/// Cleaned revenue figures in page order. Values are non-negative.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RevenueSeries {
    pub symbol: String,
    pub records: Vec<RevenueRecord>,
}

impl RevenueSeries {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn head(&self, n: usize) -> &[RevenueRecord] {
        &self.records[..n.min(self.records.len())]
    }

    pub fn tail(&self, n: usize) -> &[RevenueRecord] {
        &self.records[self.records.len().saturating_sub(n)..]
    }
}

// --- Cleanup ---

const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// Strips thousands separators and currency symbols from a revenue cell.
pub fn strip_revenue_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ',' && !CURRENCY_SYMBOLS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parses a cleaned revenue string. `None` for empty, non-numeric or
/// negative amounts.
pub fn parse_revenue(cleaned: &str) -> Option<f64> {
    if cleaned.is_empty() {
        return None;
    }
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Some(value),
        _ => None,
    }
}

/// Parses a displayed date. Year-only labels map to January 1st.
pub fn parse_display_date(date: &str) -> Option<NaiveDate> {
    let date = date.trim();
    if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return Some(parsed);
    }
    date.parse::<i32>()
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
}
