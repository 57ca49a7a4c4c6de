//! Fetches a ticker's daily price history, scrapes its revenue table and
//! charts the two series on a shared date axis.

pub mod chart;
pub mod cli;
pub mod config;
pub mod data_structures;
pub mod export;
pub mod macrotrends;
pub mod pipeline;
pub mod utils;
pub mod yahoo;
