use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Duration;

pub const DEFAULT_PRICE_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_REVENUE_BASE_URL: &str = "https://www.macrotrends.net";

pub fn default_user_agents() -> Vec<String> {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36".to_string(),
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Safari/605.1.15".to_string(),
    ]
}

// Bounded retry for the revenue page, which intermittently blocks bots
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(5),
        }
    }
}

// YAML-serializable configuration structure
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ConfigYaml {
    pub price_base_url: Option<String>,
    pub revenue_base_url: Option<String>,
    pub user_agents: Option<Vec<String>>,
    pub user_agent_seed: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub window_months: Option<u32>,
    pub chart_height: Option<u32>,
}

// Holds application-wide settings
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub price_base_url: String,
    pub revenue_base_url: String,
    pub user_agents: Vec<String>,
    pub user_agent_seed: Option<u64>,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub window_months: u32,
    pub chart_height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_yaml_config(ConfigYaml::default())
    }
}

impl AppConfig {
    // Load configuration from YAML file or environment variables
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            Self::from_yaml(&config_file)
        } else {
            Ok(Self::from_env())
        }
    }

    pub fn from_yaml(file_path: &str) -> anyhow::Result<Self> {
        let yaml_content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config file {}", file_path))?;
        Self::from_yaml_str(&yaml_content)
    }

    pub fn from_yaml_str(yaml_content: &str) -> anyhow::Result<Self> {
        let yaml_config: ConfigYaml =
            serde_yaml::from_str(yaml_content).context("Failed to parse YAML config")?;
        Ok(Self::from_yaml_config(yaml_config))
    }

    fn from_yaml_config(yaml_config: ConfigYaml) -> Self {
        let defaults = RetryPolicy::default();
        let user_agents = yaml_config
            .user_agents
            .filter(|agents| !agents.is_empty())
            .unwrap_or_else(default_user_agents);

        Self {
            price_base_url: yaml_config
                .price_base_url
                .unwrap_or_else(|| DEFAULT_PRICE_BASE_URL.to_string()),
            revenue_base_url: yaml_config
                .revenue_base_url
                .unwrap_or_else(|| DEFAULT_REVENUE_BASE_URL.to_string()),
            user_agents,
            user_agent_seed: yaml_config.user_agent_seed,
            retry: RetryPolicy {
                max_retries: yaml_config.max_retries.unwrap_or(defaults.max_retries),
                delay: yaml_config
                    .retry_delay_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.delay),
            },
            request_timeout: Duration::from_secs(yaml_config.request_timeout_secs.unwrap_or(30)),
            window_months: yaml_config.window_months.unwrap_or(6),
            chart_height: yaml_config.chart_height.unwrap_or(900),
        }
    }

    // Load all configuration from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env file if present

        let user_agents = env::var("USER_AGENTS").ok().map(|agents| {
            agents
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect::<Vec<String>>()
        });

        Self::from_yaml_config(ConfigYaml {
            price_base_url: env::var("PRICE_BASE_URL").ok(),
            revenue_base_url: env::var("REVENUE_BASE_URL").ok(),
            user_agents,
            user_agent_seed: parse_env("USER_AGENT_SEED"),
            max_retries: parse_env("MAX_RETRIES"),
            retry_delay_secs: parse_env("RETRY_DELAY_SECS"),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS"),
            window_months: parse_env("WINDOW_MONTHS"),
            chart_height: parse_env("CHART_HEIGHT"),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}
