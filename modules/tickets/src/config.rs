use event_bus::consumer_retry::RetryConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: BusType,
    pub nats_url: String,
    pub host: String,
    pub port: u16,
    /// Base URL of the external collaborators (receipts, payments, ...)
    pub gateway_url: String,
    pub forwarder: ForwarderConfig,
    pub router: RouterSettings,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    InMemory,
    Nats,
}

impl FromStr for BusType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inmemory" => Ok(Self::InMemory),
            "nats" => Ok(Self::Nats),
            other => Err(format!(
                "Invalid BUS_TYPE: {other}. Must be 'inmemory' or 'nats'"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub retry: RetryConfig,
    pub intake_buffer: usize,
    pub skip_message_ids: Vec<String>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            intake_buffer: 16,
            skip_message_ids: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let bus_type = env::var("BUS_TYPE")
            .unwrap_or_else(|_| "inmemory".to_string())
            .parse()?;

        let nats_url = env::var("NATS_URL")
            .unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let host = env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let port: u16 = parse_var("PORT", 8080)?;

        let gateway_url = env::var("GATEWAY_URL")
            .unwrap_or_else(|_| "http://localhost:8888".to_string());

        let forwarder = ForwarderConfig {
            poll_interval: Duration::from_millis(parse_var("FORWARDER_POLL_INTERVAL_MS", 1000)?),
            batch_size: parse_var("FORWARDER_BATCH_SIZE", 100)?,
        };
        if forwarder.batch_size <= 0 {
            return Err("FORWARDER_BATCH_SIZE must be positive".to_string());
        }

        let retry = RetryConfig {
            max_retries: parse_var("ROUTER_MAX_RETRIES", 10)?,
            initial_interval: Duration::from_millis(parse_var("ROUTER_INITIAL_INTERVAL_MS", 100)?),
            multiplier: parse_var("ROUTER_MULTIPLIER", 2.0)?,
            max_interval: Duration::from_millis(parse_var("ROUTER_MAX_INTERVAL_MS", 1000)?),
        };
        if retry.multiplier.is_nan() || retry.multiplier < 1.0 {
            return Err("ROUTER_MULTIPLIER must be at least 1.0".to_string());
        }

        let router = RouterSettings {
            retry,
            intake_buffer: parse_var("ROUTER_INTAKE_BUFFER", 16)?,
            skip_message_ids: parse_list(&env::var("ROUTER_SKIP_MESSAGE_IDS").unwrap_or_default()),
        };

        let shutdown_grace = Duration::from_secs(parse_var("SHUTDOWN_GRACE_SECS", 5)?);

        Ok(Config {
            database_url,
            bus_type,
            nats_url,
            host,
            port,
            gateway_url,
            forwarder,
            router,
            shutdown_grace,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| format!("{name} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
