use std::env;
use std::fmt;
use std::time::Duration;

use crate::alerts::RepeatPolicy;
use crate::cli::Cli;
use crate::engine::{RetryPolicy, MAX_LOOKAHEAD_DAYS};
use crate::fares::{ryanair::DEFAULT_BASE_URL, Route};

#[derive(Clone)]
pub struct Config {
    pub route: Route,
    pub fare_api_url: String,
    pub lookahead_days: u32,
    pub poll_interval: Duration,
    pub first_tick_delay: Duration,
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
    pub database_url: String,
    pub api_port: u16,
    pub repeat_policy: RepeatPolicy,
    pub notifier: NotifierKind,
    pub telegram_bot_token: Option<String>,
    pub notify_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierKind {
    Log,
    Webhook,
    Telegram,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let origin = var("ORIGIN_CODE").unwrap_or_else(|| "AGA".to_string());
        let destination = var("DESTINATION_CODE").unwrap_or_else(|| "FEZ".to_string());
        let route = Route::new(&origin, &destination).map_err(|err| err.to_string())?;

        let fare_api_url = var("FARE_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !(fare_api_url.starts_with("http://") || fare_api_url.starts_with("https://")) {
            return Err(format!("FARE_API_URL must be an http(s) URL, got {}", fare_api_url));
        }

        let lookahead_days = parse_number(&var, "LOOKAHEAD_DAYS", 30u32)?;
        if lookahead_days == 0 || lookahead_days > MAX_LOOKAHEAD_DAYS {
            return Err(format!(
                "LOOKAHEAD_DAYS must be between 1 and {}",
                MAX_LOOKAHEAD_DAYS
            ));
        }

        let poll_interval_seconds = parse_number(&var, "POLL_INTERVAL_SECONDS", 1800u64)?;
        if poll_interval_seconds == 0 {
            return Err("POLL_INTERVAL_SECONDS must be greater than zero".to_string());
        }
        let first_tick_delay_seconds = parse_number(&var, "FIRST_TICK_DELAY_SECONDS", 60u64)?;
        let fetch_timeout_seconds = parse_number(&var, "FETCH_TIMEOUT_SECONDS", 15u64)?;
        if fetch_timeout_seconds == 0 {
            return Err("FETCH_TIMEOUT_SECONDS must be greater than zero".to_string());
        }

        let max_attempts = parse_number(&var, "FETCH_MAX_ATTEMPTS", 3u32)?;
        if max_attempts == 0 {
            return Err("FETCH_MAX_ATTEMPTS must be at least 1".to_string());
        }
        let retry_base_ms = parse_number(&var, "FETCH_RETRY_BASE_MS", 500u64)?;

        let database_url = var("DATABASE_URL").unwrap_or_else(|| "sqlite://fare_watch.db".to_string());
        let api_port = parse_number(&var, "API_PORT", 3000u16)?;

        let cooldown_seconds = parse_number(&var, "ALERT_COOLDOWN_SECONDS", 21_600i64)?;
        let repeat_policy = RepeatPolicy::parse(
            &var("ALERT_REPEAT").unwrap_or_else(|| "always".to_string()),
            chrono::Duration::seconds(cooldown_seconds),
        )
        .map_err(|err| format!("ALERT_REPEAT/ALERT_COOLDOWN_SECONDS: {}", err))?;

        let notifier = match var("NOTIFIER")
            .unwrap_or_else(|| "log".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "log" => NotifierKind::Log,
            "webhook" => NotifierKind::Webhook,
            "telegram" => NotifierKind::Telegram,
            other => return Err(format!("Invalid NOTIFIER: {}", other)),
        };
        let telegram_bot_token = var("TELEGRAM_BOT_TOKEN");
        if notifier == NotifierKind::Telegram && telegram_bot_token.is_none() {
            return Err("TELEGRAM_BOT_TOKEN is required when NOTIFIER=telegram".to_string());
        }
        let notify_timeout_seconds = parse_number(&var, "NOTIFY_TIMEOUT_SECONDS", 10u64)?;

        Ok(Self {
            route,
            fare_api_url,
            lookahead_days,
            poll_interval: Duration::from_secs(poll_interval_seconds),
            first_tick_delay: Duration::from_secs(first_tick_delay_seconds),
            fetch_timeout: Duration::from_secs(fetch_timeout_seconds),
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(retry_base_ms)),
            database_url,
            api_port,
            repeat_policy,
            notifier,
            telegram_bot_token,
            notify_timeout: Duration::from_secs(notify_timeout_seconds),
        })
    }

    /// Command-line flags take precedence over the environment.
    pub fn apply_cli(&mut self, cli: &Cli) -> Result<(), String> {
        if cli.origin.is_some() || cli.destination.is_some() {
            let origin = cli.origin.as_deref().unwrap_or(self.route.origin());
            let destination = cli.destination.as_deref().unwrap_or(self.route.destination());
            self.route = Route::new(origin, destination).map_err(|err| err.to_string())?;
        }
        if let Some(seconds) = cli.poll_interval {
            if seconds == 0 {
                return Err("--poll-interval must be greater than zero".to_string());
            }
            self.poll_interval = Duration::from_secs(seconds);
        }
        if let Some(url) = &cli.database_url {
            self.database_url = url.clone();
        }
        if let Some(port) = cli.port {
            self.api_port = port;
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, String> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("route", &self.route.to_string())
            .field("fare_api_url", &self.fare_api_url)
            .field("lookahead_days", &self.lookahead_days)
            .field("poll_interval", &self.poll_interval)
            .field("first_tick_delay", &self.first_tick_delay)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("retry", &self.retry)
            .field("database_url", &self.database_url)
            .field("api_port", &self.api_port)
            .field("repeat_policy", &self.repeat_policy)
            .field("notifier", &self.notifier)
            .field(
                "telegram_bot_token",
                &self.telegram_bot_token.as_ref().map(|_| "<redacted>"),
            )
            .field("notify_timeout", &self.notify_timeout)
            .finish()
    }
}
