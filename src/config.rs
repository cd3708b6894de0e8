//! Configuration loader for the `codemetal-hydroflow` ingestion service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Each upstream source is optional: a pipeline is
//! only registered when its URL is set, so a deployment can run any subset.
//!
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::http::Backoff;
use crate::time::MAX_WINDOW_DAYS;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional `u64` environment variable with a default value.
macro_rules! parse_env_u64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional boolean (`1|true|yes` / `0|false|no`).
macro_rules! parse_env_bool {
    ($var_name:expr, $default:expr) => {
        match env::var($var_name).ok().as_deref().map(str::to_ascii_lowercase).as_deref() {
            None => $default,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => return Err(anyhow!("Invalid {}: {}", $var_name, other)),
        }
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Read an optional, non-empty string variable.
fn optional_env(var_name: &str) -> Option<String> {
    env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Split a comma list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Request window length in days, at most [`MAX_WINDOW_DAYS`].
fn window_days(var_name: &str, default: u32) -> Result<u32> {
    let days = parse_env_u32!(var_name, default);
    if days > MAX_WINDOW_DAYS {
        return Err(anyhow!(
            "Invalid {}: {} exceeds {} days",
            var_name,
            days,
            MAX_WINDOW_DAYS
        ));
    }
    Ok(days)
}

/// Per-source call discipline.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub url: String,
    /// Attempts per call, including the first.
    pub max_retries: u32,
    pub timeout: Duration,
    /// Scheduler period.
    pub interval: Duration,
}

/// Defaults for one source prefix: (max_retries, timeout_ms, interval_secs).
struct SourceDefaults(u32, u64, u64);

fn load_source(prefix: &str, url: String, defaults: SourceDefaults) -> Result<SourceConfig> {
    // ---
    let SourceDefaults(retries, timeout_ms, interval_secs) = defaults;
    let max_retries = parse_env_u32!(&format!("{prefix}_MAX_RETRIES"), retries);
    let timeout_ms = parse_env_u64!(&format!("{prefix}_TIMEOUT_MS"), timeout_ms);
    let interval_secs = parse_env_u64!(&format!("{prefix}_INTERVAL_SECS"), interval_secs);
    if interval_secs == 0 {
        return Err(anyhow!("{prefix}_INTERVAL_SECS must be greater than zero"));
    }
    Ok(SourceConfig {
        url,
        max_retries: max_retries.max(1),
        timeout: Duration::from_millis(timeout_ms),
        interval: Duration::from_secs(interval_secs),
    })
}

#[derive(Debug, Clone)]
pub struct HydroConfig {
    pub source: SourceConfig,
    pub station_id: String,
    pub station_name: String,
    pub lookback_days: u32,
    pub forecast_days: u32,
}

#[derive(Debug, Clone)]
pub struct TideForecastConfig {
    pub source: SourceConfig,
    pub locations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TideRealtimeConfig {
    pub source: SourceConfig,
    pub stations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StationConfig {
    pub source: SourceConfig,
    pub token: Option<String>,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string; only optional for in-memory runs.
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Bind address of the control API.
    pub http_bind: SocketAddr,

    /// Delay before the first run of every pipeline.
    pub startup_delay: Duration,

    /// Backoff shape shared by all outbound calls.
    pub backoff: Backoff,

    pub hydro: Option<HydroConfig>,
    pub tide_forecast: Option<TideForecastConfig>,
    pub tide_realtime: Option<TideRealtimeConfig>,
    pub lake: Option<SourceConfig>,
    pub station: Option<StationConfig>,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `DATABASE_URL` – PostgreSQL connection string (required by `main.rs`
///   unless running against the in-memory store)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `HTTP_BIND` – control API address (default: `0.0.0.0:8080`)
/// - `STARTUP_DELAY_SECS` – delay before first runs (default: 10)
/// - `RETRY_BASE_DELAY_MS`, `RETRY_MAX_DELAY_MS`, `RETRY_JITTER`
/// - one URL per source, plus `<PREFIX>_MAX_RETRIES`, `<PREFIX>_TIMEOUT_MS`
///   and `<PREFIX>_INTERVAL_SECS`
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = optional_env("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let http_bind = optional_env("HTTP_BIND")
        .unwrap_or_else(|| "0.0.0.0:8080".to_string())
        .parse::<SocketAddr>()
        .map_err(|e| anyhow!("Invalid HTTP_BIND: {}", e))?;
    let startup_delay = Duration::from_secs(parse_env_u64!("STARTUP_DELAY_SECS", 10));

    let backoff = Backoff {
        base_delay: Duration::from_millis(parse_env_u64!("RETRY_BASE_DELAY_MS", 1000)),
        max_delay: Duration::from_millis(parse_env_u64!("RETRY_MAX_DELAY_MS", 30_000)),
        jitter: parse_env_bool!("RETRY_JITTER", true),
    };

    let hydro = match optional_env("HYDRO_API_URL") {
        None => None,
        Some(url) => Some(HydroConfig {
            source: load_source("HYDRO", url, SourceDefaults(3, 30_000, 900))?,
            station_id: require_env!("HYDRO_STATION_ID"),
            station_name: optional_env("HYDRO_STATION_NAME").unwrap_or_default(),
            lookback_days: window_days("HYDRO_LOOKBACK_DAYS", 3)?,
            forecast_days: window_days("HYDRO_FORECAST_DAYS", 2)?,
        }),
    };

    let tide_forecast = match optional_env("TIDE_FORECAST_API_URL") {
        None => None,
        Some(url) => Some(TideForecastConfig {
            source: load_source("TIDE_FORECAST", url, SourceDefaults(3, 30_000, 21_600))?,
            locations: parse_list(&require_env!("TIDE_FORECAST_LOCATIONS")),
        }),
    };

    let tide_realtime = match optional_env("TIDE_REALTIME_API_URL") {
        None => None,
        Some(url) => Some(TideRealtimeConfig {
            source: load_source("TIDE_REALTIME", url, SourceDefaults(3, 15_000, 900))?,
            stations: parse_list(&require_env!("TIDE_REALTIME_STATIONS")),
        }),
    };

    let lake = optional_env("LAKE_PAGE_URL")
        .map(|url| load_source("LAKE", url, SourceDefaults(3, 20_000, 300)))
        .transpose()?;

    let station = match optional_env("STATION_API_URL") {
        None => None,
        Some(url) => Some(StationConfig {
            source: load_source("STATION", url, SourceDefaults(3, 20_000, 300))?,
            token: optional_env("STATION_API_TOKEN"),
        }),
    };

    Ok(Config {
        db_url,
        db_pool_max,
        http_bind,
        startup_delay,
        backoff,
        hydro,
        tide_forecast,
        tide_realtime,
        lake,
        station,
    })
}

/// Mask the password component of a connection URL.
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password and the station API token.
    pub fn log_config(&self) {
        // ---
        let describe = |s: &SourceConfig| {
            format!(
                "{} (every {:?}, {} attempt(s), timeout {:?})",
                s.url, s.interval, s.max_retries, s.timeout
            )
        };

        tracing::info!("Configuration loaded:");
        match &self.db_url {
            Some(url) => tracing::info!("  DATABASE_URL   : {}", mask_db_url(url)),
            None => tracing::info!("  DATABASE_URL   : unset"),
        }
        tracing::info!("  DB_POOL_MAX    : {}", self.db_pool_max);
        tracing::info!("  HTTP_BIND      : {}", self.http_bind);
        tracing::info!("  STARTUP_DELAY  : {:?}", self.startup_delay);
        tracing::info!(
            "  RETRY          : base {:?}, max {:?}, jitter {}",
            self.backoff.base_delay,
            self.backoff.max_delay,
            self.backoff.jitter
        );
        match &self.hydro {
            Some(h) => tracing::info!(
                "  HYDRO          : {} station={} lookback={}d forecast={}d",
                describe(&h.source),
                h.station_id,
                h.lookback_days,
                h.forecast_days
            ),
            None => tracing::info!("  HYDRO          : disabled"),
        }
        match &self.tide_forecast {
            Some(t) => tracing::info!(
                "  TIDE_FORECAST  : {} locations={:?}",
                describe(&t.source),
                t.locations
            ),
            None => tracing::info!("  TIDE_FORECAST  : disabled"),
        }
        match &self.tide_realtime {
            Some(t) => tracing::info!(
                "  TIDE_REALTIME  : {} stations={:?}",
                describe(&t.source),
                t.stations
            ),
            None => tracing::info!("  TIDE_REALTIME  : disabled"),
        }
        match &self.lake {
            Some(l) => tracing::info!("  LAKE           : {}", describe(l)),
            None => tracing::info!("  LAKE           : disabled"),
        }
        match &self.station {
            Some(s) => tracing::info!(
                "  STATION        : {} token={}",
                describe(&s.source),
                if s.token.is_some() { "****" } else { "none" }
            ),
            None => tracing::info!("  STATION        : disabled"),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn password_is_masked() {
        assert_eq!(
            mask_db_url("postgres://hydro:s3cret@db:5432/hydro"),
            "postgres://hydro:****@db:5432/hydro"
        );
        assert_eq!(mask_db_url("postgres://db/hydro"), "postgres://db/hydro");
    }

    #[test]
    fn window_days_are_bounded() {
        // ---
        env::set_var("HYDROFLOW_TEST_WINDOW_OK", "30");
        assert_eq!(window_days("HYDROFLOW_TEST_WINDOW_OK", 3).unwrap(), 30);
        assert_eq!(window_days("HYDROFLOW_TEST_WINDOW_UNSET", 3).unwrap(), 3);

        env::set_var("HYDROFLOW_TEST_WINDOW_HUGE", u32::MAX.to_string());
        let err = window_days("HYDROFLOW_TEST_WINDOW_HUGE", 3).unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{err}");
    }

    #[test]
    fn lists_drop_blanks() {
        assert_eq!(parse_list(" VT, ,CM ,"), vec!["VT", "CM"]);
    }
}
