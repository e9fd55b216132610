use chrono_tz::Tz;

use crate::upstream::API_BASE_URL;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BUFFER_CAPACITY: usize = 500;
const DEFAULT_LOOKBACK_HOURS: i64 = 72;
const DEFAULT_TZ: Tz = chrono_tz::America::Santiago;

fn default_unshipped_statuses() -> Vec<String> {
    vec!["ready_to_ship".to_string(), "to_be_picked_up".to_string()]
}

/// Service configuration, environment-supplied with hard-coded fallbacks.
///
/// Absent or malformed values fall back silently; the service always
/// starts.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port (env: PORT).
    pub port: u16,
    /// Ring buffer capacity (env: WEBHOOK_BUFFER_SIZE).
    pub buffer_capacity: usize,
    /// Default report lookback in hours (env: DATE_WINDOW_HOURS).
    pub lookback_hours: i64,
    /// Shipment statuses counted as unshipped (env: UNSHIPPED_STATUSES,
    /// JSON array of strings).
    pub allowed_statuses: Vec<String>,
    /// Service timezone for date parsing (env: TZ).
    pub timezone: Tz,
    /// Upstream API base URL (env: MELI_API_BASE; overridden in tests).
    pub api_base: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            buffer_capacity: std::env::var("WEBHOOK_BUFFER_SIZE")
                .ok()
                .and_then(|size| size.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_BUFFER_CAPACITY),
            lookback_hours: std::env::var("DATE_WINDOW_HOURS")
                .ok()
                .and_then(|hours| hours.parse().ok())
                .filter(|hours| *hours > 0)
                .unwrap_or(DEFAULT_LOOKBACK_HOURS),
            allowed_statuses: std::env::var("UNSHIPPED_STATUSES")
                .ok()
                .and_then(|raw| parse_statuses(&raw))
                .unwrap_or_else(default_unshipped_statuses),
            timezone: std::env::var("TZ")
                .ok()
                .and_then(|tz| tz.parse().ok())
                .unwrap_or(DEFAULT_TZ),
            api_base: std::env::var("MELI_API_BASE")
                .ok()
                .filter(|base| !base.is_empty())
                .unwrap_or_else(|| API_BASE_URL.to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            lookback_hours: DEFAULT_LOOKBACK_HOURS,
            allowed_statuses: default_unshipped_statuses(),
            timezone: DEFAULT_TZ,
            api_base: API_BASE_URL.to_string(),
        }
    }
}

fn parse_statuses(raw: &str) -> Option<Vec<String>> {
    let statuses: Vec<String> = serde_json::from_str(raw).ok()?;
    if statuses.is_empty() {
        return None;
    }
    Some(statuses)
}
