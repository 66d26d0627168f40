use crate::domain::calendar::{DEFAULT_DAYS_PER_WEEK, WorkCalendar};
use crate::infrastructure::error::TrackerError;
use chrono::{NaiveDate, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

const APP_JSON: &str = "app.json";
const REFRESH_JSON: &str = "refresh.json";
const CALENDAR_JSON: &str = "calendar.json";
const DEFAULT_APP_NAME: &str = "Progress Tracker";
const DEFAULT_TIMEZONE: &str = "UTC";
pub const TIMEZONE_ENV: &str = "TRACKER_TIMEZONE";
pub const DEFAULT_LIVE_REFRESH_MS: u64 = 1_000;
pub const DEFAULT_IDLE_REFRESH_MS: u64 = 15_000;

/// Everything the config files decide, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub app_name: String,
    /// Display zone for formatted output. Storage is always UTC.
    pub timezone: Tz,
    pub refresh: RefreshPolicy,
    pub calendar: WorkCalendar,
}

/// How often a display should poll: fast while anything is on the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPolicy {
    pub live_ms: u64,
    pub idle_ms: u64,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            live_ms: DEFAULT_LIVE_REFRESH_MS,
            idle_ms: DEFAULT_IDLE_REFRESH_MS,
        }
    }
}

impl RefreshPolicy {
    pub fn interval_for(&self, any_active: bool) -> Duration {
        if any_active {
            Duration::from_millis(self.live_ms)
        } else {
            Duration::from_millis(self.idle_ms)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.live_ms == 0 || self.idle_ms == 0 {
            return Err("refresh intervals must be > 0".to_string());
        }
        if self.live_ms > self.idle_ms {
            return Err("liveRefreshMs must not exceed idleRefreshMs".to_string());
        }
        Ok(())
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": DEFAULT_APP_NAME,
                "timezone": DEFAULT_TIMEZONE
            }),
        ),
        (
            REFRESH_JSON,
            serde_json::json!({
                "schema": 1,
                "liveRefreshMs": DEFAULT_LIVE_REFRESH_MS,
                "idleRefreshMs": DEFAULT_IDLE_REFRESH_MS
            }),
        ),
        (
            CALENDAR_JSON,
            serde_json::json!({
                "schema": 1,
                "workDays": ["mon", "tue", "wed", "thu", "fri"],
                "holidays": [],
                "daysPerWeek": DEFAULT_DAYS_PER_WEEK
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), TrackerError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, TrackerError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| TrackerError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(TrackerError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Reads every config file once. `TRACKER_TIMEZONE` overrides the
/// configured zone.
pub fn load_configs(config_dir: &Path) -> Result<TrackerConfig, TrackerError> {
    let env_value = std::env::var(TIMEZONE_ENV).ok();
    load_configs_with_env(config_dir, env_value.as_deref())
}

fn load_configs_with_env(config_dir: &Path, timezone_env: Option<&str>) -> Result<TrackerConfig, TrackerError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let refresh_path = config_dir.join(REFRESH_JSON);
    let refresh = read_config(&refresh_path)?;
    let calendar_path = config_dir.join(CALENDAR_JSON);
    let calendar = if calendar_path.exists() {
        parse_calendar(&read_config(&calendar_path)?, &calendar_path)?
    } else {
        WorkCalendar::default()
    };

    Ok(TrackerConfig {
        app_name: trimmed_str(&app, "appName")
            .unwrap_or(DEFAULT_APP_NAME)
            .to_string(),
        timezone: select_timezone(timezone_env, trimmed_str(&app, "timezone"))?,
        refresh: parse_refresh_policy(&refresh, &refresh_path)?,
        calendar,
    })
}

fn trimmed_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn parse_timezone(name: &str) -> Result<Tz, TrackerError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|error| TrackerError::InvalidConfig(format!("invalid timezone '{name}': {error}")))
}

/// The environment value wins over the configured one; UTC when neither is set.
pub fn select_timezone(env_value: Option<&str>, configured: Option<&str>) -> Result<Tz, TrackerError> {
    let chosen = env_value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or(configured)
        .unwrap_or(DEFAULT_TIMEZONE);
    parse_timezone(chosen)
}

fn parse_refresh_policy(refresh: &serde_json::Value, path: &Path) -> Result<RefreshPolicy, TrackerError> {
    let read_ms = |key: &str, default: u64| -> Result<u64, TrackerError> {
        match refresh.get(key) {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(value) => value.as_u64().ok_or_else(|| {
                TrackerError::InvalidConfig(format!("{key} must be a positive integer in {}", path.display()))
            }),
        }
    };

    let policy = RefreshPolicy {
        live_ms: read_ms("liveRefreshMs", DEFAULT_LIVE_REFRESH_MS)?,
        idle_ms: read_ms("idleRefreshMs", DEFAULT_IDLE_REFRESH_MS)?,
    };
    policy
        .validate()
        .map_err(|error| TrackerError::InvalidConfig(format!("{error} in {}", path.display())))?;
    Ok(policy)
}

fn parse_calendar(value: &serde_json::Value, path: &Path) -> Result<WorkCalendar, TrackerError> {
    let invalid = |message: String| TrackerError::InvalidConfig(format!("{message} in {}", path.display()));
    let defaults = WorkCalendar::default();

    let work_days = match value.get("workDays") {
        None | Some(serde_json::Value::Null) => defaults.work_days,
        Some(serde_json::Value::Array(items)) => {
            let mut days = Vec::with_capacity(items.len());
            for item in items {
                let name = item
                    .as_str()
                    .ok_or_else(|| invalid("workDays entries must be strings".to_string()))?;
                let day = name
                    .trim()
                    .parse::<Weekday>()
                    .map_err(|_| invalid(format!("unknown weekday '{name}'")))?;
                if !days.contains(&day) {
                    days.push(day);
                }
            }
            days
        }
        Some(_) => return Err(invalid("workDays must be a list".to_string())),
    };

    let holidays = match value.get("holidays") {
        None | Some(serde_json::Value::Null) => BTreeSet::new(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok())
                    .ok_or_else(|| invalid(format!("holiday {item} must be a YYYY-MM-DD date")))
            })
            .collect::<Result<BTreeSet<_>, _>>()?,
        Some(_) => return Err(invalid("holidays must be a list".to_string())),
    };

    let days_per_week = match value.get("daysPerWeek") {
        None | Some(serde_json::Value::Null) => DEFAULT_DAYS_PER_WEEK,
        Some(raw) => raw
            .as_u64()
            .and_then(|days| u32::try_from(days).ok())
            .ok_or_else(|| invalid("daysPerWeek must be a positive integer".to_string()))?,
    };

    let calendar = WorkCalendar {
        work_days,
        holidays,
        days_per_week,
    };
    calendar.validate().map_err(invalid)?;
    Ok(calendar)
}
