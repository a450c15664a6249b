use crate::domain::baseline::{default_section_name, is_known_section};
use crate::domain::models::DayName;
use crate::domain::time_window::ClassCalendar;
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;

const APP_JSON: &str = "app.json";
const CALENDAR_JSON: &str = "calendar.json";

const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;
const DEFAULT_HIGHLIGHT_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 500;

/// Typed view of `app.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    pub app_name: String,
    pub timezone: Tz,
    pub store_url: Option<String>,
    pub default_section: String,
    pub poll_interval: Duration,
    pub highlight_interval: Duration,
    pub save_debounce: Duration,
}

fn default_files() -> [(&'static str, Value); 2] {
    let class_days: Vec<&str> = ClassCalendar::default()
        .class_days
        .iter()
        .map(|day| day.as_str())
        .collect();
    [
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Timetable Desk",
                "timezone": "Asia/Dhaka",
                "storeUrl": null,
                "defaultSection": default_section_name(),
                "pollIntervalSeconds": DEFAULT_POLL_INTERVAL_SECONDS,
                "highlightIntervalSeconds": DEFAULT_HIGHLIGHT_INTERVAL_SECONDS,
                "saveDebounceMs": DEFAULT_SAVE_DEBOUNCE_MS
            }),
        ),
        (
            CALENDAR_JSON,
            serde_json::json!({
                "schema": 1,
                "classDays": class_days
            }),
        ),
    ]
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            write_config(&path, &value)?;
        }
    }
    Ok(())
}

fn write_config(path: &Path, value: &Value) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

fn read_config(path: &Path) -> Result<Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn text_value<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn positive_u64(config: &Value, key: &str, default: u64) -> Result<u64, InfraError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .filter(|parsed| *parsed > 0)
            .ok_or_else(|| InfraError::InvalidConfig(format!("{key} must be a positive integer"))),
    }
}

pub fn parse_timezone(value: &str) -> Result<Tz, InfraError> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{value}': {error}")))
}

pub fn read_app_settings(config_dir: &Path) -> Result<AppSettings, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;

    let timezone = text_value(&app, "timezone")
        .map(parse_timezone)
        .transpose()?
        .unwrap_or(Tz::UTC);
    let default_section = text_value(&app, "defaultSection")
        .unwrap_or(default_section_name())
        .to_string();
    if !is_known_section(&default_section) {
        return Err(InfraError::InvalidConfig(format!(
            "defaultSection '{default_section}' is not a known section"
        )));
    }

    Ok(AppSettings {
        app_name: text_value(&app, "appName").unwrap_or("Timetable Desk").to_string(),
        timezone,
        store_url: text_value(&app, "storeUrl").map(ToOwned::to_owned),
        default_section,
        poll_interval: Duration::from_secs(positive_u64(
            &app,
            "pollIntervalSeconds",
            DEFAULT_POLL_INTERVAL_SECONDS,
        )?),
        highlight_interval: Duration::from_secs(positive_u64(
            &app,
            "highlightIntervalSeconds",
            DEFAULT_HIGHLIGHT_INTERVAL_SECONDS,
        )?),
        save_debounce: Duration::from_millis(positive_u64(
            &app,
            "saveDebounceMs",
            DEFAULT_SAVE_DEBOUNCE_MS,
        )?),
    })
}

pub fn read_class_calendar(config_dir: &Path) -> Result<ClassCalendar, InfraError> {
    let calendar = read_config(&config_dir.join(CALENDAR_JSON))?;
    let Some(raw_days) = calendar.get("classDays") else {
        return Ok(ClassCalendar::default());
    };
    let raw_days = raw_days
        .as_array()
        .ok_or_else(|| InfraError::InvalidConfig("classDays must be an array".to_string()))?;

    let class_days = raw_days
        .iter()
        .map(|value| {
            value
                .as_str()
                .and_then(DayName::parse)
                .ok_or_else(|| InfraError::InvalidConfig(format!("invalid class day: {value}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let calendar = ClassCalendar { class_days };
    calendar
        .validate()
        .map_err(|error| InfraError::InvalidConfig(error.to_string()))?;
    Ok(calendar)
}
