use crate::domain::models::{LONG_BREAK_SECONDS, SHORT_BREAK_SECONDS, WORK_SECONDS};
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const TIMER_JSON: &str = "timer.json";
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8787/api";
pub const DEFAULT_SESSION_HISTORY_LIMIT: usize = 30;
const API_BASE_URL_ENV_KEYS: [&str; 1] = ["POMDO_API_BASE_URL"];

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub timer: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub app_name: String,
    pub api_base_url: String,
    pub session_history_limit: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_name: "Pomdo".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            session_history_limit: DEFAULT_SESSION_HISTORY_LIMIT,
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Pomdo",
                "apiBaseUrl": DEFAULT_API_BASE_URL,
                "sessionHistoryLimit": DEFAULT_SESSION_HISTORY_LIMIT
            }),
        ),
        (
            TIMER_JSON,
            serde_json::json!({
                "schema": 1,
                "workSeconds": WORK_SECONDS,
                "shortBreakSeconds": SHORT_BREAK_SECONDS,
                "longBreakSeconds": LONG_BREAK_SECONDS
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
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

fn validate_timer_config(timer: &serde_json::Value, path: &Path) -> Result<(), InfraError> {
    let expected = [
        ("workSeconds", WORK_SECONDS),
        ("shortBreakSeconds", SHORT_BREAK_SECONDS),
        ("longBreakSeconds", LONG_BREAK_SECONDS),
    ];
    for (key, constant) in expected {
        let Some(value) = timer.get(key) else {
            continue;
        };
        if value.as_u64() != Some(u64::from(constant)) {
            return Err(InfraError::InvalidConfig(format!(
                "{key} in {} must be {constant}, found {value}",
                path.display()
            )));
        }
    }
    Ok(())
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    let timer_path = config_dir.join(TIMER_JSON);
    let timer = read_config(&timer_path)?;
    validate_timer_config(&timer, &timer_path)?;
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        timer,
    })
}

pub fn read_app_settings(config_dir: &Path) -> Result<AppSettings, InfraError> {
    read_app_settings_with_lookup(config_dir, |key| std::env::var(key).ok())
}

pub fn read_app_settings_with_lookup<F>(config_dir: &Path, lookup: F) -> Result<AppSettings, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let app = read_config(&config_dir.join(APP_JSON))?;
    let defaults = AppSettings::default();

    let app_name = non_empty_str(&app, "appName").unwrap_or(defaults.app_name);
    let api_base_url = API_BASE_URL_ENV_KEYS
        .iter()
        .find_map(|key| lookup(key).map(|value| value.trim().to_string()))
        .filter(|value| !value.is_empty())
        .or_else(|| non_empty_str(&app, "apiBaseUrl"))
        .unwrap_or(defaults.api_base_url);
    url::Url::parse(&api_base_url).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid apiBaseUrl '{api_base_url}': {error}"))
    })?;

    let session_history_limit = match app.get("sessionHistoryLimit") {
        None => defaults.session_history_limit,
        Some(value) => value
            .as_u64()
            .filter(|limit| *limit > 0)
            .and_then(|limit| usize::try_from(limit).ok())
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!("sessionHistoryLimit must be a positive integer, found {value}"))
            })?,
    };

    Ok(AppSettings {
        app_name,
        api_base_url: api_base_url.trim_end_matches('/').to_string(),
        session_history_limit,
    })
}

fn non_empty_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
