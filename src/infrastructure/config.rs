use crate::infrastructure::error::InfraError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

const APP_JSON: &str = "app.json";
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/";
const DEFAULT_HISTORY_PAGE_SIZE: u32 = 10;
const MAX_HISTORY_PAGE_SIZE: u32 = 100;
const DEFAULT_ACCOUNT: &str = "default";

const API_URL_KEYS: &[&str] = &["POMOTRACK_API_URL", "POMOTRACK_API_BASE_URL"];
const ACCOUNT_KEYS: &[&str] = &["POMOTRACK_ACCOUNT", "POMOTRACK_EMAIL"];

/// Client-side settings resolved from `config/app.json` and the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: Url,
    pub history_page_size: u32,
    pub alarm_enabled: bool,
    pub alarm_sound_dir: Option<PathBuf>,
    pub account: String,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([(
        APP_JSON,
        serde_json::json!({
            "schema": 1,
            "apiBaseUrl": DEFAULT_API_BASE_URL,
            "historyPageSize": DEFAULT_HISTORY_PAGE_SIZE,
            "alarmEnabled": true,
            "alarmSoundDir": null,
            "account": DEFAULT_ACCOUNT
        }),
    )])
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

pub fn load_client_settings(config_dir: &Path) -> Result<ClientSettings, InfraError> {
    load_client_settings_with_lookup(config_dir, |key| std::env::var(key).ok())
}

pub fn load_client_settings_with_lookup<F>(
    config_dir: &Path,
    lookup: F,
) -> Result<ClientSettings, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let app = read_config(&config_dir.join(APP_JSON))?;

    let raw_base_url = optional_lookup_value(&lookup, API_URL_KEYS)
        .or_else(|| string_field(&app, "apiBaseUrl"))
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    let api_base_url = parse_base_url(&raw_base_url)?;

    let history_page_size = app
        .get("historyPageSize")
        .and_then(serde_json::Value::as_u64)
        .map(|value| value.clamp(1, u64::from(MAX_HISTORY_PAGE_SIZE)) as u32)
        .unwrap_or(DEFAULT_HISTORY_PAGE_SIZE);
    let alarm_enabled = app
        .get("alarmEnabled")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(true);
    let alarm_sound_dir = string_field(&app, "alarmSoundDir").map(PathBuf::from);
    let account = optional_lookup_value(&lookup, ACCOUNT_KEYS)
        .or_else(|| string_field(&app, "account"))
        .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string());

    Ok(ClientSettings {
        api_base_url,
        history_page_size,
        alarm_enabled,
        alarm_sound_dir,
        account,
    })
}

pub fn save_api_base_url(config_dir: &Path, raw_url: &str) -> Result<Url, InfraError> {
    let url = parse_base_url(raw_url)?;
    let path = config_dir.join(APP_JSON);
    let mut app = read_config(&path)?;
    let object = app.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    object.insert(
        "apiBaseUrl".to_string(),
        serde_json::Value::String(url.to_string()),
    );

    let formatted = serde_json::to_string_pretty(&app)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(url)
}

/// Parses the API root, forcing a trailing slash so relative joins keep the path prefix.
pub fn parse_base_url(raw: &str) -> Result<Url, InfraError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InfraError::InvalidConfig(
            "apiBaseUrl must not be empty".to_string(),
        ));
    }
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&normalized)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid apiBaseUrl '{trimmed}': {error}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(InfraError::InvalidConfig(format!(
            "apiBaseUrl must be an http(s) URL: {trimmed}"
        )));
    }
    Ok(url)
}

fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}
