// Drive Notepad Configuration Module
// Persistent settings: credentials location, listing scope, write behavior

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::providers::{
    DeleteMode, GoogleDriveConfig, ListQuery, DEFAULT_ORDER_BY, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
    TEXT_MIME_TYPE,
};
use crate::session::DEFAULT_TITLE;

pub const ENV_CREDENTIALS: &str = "DRIVE_NOTEPAD_CREDENTIALS";
pub const ENV_ACCESS_TOKEN: &str = "DRIVE_NOTEPAD_ACCESS_TOKEN";
pub const ENV_PARENT: &str = "DRIVE_NOTEPAD_PARENT";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Service-account JSON key file
    pub credentials_path: Option<PathBuf>,
    /// Pre-issued bearer token, used instead of the key file when set.
    /// Never written to disk.
    #[serde(skip)]
    pub access_token: Option<String>,
    /// Folder to list from and create documents in
    pub parent_folder_id: Option<String>,
    pub page_size: u32,
    pub order_by: String,
    pub request_timeout_secs: u64,
    /// Retries for list/read on 429 and 5xx
    pub max_read_retries: u32,
    pub delete_mode: DeleteMode,
    /// Also rename the stored document when its title was edited.
    /// Off: updates replace content only.
    pub propagate_title_on_update: bool,
    pub default_title: String,
    /// Password required before the interactive shell opens
    pub access_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            access_token: None,
            parent_folder_id: None,
            page_size: DEFAULT_PAGE_SIZE,
            order_by: DEFAULT_ORDER_BY.to_string(),
            request_timeout_secs: 60,
            max_read_retries: 2,
            delete_mode: DeleteMode::Permanent,
            propagate_title_on_update: false,
            default_title: DEFAULT_TITLE.to_string(),
            access_password: None,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn list_query(&self) -> ListQuery {
        ListQuery {
            mime_type: TEXT_MIME_TYPE.to_string(),
            page_size: self.page_size,
            order_by: self.order_by.clone(),
            parent: self.parent_folder_id.clone(),
        }
    }

    pub fn drive_config(&self) -> GoogleDriveConfig {
        GoogleDriveConfig {
            parent_folder_id: self.parent_folder_id.clone(),
            request_timeout: self.request_timeout(),
            delete_mode: self.delete_mode,
            propagate_title: self.propagate_title_on_update,
            max_read_retries: self.max_read_retries,
            ..GoogleDriveConfig::default()
        }
    }

    /// Overlay values from the environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(path) = non_empty(ENV_CREDENTIALS) {
            self.credentials_path = Some(PathBuf::from(path));
        }
        if let Some(token) = non_empty(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
        if let Some(parent) = non_empty(ENV_PARENT) {
            self.parent_folder_id = Some(parent);
        }
    }

    /// Check the shell password. Always true when none is configured.
    pub fn check_password(&self, input: &str) -> bool {
        match self.access_password.as_deref() {
            None | Some("") => true,
            Some(expected) => expected.as_bytes().ct_eq(input.as_bytes()).into(),
        }
    }
}

/// Default config file location
pub fn default_config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("drive-notepad").join("config.json")
}

/// Load configuration from disk. A missing or unreadable file yields defaults.
pub fn load_config(path: &Path) -> AppConfig {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config {:?}: {}", path, e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config {:?}: {}", path, e);
            }
        }
    }

    AppConfig::default()
}

/// Save configuration to disk
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &AppConfig) -> Result<(), String> {
    if config.page_size == 0 || config.page_size > MAX_PAGE_SIZE {
        return Err(format!("page_size must be between 1 and {}", MAX_PAGE_SIZE));
    }
    if config.request_timeout_secs == 0 {
        return Err("request_timeout_secs must be greater than 0".to_string());
    }
    if config.default_title.trim().is_empty() {
        return Err("default_title cannot be empty".to_string());
    }
    if config.order_by.trim().is_empty() {
        return Err("order_by cannot be empty".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.request_timeout_secs, 60);
        assert!(!config.propagate_title_on_update);
        assert_eq!(config.delete_mode, DeleteMode::Permanent);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_config() {
        let mut config = AppConfig { page_size: 51, ..Default::default() };
        assert!(validate_config(&config).is_err());

        config.page_size = 50;
        assert!(validate_config(&config).is_ok());

        config.request_timeout_secs = 0;
        assert!(validate_config(&config).is_err());

        let config = AppConfig { default_title: " ".to_string(), ..Default::default() };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip_skips_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            parent_folder_id: Some("folder".to_string()),
            access_token: Some("secret-token".to_string()),
            delete_mode: DeleteMode::Trash,
            ..Default::default()
        };

        save_config(&path, &config).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains(r#""delete_mode": "trash""#));
        assert!(!written.contains("secret-token"));

        let loaded = load_config(&path);
        assert_eq!(loaded.parent_folder_id.as_deref(), Some("folder"));
        assert_eq!(loaded.delete_mode, DeleteMode::Trash);
        assert!(loaded.access_token.is_none());
    }

    #[test]
    fn test_load_partial_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        fs::write(&path, r#"{"page_size": 5}"#).unwrap();
        let loaded = load_config(&path);
        assert_eq!(loaded.page_size, 5);
        assert_eq!(loaded.default_title, DEFAULT_TITLE);

        fs::write(&path, "not json").unwrap();
        assert_eq!(load_config(&path), AppConfig::default());

        assert_eq!(load_config(&dir.path().join("missing.json")), AppConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_CREDENTIALS, "/keys/sa.json"),
            (ENV_ACCESS_TOKEN, ""),
            (ENV_PARENT, "folder-env"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.credentials_path, Some(PathBuf::from("/keys/sa.json")));
        assert!(config.access_token.is_none());
        assert_eq!(config.parent_folder_id.as_deref(), Some("folder-env"));
        assert_eq!(config.list_query().parent.as_deref(), Some("folder-env"));
    }

    #[test]
    fn test_password_check() {
        let mut config = AppConfig::default();
        assert!(config.check_password("anything"));

        config.access_password = Some("hunter2".to_string());
        assert!(config.check_password("hunter2"));
        assert!(!config.check_password("hunter"));
        assert!(!config.check_password(""));
    }
}
