use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};

use crate::utils;

/// Operator settings persisted between runs. This is where the browser page
/// kept its stored API key and admin-session flag.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub ai_api_key: Option<String>,
    pub admin_session: bool,
    pub admin_password_hash: Option<String>,
    pub admin_password_salt: Option<String>,
    pub ai_endpoint: Option<String>,
    pub ai_model: Option<String>,
    pub ai_temperature: Option<f64>,
    pub ai_max_tokens: Option<u32>,
    pub festivals_path: Option<PathBuf>,
}

impl AppConfig {
    /// `FESTIMAP_DATA`, then the stored path. `None` when neither is set.
    pub fn festivals_path(&self) -> Option<PathBuf> {
        std::env::var_os("FESTIMAP_DATA")
            .map(PathBuf::from)
            .or_else(|| self.festivals_path.clone())
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
}

impl ConfigStore {
    pub fn load() -> Self {
        Self::open(utils::config_path())
    }

    /// A missing or unreadable file yields defaults.
    pub fn open(path: PathBuf) -> Self {
        let data = match read_config(&path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("ignoring unreadable config {}: {err}", path.display());
                AppConfig::default()
            }
        };
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> AppConfig {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, String>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| "config mutex poisoned".to_string())?;
        transform(&mut guard);
        write_config(&self.path, &guard)?;
        Ok(guard.clone())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, String> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&contents).map_err(|err| err.to_string())
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            return Err(err.to_string());
        }
    }
    let contents = serde_json::to_string_pretty(config).map_err(|err| err.to_string())?;
    fs::write(path, contents).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");
        let store = ConfigStore::open(path.clone());
        assert_eq!(store.read(), AppConfig::default());

        store
            .update(|config| {
                config.ai_api_key = Some("sk-test".into());
                config.admin_session = true;
            })
            .expect("update");

        let reopened = ConfigStore::open(path);
        let config = reopened.read();
        assert_eq!(config.ai_api_key.as_deref(), Some("sk-test"));
        assert!(config.admin_session);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").expect("write");
        let store = ConfigStore::open(path);
        assert_eq!(store.read(), AppConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"ai_model": "local"}"#).expect("write");
        let config = ConfigStore::open(path).read();
        assert_eq!(config.ai_model.as_deref(), Some("local"));
        assert!(!config.admin_session);
    }
}
