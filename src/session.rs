//! Admin gate and AI key handling.
//!
//! A [`SessionContext`] is built once at start-up from the persisted config
//! and handed to whatever needs to know whether the operator is signed in.
//! Logging out drops the admin flag (in memory and on disk) and forgets the
//! in-memory API key; the stored key is picked up again on the next login.

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{AppConfig, ConfigStore};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("admin password is not configured")]
    NotConfigured,
    #[error("wrong admin password")]
    WrongPassword,
    #[error("{0}")]
    Invalid(String),
    #[error("config error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    admin: bool,
    api_key: Option<String>,
}

impl SessionContext {
    pub fn init(config: &AppConfig) -> Self {
        let admin = config.admin_session && config.admin_password_hash.is_some();
        Self {
            admin,
            api_key: if admin { stored_key(config) } else { None },
        }
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn login(&mut self, password: &str, store: &ConfigStore) -> Result<(), SessionError> {
        let config = store.read();
        let (Some(hash), Some(salt)) = (&config.admin_password_hash, &config.admin_password_salt)
        else {
            return Err(SessionError::NotConfigured);
        };
        if hash_password(salt, password) != *hash {
            log::warn!("admin login rejected");
            return Err(SessionError::WrongPassword);
        }

        let updated = store
            .update(|config| config.admin_session = true)
            .map_err(SessionError::Config)?;
        self.admin = true;
        self.api_key = stored_key(&updated);
        log::info!("admin logged in");
        Ok(())
    }

    pub fn logout(&mut self, store: &ConfigStore) -> Result<(), SessionError> {
        self.admin = false;
        self.api_key = None;
        store
            .update(|config| config.admin_session = false)
            .map_err(SessionError::Config)?;
        log::info!("admin logged out");
        Ok(())
    }

    pub fn set_api_key(&mut self, key: &str, store: &ConfigStore) -> Result<(), SessionError> {
        self.require_admin()?;
        let key = key.trim();
        if key.is_empty() {
            return Err(SessionError::Invalid("API key must not be empty".into()));
        }
        store
            .update(|config| config.ai_api_key = Some(key.to_string()))
            .map_err(SessionError::Config)?;
        self.api_key = Some(key.to_string());
        Ok(())
    }

    /// Sets the admin password. Only allowed while signed in, or when no
    /// password has been configured yet.
    pub fn set_password(&mut self, password: &str, store: &ConfigStore) -> Result<(), SessionError> {
        if store.read().admin_password_hash.is_some() {
            self.require_admin()?;
        }
        if password.is_empty() {
            return Err(SessionError::Invalid("password must not be empty".into()));
        }
        let salt = new_salt();
        let hash = hash_password(&salt, password);
        store
            .update(|config| {
                config.admin_password_salt = Some(salt.clone());
                config.admin_password_hash = Some(hash.clone());
            })
            .map_err(SessionError::Config)?;
        Ok(())
    }

    fn require_admin(&self) -> Result<(), SessionError> {
        if self.admin {
            Ok(())
        } else {
            Err(SessionError::Invalid("admin login required".into()))
        }
    }
}

/// Hex-encoded SHA-256 of `salt` followed by `password`.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn new_salt() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn stored_key(config: &AppConfig) -> Option<String> {
    std::env::var("FESTIMAP_AI_KEY")
        .ok()
        .or_else(|| config.ai_api_key.clone())
        .filter(|key| !key.trim().is_empty())
}
