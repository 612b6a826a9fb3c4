//! Persisted admin configuration: gateway keys, the default credit grant,
//! and the auto-delete threshold for generated images.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub paystack_public_key: String,
    pub paystack_secret_key: String,
    pub flutterwave_public_key: String,
    pub flutterwave_secret_key: String,
    pub default_credits: u32,
    pub image_auto_delete_hours: u32,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            paystack_public_key: String::new(),
            paystack_secret_key: String::new(),
            flutterwave_public_key: String::new(),
            flutterwave_secret_key: String::new(),
            default_credits: 20,
            image_auto_delete_hours: 0,
        }
    }
}

impl AdminConfig {
    /// How long generated results live before the auto-clear timer fires.
    /// `None` disables the timer.
    pub fn auto_clear_after(&self) -> Option<Duration> {
        if self.image_auto_delete_hours == 0 {
            return None;
        }
        Some(Duration::from_secs(u64::from(self.image_auto_delete_hours) * 3600))
    }

    pub fn any_gateway_configured(&self) -> bool {
        !self.paystack_public_key.trim().is_empty()
            || !self.flutterwave_public_key.trim().is_empty()
    }

    /// Load the persisted blob; a missing or unparsable file falls back to
    /// the default record.
    pub async fn load(path: &Path) -> Self {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Self::default();
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to read admin config");
                return Self::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "admin config is corrupt, using defaults");
                Self::default()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(self)?;
        fs::write(path, payload).await
    }
}

/// Where the admin blob lives: `STUDIO_CONFIG_PATH` wins, otherwise the
/// platform config dir.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("STUDIO_CONFIG_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    let mut base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("product-studio");
    base.push("admin-settings.json");
    base
}

/// Mutable admin config shared between sessions and the admin API. Reads
/// are snapshots; changes take effect on the next login or generation.
#[derive(Debug, Clone, Default)]
pub struct SharedAdminConfig(Arc<RwLock<AdminConfig>>);

impl SharedAdminConfig {
    pub fn new(config: AdminConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub fn get(&self) -> AdminConfig {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, config: AdminConfig) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = config;
    }
}
