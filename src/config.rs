use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::types::ControlMode;
use crate::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Persisted controller configuration. Mutated only through
/// [`ConfigStore::update`]; the control loop reads a fresh copy each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub username: String,
    pub password: String,
    pub device_id: u64,
    pub control_mode: ControlMode,
    pub enable_heat: bool,
    pub enable_cool: bool,
    pub heat_on_below: f64,
    pub heat_off_at: f64,
    pub cool_on_above: f64,
    pub cool_off_at: f64,
    pub hold_minutes: u32,
    pub poll_interval_seconds: u64,
    pub login_refresh_seconds: u64,
    pub base_url: String,
    pub time_offset_minutes: Option<i32>,
    pub timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            device_id: 0,
            control_mode: ControlMode::Hysteresis,
            enable_heat: true,
            enable_cool: true,
            heat_on_below: 68.0,
            heat_off_at: 71.0,
            cool_on_above: 76.0,
            cool_off_at: 74.0,
            hold_minutes: 60,
            poll_interval_seconds: 60,
            login_refresh_seconds: 600,
            base_url: crate::endpoints::DEFAULT_BASE_URL.to_string(),
            time_offset_minutes: None,
            timeout_seconds: 20,
        }
    }
}

impl AppConfig {
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty() && self.device_id != 0
    }

    /// Rejects degenerate hysteresis bands and non-positive intervals.
    /// Runs at config-write time so bad values never reach the loop.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.heat_on_below >= self.heat_off_at {
            errors.push("heat_on_below must be less than heat_off_at".to_string());
        }
        if self.cool_off_at >= self.cool_on_above {
            errors.push("cool_off_at must be less than cool_on_above".to_string());
        }
        if self.hold_minutes == 0 {
            errors.push("hold_minutes must be positive".to_string());
        }
        if self.poll_interval_seconds == 0 {
            errors.push("poll_interval_seconds must be positive".to_string());
        }
        if self.login_refresh_seconds == 0 {
            errors.push("login_refresh_seconds must be positive".to_string());
        }
        if self.timeout_seconds == 0 {
            errors.push("timeout_seconds must be positive".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(errors))
        }
    }

    /// Config as exposed to status consumers: password omitted, replaced
    /// by a `has_password` flag.
    pub fn public_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("password");
            map.insert("has_password".to_string(), Value::Bool(!self.password.is_empty()));
        }
        value
    }
}

/// JSON-file-backed config store, last writer wins.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Config(vec![format!("failed to parse config: {e}")]))
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        let mut contents = serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(vec![format!("failed to encode config: {e}")]))?;
        contents.push('\n');
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    /// Loads the config, creating a default file if none exists.
    pub fn ensure(&self) -> Result<AppConfig> {
        match self.load() {
            Ok(config) => Ok(config),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = AppConfig::default();
                self.save(&config)?;
                Ok(config)
            }
            Err(e) => Err(e),
        }
    }

    /// Merges a JSON patch into the stored config, validating before
    /// persisting. Invalid patches leave the file untouched.
    pub fn update(&self, patch: &Value) -> Result<AppConfig> {
        let Value::Object(patch) = patch else {
            return Err(Error::Config(vec!["config patch must be a JSON object".to_string()]));
        };
        let current = self.ensure()?;
        let mut merged = serde_json::to_value(&current)
            .map_err(|e| Error::Config(vec![format!("failed to encode config: {e}")]))?;
        if let Value::Object(map) = &mut merged {
            for (key, value) in patch {
                map.insert(key.clone(), value.clone());
            }
        }
        let updated: AppConfig = serde_json::from_value(merged)
            .map_err(|e| Error::Config(vec![format!("invalid config value: {e}")]))?;
        updated.validate()?;
        self.save(&updated)?;
        debug!(path = %self.path.display(), "config updated");
        Ok(updated)
    }
}
