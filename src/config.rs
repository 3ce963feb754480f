//! Configuration loading.
//!
//! All sections live next to the code they configure; this module aggregates
//! them, loads the JSON config file, and applies environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SnapError};
use crate::extract::ExtractorConfig;
use crate::matching::MatcherConfig;
use crate::ocr::OcrConfig;
use crate::onebot::batch::SendPolicy;
use crate::onebot::OneBotConfig;

/// Aggregate configuration. Every section has working defaults, so an absent
/// config file means "local defaults".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ocr: OcrConfig,
    pub onebot: OneBotConfig,
    pub matcher: MatcherConfig,
    pub extractor: ExtractorConfig,
    pub send: SendPolicy,
}

impl Config {
    /// Default config file location (`~/.config/snapsend/config.json`).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("snapsend")
            .join("config.json")
    }

    /// Loads configuration.
    ///
    /// An explicit `path` must exist; the default path is optional and falls
    /// back to defaults when missing. Environment overrides are applied last:
    /// `SNAPSEND_OCR_URL`, `SNAPSEND_ONEBOT_URL`, `SNAPSEND_ONEBOT_TOKEN`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(SnapError::Config(format!(
                        "config file not found: {}",
                        explicit.display()
                    )));
                }
                Self::from_file(explicit)?
            }
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    debug!("no config file at {:?}, using defaults", default);
                    Config::default()
                }
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| SnapError::Config(format!("invalid config {}: {e}", path.display())))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SNAPSEND_OCR_URL") {
            if !url.is_empty() {
                self.ocr.api_url = url;
            }
        }
        if let Ok(url) = std::env::var("SNAPSEND_ONEBOT_URL") {
            if !url.is_empty() {
                self.onebot.base_url = url;
            }
        }
        if let Ok(token) = std::env::var("SNAPSEND_ONEBOT_TOKEN") {
            if !token.is_empty() {
                self.onebot.token = token;
            }
        }
    }
}
