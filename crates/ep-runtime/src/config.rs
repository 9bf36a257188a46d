//! Runtime tuning.
//!
//! All delays are milliseconds of host time.

use serde::{Deserialize, Serialize};

use crate::schedule::Millis;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum summed signal weight for an element to be treated as an ad
    pub threshold: u32,
    /// z-index above which a positioned element counts as stacked on top
    pub z_index_floor: i64,
    /// Share of each viewport dimension an overlay must exceed
    pub overlay_fraction: f64,
    pub scan_debounce_ms: Millis,
    pub sweep_interval_ms: Millis,
    /// Delay before rescanning after a same-document navigation
    pub navigation_rescan_ms: Millis,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            z_index_floor: 1_000_000,
            overlay_fraction: 0.5,
            scan_debounce_ms: 500,
            sweep_interval_ms: 2000,
            navigation_rescan_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    pub initial_delay_ms: Millis,
    pub retry_delay_ms: Millis,
    pub max_attempts: u8,
    /// Time allowed for a settings panel to render after opening it
    pub settings_wait_ms: Millis,
    pub mutation_debounce_ms: Millis,
    /// Text length bounds for banners found by keyword search
    pub min_text_len: usize,
    pub max_text_len: usize,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1500,
            retry_delay_ms: 800,
            max_attempts: 5,
            settings_wait_ms: 1600,
            mutation_debounce_ms: 300,
            min_text_len: 50,
            max_text_len: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub classifier: ClassifierConfig,
    pub consent: ConsentConfig,
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let classifier = &self.classifier;
        if classifier.threshold == 0 {
            return Err(ConfigError::Validation("classifier.threshold must be > 0".into()));
        }
        if !(classifier.overlay_fraction > 0.0 && classifier.overlay_fraction <= 1.0) {
            return Err(ConfigError::Validation(
                "classifier.overlay_fraction must be in (0, 1]".into(),
            ));
        }
        if classifier.sweep_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "classifier.sweep_interval_ms must be > 0".into(),
            ));
        }

        let consent = &self.consent;
        if consent.max_attempts == 0 {
            return Err(ConfigError::Validation("consent.max_attempts must be > 0".into()));
        }
        if consent.min_text_len > consent.max_text_len {
            return Err(ConfigError::Validation(
                "consent.min_text_len cannot be greater than consent.max_text_len".into(),
            ));
        }
        Ok(())
    }
}
