//! User settings
//!
//! Mirrors the extension's synchronized storage record. Every toggle that is
//! absent from storage counts as enabled.

use serde::{Deserialize, Serialize};

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Network blocking and the behavioral interceptor
    #[serde(rename = "isAdBlockingOn", default = "enabled")]
    pub ad_blocking: bool,
    /// Cosmetic stylesheets and the heuristic classifier
    #[serde(rename = "isCosmeticBlockingOn", default = "enabled")]
    pub cosmetic_blocking: bool,
    #[serde(rename = "isCookieBannerBlockingOn", default = "enabled")]
    pub cookie_banner_blocking: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ad_blocking: true,
            cosmetic_blocking: true,
            cookie_banner_blocking: true,
        }
    }
}

/// Toggles that flipped between two snapshots. `Some(v)` is the new value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsDiff {
    pub ad_blocking: Option<bool>,
    pub cosmetic_blocking: Option<bool>,
    pub cookie_banner_blocking: Option<bool>,
}

impl SettingsDiff {
    pub fn is_empty(&self) -> bool {
        self.ad_blocking.is_none()
            && self.cosmetic_blocking.is_none()
            && self.cookie_banner_blocking.is_none()
    }
}

fn changed(old: bool, new: bool) -> Option<bool> {
    (old != new).then_some(new)
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn diff(&self, new: &Settings) -> SettingsDiff {
        SettingsDiff {
            ad_blocking: changed(self.ad_blocking, new.ad_blocking),
            cosmetic_blocking: changed(self.cosmetic_blocking, new.cosmetic_blocking),
            cookie_banner_blocking: changed(self.cookie_banner_blocking, new.cookie_banner_blocking),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_keys_are_enabled() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());

        let settings = Settings::from_json(r#"{"isCookieBannerBlockingOn": false}"#).unwrap();
        assert!(settings.ad_blocking);
        assert!(!settings.cookie_banner_blocking);
    }

    #[test]
    fn test_storage_key_names() {
        let json = Settings::default().to_json().unwrap();
        assert!(json.contains("\"isAdBlockingOn\":true"));
        assert!(json.contains("\"isCosmeticBlockingOn\":true"));
        assert!(json.contains("\"isCookieBannerBlockingOn\":true"));
    }

    #[test]
    fn test_diff() {
        let old = Settings::default();
        let new = Settings {
            cosmetic_blocking: false,
            ..old
        };

        let diff = old.diff(&new);
        assert_eq!(diff.cosmetic_blocking, Some(false));
        assert_eq!(diff.ad_blocking, None);
        assert!(old.diff(&old).is_empty());
    }
}
