use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::reference_lines::ReferenceLineStyle;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MprConfig {
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub reference_lines: ReferenceLineStyle,
}

impl MprConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Distance (world units) under which a measurement counts as already in view.
    pub in_view_tolerance: f64,
    /// Factor applied to a measurement's extent when zooming out to fit it.
    pub zoom_padding: f64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            in_view_tolerance: 1.0,
            zoom_padding: 1.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Upper bound on waiting for new layout elements to be attached.
    pub attach_timeout_ms: u64,
    /// Quiet period collapsing bursts of resize notifications.
    pub resize_debounce_ms: u64,
    pub id_prefix: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            attach_timeout_ms: 500,
            resize_debounce_ms: 150,
            id_prefix: "viewport".to_string(),
        }
    }
}

impl LayoutConfig {
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(MprConfig::from_toml_str("").unwrap(), MprConfig::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = MprConfig::from_toml_str(
            r##"
            [navigation]
            in_view_tolerance = 2.5

            [reference_lines]
            axial_color = "#00ffff"
            "##,
        )
        .unwrap();

        assert_eq!(config.navigation.in_view_tolerance, 2.5);
        assert_eq!(config.navigation.zoom_padding, 1.1);
        assert_eq!(config.reference_lines.axial_color, "#00ffff");
        assert_eq!(config.reference_lines.coronal_color, "yellow");
        assert_eq!(config.layout.resize_debounce(), Duration::from_millis(150));
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(matches!(
            MprConfig::from_toml_str("[layout]\nattach_timeout_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
