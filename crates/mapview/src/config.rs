use serde::Deserialize;

use crate::camera::CameraPose;
use crate::engine::ClusterOptions;
use crate::style::MapStyle;
use crate::view::RenderMode;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid map config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid map config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StyleUrls {
    pub light: String,
    pub dark: String,
    pub satellite: String,
}

impl Default for StyleUrls {
    fn default() -> Self {
        Self {
            light: "mapbox://styles/mapbox/light-v11".to_string(),
            dark: "mapbox://styles/mapbox/dark-v11".to_string(),
            satellite: "mapbox://styles/mapbox/satellite-streets-v12".to_string(),
        }
    }
}

impl StyleUrls {
    pub fn url_for(&self, style: MapStyle) -> &str {
        match style {
            MapStyle::Light => &self.light,
            MapStyle::Dark => &self.dark,
            MapStyle::Satellite => &self.satellite,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub size_px: f64,
    pub hover_scale: f64,
    pub z_index: i32,
    pub hover_z_index: i32,
    pub fit_padding_px: f64,
    /// Datasets larger than this use `many_max_zoom` for the bounds fit.
    pub many_records_threshold: usize,
    pub many_max_zoom: f64,
    pub few_max_zoom: f64,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            size_px: 36.0,
            hover_scale: 1.25,
            z_index: 1,
            hover_z_index: 1000,
            fit_padding_px: 50.0,
            many_records_threshold: 100,
            many_max_zoom: 10.0,
            few_max_zoom: 13.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PopupConfig {
    pub auto_dismiss_secs: f64,
    pub max_width_px: f64,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            auto_dismiss_secs: 30.0,
            max_width_px: 320.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub container: String,
    pub camera: CameraPose,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub style: MapStyle,
    pub styles: StyleUrls,
    pub cluster: ClusterOptions,
    pub markers: MarkerConfig,
    pub popup: PopupConfig,
    pub render_mode: RenderMode,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            container: "map".to_string(),
            camera: CameraPose::default(),
            min_zoom: 0.0,
            max_zoom: 20.0,
            style: MapStyle::Light,
            styles: StyleUrls::default(),
            cluster: ClusterOptions::default(),
            markers: MarkerConfig::default(),
            popup: PopupConfig::default(),
            render_mode: RenderMode::Markers,
        }
    }
}

impl MapConfig {
    pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
        let config: MapConfig = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::Invalid(format!(
                "min_zoom {} exceeds max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if !(self.popup.auto_dismiss_secs > 0.0) {
            return Err(ConfigError::Invalid(
                "popup.auto_dismiss_secs must be positive".to_string(),
            ));
        }
        if self.cluster.radius_px <= 0.0 {
            return Err(ConfigError::Invalid(
                "cluster.radius_px must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
