use std::time::Duration;

use crate::{
    foundation::core::{Coordinate, ImageSize},
    foundation::error::{MapZoomError, MapZoomResult, TileFetchError},
    tiles::mapbox::MapboxSource,
    tiles::static_map::StaticMapSource,
};

/// A provider of static map images centred on a coordinate.
///
/// Implementations are shared across fetch workers, so they hold only read-only configuration
/// (base URL, credential, style, HTTP client). Retrying is the caller's job.
pub trait TileSource: Send + Sync {
    /// Fetch one image. The returned bytes are an encoded raster (PNG, JPEG, ...).
    fn fetch(
        &self,
        center: Coordinate,
        zoom: f64,
        size: ImageSize,
    ) -> Result<Vec<u8>, TileFetchError>;

    /// Inclusive zoom interval the provider can render.
    fn zoom_bounds(&self) -> (f64, f64);

    /// Whether non-integer zoom values are accepted.
    fn fractional_zoom(&self) -> bool;

    /// Attribution text that must accompany any output built from these images.
    fn attribution(&self) -> &str;

    /// Short provider name for logs.
    fn name(&self) -> &'static str;
}

impl<T: TileSource + ?Sized> TileSource for std::sync::Arc<T> {
    fn fetch(
        &self,
        center: Coordinate,
        zoom: f64,
        size: ImageSize,
    ) -> Result<Vec<u8>, TileFetchError> {
        (**self).fetch(center, zoom, size)
    }

    fn zoom_bounds(&self) -> (f64, f64) {
        (**self).zoom_bounds()
    }

    fn fractional_zoom(&self) -> bool {
        (**self).fractional_zoom()
    }

    fn attribution(&self) -> &str {
        (**self).attribution()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<T: TileSource + ?Sized> TileSource for Box<T> {
    fn fetch(
        &self,
        center: Coordinate,
        zoom: f64,
        size: ImageSize,
    ) -> Result<Vec<u8>, TileFetchError> {
        (**self).fetch(center, zoom, size)
    }

    fn zoom_bounds(&self) -> (f64, f64) {
        (**self).zoom_bounds()
    }

    fn fractional_zoom(&self) -> bool {
        (**self).fractional_zoom()
    }

    fn attribution(&self) -> &str {
        (**self).attribution()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Provider selection, as read from configuration.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "provider", rename_all = "kebab-case")]
pub enum TileSourceConfig {
    /// OpenStreetMap static map service; whole zoom levels only.
    StaticMap {
        #[serde(default = "default_static_map_url")]
        base_url: String,
    },
    /// Mapbox Static Images API; fractional zoom.
    Mapbox {
        #[serde(default = "default_mapbox_url")]
        base_url: String,
        #[serde(default = "default_mapbox_style")]
        style: String,
        /// Never serialised; injected from the environment or the command line.
        #[serde(default, skip_serializing)]
        access_token: String,
    },
}

impl std::fmt::Debug for TileSourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaticMap { base_url } => f
                .debug_struct("StaticMap")
                .field("base_url", base_url)
                .finish(),
            Self::Mapbox {
                base_url, style, ..
            } => f
                .debug_struct("Mapbox")
                .field("base_url", base_url)
                .field("style", style)
                .field("access_token", &"<redacted>")
                .finish(),
        }
    }
}

impl Default for TileSourceConfig {
    fn default() -> Self {
        Self::StaticMap {
            base_url: default_static_map_url(),
        }
    }
}

impl TileSourceConfig {
    pub fn mapbox(access_token: impl Into<String>) -> Self {
        Self::Mapbox {
            base_url: default_mapbox_url(),
            style: default_mapbox_style(),
            access_token: access_token.into(),
        }
    }

    /// Inject the Mapbox credential; providers without one ignore it.
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        if let Self::Mapbox { access_token, .. } = self {
            *access_token = token.into();
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::StaticMap { .. } => "static-map",
            Self::Mapbox { .. } => "mapbox",
        }
    }

    pub fn validate(&self) -> MapZoomResult<()> {
        match self {
            Self::StaticMap { base_url } => validate_base_url(base_url),
            Self::Mapbox {
                base_url,
                style,
                access_token,
            } => {
                validate_base_url(base_url)?;
                if style.trim().is_empty() {
                    return Err(MapZoomError::invalid_input("mapbox style must not be empty"));
                }
                if access_token.trim().is_empty() {
                    return Err(MapZoomError::invalid_input(
                        "mapbox access token is required (set MAPBOX_ACCESS_TOKEN)",
                    ));
                }
                Ok(())
            }
        }
    }
}

fn validate_base_url(url: &str) -> MapZoomResult<()> {
    reqwest::Url::parse(url)
        .map(|_| ())
        .map_err(|e| MapZoomError::invalid_input(format!("invalid tile base url '{url}': {e}")))
}

pub(crate) fn default_static_map_url() -> String {
    "https://staticmap.openstreetmap.de/staticmap.php".to_string()
}

pub(crate) fn default_mapbox_url() -> String {
    "https://api.mapbox.com".to_string()
}

pub(crate) fn default_mapbox_style() -> String {
    "mapbox/streets-v11".to_string()
}

/// Build a [`TileSource`] from configuration.
///
/// `timeout` bounds each HTTP request end to end.
pub fn create_tile_source(
    cfg: &TileSourceConfig,
    timeout: Duration,
) -> MapZoomResult<Box<dyn TileSource>> {
    cfg.validate()?;
    match cfg {
        TileSourceConfig::StaticMap { base_url } => {
            Ok(Box::new(StaticMapSource::new(base_url.clone(), timeout)?))
        }
        TileSourceConfig::Mapbox {
            base_url,
            style,
            access_token,
        } => Ok(Box::new(MapboxSource::new(
            base_url.clone(),
            style.clone(),
            access_token.clone(),
            timeout,
        )?)),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tiles/source.rs"]
mod tests;
