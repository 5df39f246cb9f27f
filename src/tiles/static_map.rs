use std::time::Duration;

use crate::{
    foundation::core::{Coordinate, ImageSize},
    foundation::error::{MapZoomResult, TileFetchError},
    tiles::http::HttpFetcher,
    tiles::source::TileSource,
};

pub const OSM_ATTRIBUTION: &str = "© OpenStreetMap contributors";

/// `staticmap.php`-style provider (OpenStreetMap DE and compatible servers).
///
/// Renders at whole zoom levels between 0 and 19.
#[derive(Clone, Debug)]
pub struct StaticMapSource {
    base_url: String,
    http: HttpFetcher,
}

impl StaticMapSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> MapZoomResult<Self> {
        Ok(Self {
            base_url: base_url.into(),
            http: HttpFetcher::new(timeout)?,
        })
    }

    pub fn url_for(&self, center: Coordinate, zoom: f64, size: ImageSize) -> String {
        format!(
            "{}?center={},{}&zoom={}&size={}&format=png",
            self.base_url,
            center.lat(),
            center.lng(),
            zoom,
            size
        )
    }
}

impl TileSource for StaticMapSource {
    #[tracing::instrument(level = "trace", skip(self), fields(provider = "static-map"))]
    fn fetch(
        &self,
        center: Coordinate,
        zoom: f64,
        size: ImageSize,
    ) -> Result<Vec<u8>, TileFetchError> {
        self.http.get_image(&self.url_for(center, zoom, size), zoom)
    }

    fn zoom_bounds(&self) -> (f64, f64) {
        (0.0, 19.0)
    }

    fn fractional_zoom(&self) -> bool {
        false
    }

    fn attribution(&self) -> &str {
        OSM_ATTRIBUTION
    }

    fn name(&self) -> &'static str {
        "static-map"
    }
}
