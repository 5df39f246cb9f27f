use std::time::Duration;

use crate::{
    foundation::core::{Coordinate, ImageSize},
    foundation::error::{MapZoomError, MapZoomResult, TileFetchError},
    tiles::http::HttpFetcher,
    tiles::source::TileSource,
};

pub const MAPBOX_ATTRIBUTION: &str = "© Mapbox © OpenStreetMap contributors";

/// Mapbox Static Images API. Accepts fractional zoom in `[0, 22]`.
#[derive(Clone)]
pub struct MapboxSource {
    base_url: reqwest::Url,
    style: String,
    access_token: String,
    http: HttpFetcher,
}

impl std::fmt::Debug for MapboxSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapboxSource")
            .field("base_url", &self.base_url.as_str())
            .field("style", &self.style)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl MapboxSource {
    pub fn new(
        base_url: impl AsRef<str>,
        style: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> MapZoomResult<Self> {
        let base_url = base_url.as_ref();
        let base_url = reqwest::Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            MapZoomError::invalid_input(format!("invalid mapbox base url '{base_url}': {e}"))
        })?;
        Ok(Self {
            base_url,
            style: style.into(),
            access_token: access_token.into(),
            http: HttpFetcher::new(timeout)?,
        })
    }

    pub fn url_for(&self, center: Coordinate, zoom: f64, size: ImageSize) -> String {
        let mut url = self.base_url.clone();
        let path = format!(
            "{}/styles/v1/{}/static/{},{},{},0/{}",
            url.path().trim_end_matches('/'),
            self.style,
            center.lng(),
            center.lat(),
            zoom,
            size
        );
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("access_token", &self.access_token);
        url.into()
    }
}

impl TileSource for MapboxSource {
    #[tracing::instrument(level = "trace", skip(self), fields(provider = "mapbox"))]
    fn fetch(
        &self,
        center: Coordinate,
        zoom: f64,
        size: ImageSize,
    ) -> Result<Vec<u8>, TileFetchError> {
        self.http.get_image(&self.url_for(center, zoom, size), zoom)
    }

    fn zoom_bounds(&self) -> (f64, f64) {
        (0.0, 22.0)
    }

    fn fractional_zoom(&self) -> bool {
        true
    }

    fn attribution(&self) -> &str {
        MAPBOX_ATTRIBUTION
    }

    fn name(&self) -> &'static str {
        "mapbox"
    }
}
