use std::io::Read;
use std::time::Duration;

use crate::foundation::error::{MapZoomError, MapZoomResult, TileFetchError, TileFetchReason};

/// Blocking HTTP client shared by the HTTP tile providers.
///
/// `reqwest::blocking::Client` is internally reference-counted and safe to use from many worker
/// threads at once.
#[derive(Clone, Debug)]
pub(crate) struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub(crate) fn new(timeout: Duration) -> MapZoomResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mapzoom/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MapZoomError::invalid_input(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }

    /// GET `url` and return the body when it is a recognisable image.
    ///
    /// Errors never carry the URL, which may contain a credential.
    pub(crate) fn get_image(&self, url: &str, zoom: f64) -> Result<Vec<u8>, TileFetchError> {
        let fail = |reason| TileFetchError::new(reason, zoom);

        let mut resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| fail(classify(e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fail(TileFetchReason::Status(status.as_u16())));
        }

        let mut body = Vec::new();
        resp.read_to_end(&mut body).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                fail(TileFetchReason::Timeout)
            } else {
                fail(TileFetchReason::Transport(format!("reading body: {e}")))
            }
        })?;

        check_image_payload(&body).map_err(fail)?;
        Ok(body)
    }
}

fn classify(e: reqwest::Error) -> TileFetchReason {
    if e.is_timeout() {
        TileFetchReason::Timeout
    } else {
        TileFetchReason::Transport(e.without_url().to_string())
    }
}

/// Reject empty bodies and anything whose magic bytes are not a known raster format.
pub(crate) fn check_image_payload(body: &[u8]) -> Result<image::ImageFormat, TileFetchReason> {
    if body.is_empty() {
        return Err(TileFetchReason::Malformed("empty body".to_string()));
    }
    image::guess_format(body)
        .map_err(|e| TileFetchReason::Malformed(format!("not an image: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/tiles/http.rs"]
mod tests;
