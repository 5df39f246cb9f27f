use crate::foundation::error::{MapZoomError, MapZoomResult};

/// Geographic position in decimal degrees (WGS84).
///
/// Construct through [`Coordinate::new`]; the fields are private so an out-of-range value can
/// never reach a tile provider.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

impl Coordinate {
    /// Latitude must be within `[-90, 90]`, longitude within `[-180, 180]`.
    pub fn new(lat: f64, lng: f64) -> MapZoomResult<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(MapZoomError::invalid_input(
                "latitude/longitude must be finite numbers",
            ));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(MapZoomError::invalid_input(format!(
                "latitude {lat} is outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(MapZoomError::invalid_input(format!(
                "longitude {lng} is outside [-180, 180]"
            )));
        }
        Ok(Self { lat, lng })
    }

    /// Latitude in degrees.
    pub fn lat(self) -> f64 {
        self.lat
    }

    /// Longitude in degrees.
    pub fn lng(self) -> f64 {
        self.lng
    }
}

impl<'de> serde::Deserialize<'de> for Coordinate {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Raw {
            lat: f64,
            lng: f64,
        }
        let raw = Raw::deserialize(d)?;
        Coordinate::new(raw.lat, raw.lng).map_err(serde::de::Error::custom)
    }
}

/// Inclusive zoom interval. `min < max` is checked by [`ZoomRange::validate`].
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl ZoomRange {
    pub fn new(min: f64, max: f64) -> MapZoomResult<Self> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(self) -> MapZoomResult<()> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(MapZoomError::InvalidRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    pub fn span(self) -> f64 {
        self.max - self.min
    }

    /// True when both ends are within `[lo, hi]`.
    pub fn within(self, lo: f64, hi: f64) -> bool {
        self.min >= lo && self.max <= hi
    }

    pub fn is_integral(self) -> bool {
        self.min.fract() == 0.0 && self.max.fract() == 0.0
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    /// Rational frame rate `num/den`; both parts must be non-zero.
    pub fn new(num: u32, den: u32) -> MapZoomResult<Self> {
        if den == 0 {
            return Err(MapZoomError::invalid_input("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(MapZoomError::invalid_input("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Integer frame rate, `num/1`.
    pub fn whole(num: u32) -> MapZoomResult<Self> {
        Self::new(num, 1)
    }

    /// Frames per second as a float.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Playback time of `frames` frames, in seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * f64::from(self.den) / f64::from(self.num)
    }

    /// Whole frames that fit in `secs`, rounded down. Negative input yields 0.
    pub fn secs_to_frames_floor(self, secs: f64) -> u64 {
        (secs * self.as_f64()).floor().max(0.0) as u64
    }

    /// `num/den` form accepted by ffmpeg's `-framerate`.
    pub fn to_ffmpeg_rate(self) -> String {
        if self.den == 1 {
            self.num.to_string()
        } else {
            format!("{}/{}", self.num, self.den)
        }
    }
}

/// Pixel dimensions of a requested tile or output frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn square(side: u32) -> Self {
        Self {
            width: side,
            height: side,
        }
    }

    pub fn validate(self) -> MapZoomResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MapZoomError::invalid_input(
                "image width/height must be > 0",
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
