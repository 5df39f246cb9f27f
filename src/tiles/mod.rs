//! Tile providers.
//!
//! Every provider implements [`source::TileSource`]; the pipeline never branches on which one is
//! in use beyond asking for its zoom bounds, integrality and attribution.

pub(crate) mod http;
/// Mapbox Static Images provider (fractional zoom).
pub mod mapbox;
/// Provider trait, configuration and factory.
pub mod source;
/// `staticmap.php` provider (whole zoom levels).
pub mod static_map;
