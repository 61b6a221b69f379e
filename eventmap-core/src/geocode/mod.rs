//! Free-text location → coordinates.

mod google;
mod resolver;

pub use google::GoogleGeocoder;
pub use resolver::{GeocodeResolver, ResolverOptions};

use async_trait::async_trait;

use crate::error::EventMapResult;

/// A successful geocoding answer.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub formatted_address: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

/// An upstream geocoding provider.
///
/// `Ok(None)` means the provider looked and found nothing. `Err` is a
/// transient failure and is never cached as a success.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, text: &str) -> EventMapResult<Option<GeocodeHit>>;
}
