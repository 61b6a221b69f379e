use async_trait::async_trait;
use serde::Deserialize;

use super::{GeocodeHit, Geocoder};
use crate::error::{EventMapError, EventMapResult};

const DEFAULT_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: Option<String>,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl GeocodeResponse {
    fn into_hit(self) -> EventMapResult<Option<GeocodeHit>> {
        match self.status.as_str() {
            "OK" => Ok(self.results.into_iter().next().map(|r| GeocodeHit {
                formatted_address: r.formatted_address,
                lat: r.geometry.location.lat,
                lng: r.geometry.location.lng,
            })),
            "ZERO_RESULTS" => Ok(None),
            status => Err(EventMapError::Geocode(match self.error_message {
                Some(message) => format!("{status}: {message}"),
                None => status.to_string(),
            })),
        }
    }
}

/// Google Maps Geocoding API.
pub struct GoogleGeocoder {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GoogleGeocoder {
    pub fn new(client: reqwest::Client, api_key: &str) -> Self {
        GoogleGeocoder {
            client,
            api_key: api_key.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, text: &str) -> EventMapResult<Option<GeocodeHit>> {
        let response: GeocodeResponse = self
            .client
            .get(&self.endpoint)
            .query(&[("address", text), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.into_hit()
    }
}
