//! Geocoding collaborator.
//!
//! Resolvers only see the [`Geocoder`] trait. Every failure (missing key,
//! transport error, non-`OK` status, malformed body) degrades to `None`; there
//! is no retry.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const USER_AGENT: &str = concat!("fincal/", env!("CARGO_PKG_VERSION"));

/// The fields resolvers use from a geocoded address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeResult {
    pub formatted_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub place_id: String,
    pub locality: String,
    /// Region.
    pub admin_area1: String,
    /// Province (short code, e.g. `RE`).
    pub admin_area2: String,
    pub admin_area3: String,
    pub country: String,
    pub country_code: String,
    pub postal_code: String,
}

impl GeocodeResult {
    pub fn maps_uri(&self) -> String {
        format!("https://www.google.com/maps/place/?q=place_id:{}", self.place_id)
    }
}

pub trait Geocoder {
    fn geocode(&self, address: &str) -> Option<GeocodeResult>;
}

/// Geocoder that never answers. Used for dry runs and when no key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeocoder;

impl Geocoder for NoGeocoder {
    fn geocode(&self, _address: &str) -> Option<GeocodeResult> {
        None
    }
}

/// Blocking client for the Google geocoding endpoint.
#[derive(Debug)]
pub struct GoogleGeocoder {
    api_key: Option<String>,
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl GoogleGeocoder {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Geocoding(e.to_string()))?;
        Ok(Self { api_key: api_key.filter(|k| !k.trim().is_empty()), endpoint: GOOGLE_GEOCODE_URL.to_string(), client })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn fetch(&self, address: &str, api_key: &str) -> std::result::Result<String, reqwest::Error> {
        self.client
            .get(&self.endpoint)
            .query(&[("address", address), ("key", api_key), ("language", "it")])
            .send()?
            .error_for_status()?
            .text()
    }
}

impl Geocoder for GoogleGeocoder {
    fn geocode(&self, address: &str) -> Option<GeocodeResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(address, "geocoding skipped: no API key configured");
            return None;
        };
        if address.trim().is_empty() {
            return None;
        }

        match self.fetch(address, api_key) {
            Ok(body) => parse_geocode_response(&body),
            Err(err) => {
                tracing::warn!(address, %err, "geocoding request failed");
                None
            }
        }
    }
}

// --- Response parsing -------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Response {
    status: String,
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    #[serde(default)]
    formatted_address: String,
    #[serde(default)]
    place_id: String,
    #[serde(default)]
    address_components: Vec<Component>,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Component {
    long_name: String,
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

/// First result of a geocoding JSON body, or `None` for non-`OK` or malformed responses.
pub fn parse_geocode_response(body: &str) -> Option<GeocodeResult> {
    let response: Response = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(%err, "malformed geocoding response");
            return None;
        }
    };
    if response.status != "OK" {
        tracing::warn!(status = %response.status, "geocoding returned no data");
        return None;
    }

    let place = response.results.into_iter().next()?;
    let component = |kind: &str| place.address_components.iter().find(|c| c.types.iter().any(|t| t == kind));
    let long = |kind: &str| component(kind).map(|c| c.long_name.clone()).unwrap_or_default();
    let short = |kind: &str| component(kind).map(|c| c.short_name.clone()).unwrap_or_default();

    Some(GeocodeResult {
        formatted_address: place.formatted_address.clone(),
        latitude: place.geometry.location.lat,
        longitude: place.geometry.location.lng,
        place_id: place.place_id.clone(),
        locality: long("locality"),
        admin_area1: long("administrative_area_level_1"),
        admin_area2: short("administrative_area_level_2"),
        admin_area3: long("administrative_area_level_3"),
        country: long("country").to_uppercase(),
        country_code: short("country"),
        postal_code: long("postal_code"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGGIO: &str = r#"{
        "status": "OK",
        "results": [{
            "formatted_address": "Via Melato, 42122 Reggio Emilia RE, Italia",
            "place_id": "ChIJ-reggio",
            "geometry": { "location": { "lat": 44.6989, "lng": 10.6297 } },
            "address_components": [
                { "long_name": "Reggio Emilia", "short_name": "Reggio Emilia", "types": ["locality", "political"] },
                { "long_name": "Provincia di Reggio Emilia", "short_name": "RE", "types": ["administrative_area_level_2"] },
                { "long_name": "Emilia-Romagna", "short_name": "Emilia-Romagna", "types": ["administrative_area_level_1"] },
                { "long_name": "Italia", "short_name": "IT", "types": ["country", "political"] },
                { "long_name": "42122", "short_name": "42122", "types": ["postal_code"] }
            ]
        }]
    }"#;

    #[test]
    fn parses_the_first_result() {
        let result = parse_geocode_response(REGGIO).unwrap();
        assert_eq!(result.locality, "Reggio Emilia");
        assert_eq!(result.admin_area2, "RE");
        assert_eq!(result.country, "ITALIA");
        assert_eq!(result.country_code, "IT");
        assert_eq!(result.postal_code, "42122");
        assert_eq!(result.maps_uri(), "https://www.google.com/maps/place/?q=place_id:ChIJ-reggio");
    }

    #[test]
    fn non_ok_and_malformed_bodies_yield_none() {
        assert!(parse_geocode_response(r#"{"status": "ZERO_RESULTS", "results": []}"#).is_none());
        assert!(parse_geocode_response(r#"{"status": "REQUEST_DENIED"}"#).is_none());
        assert!(parse_geocode_response("<html>").is_none());
    }

    #[test]
    fn missing_key_yields_none_without_a_request() {
        let geocoder = GoogleGeocoder::new(None).unwrap().with_endpoint("http://127.0.0.1:9/unused");
        assert!(geocoder.geocode("Reggio Emilia").is_none());
    }
}
