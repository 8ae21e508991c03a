//! Client for the external geocoding service, with bounded retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::models::{Coordinates, DeviceAddress, GeocodeHit, ReverseGeocodeHit};

/// Why the device could not report a position. Kept separate from network
/// failures so the caller can tell "enable location access" apart from
/// "service unreachable".
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("device position unavailable")]
    Unavailable,
}

/// Source of the device's reported position (browser geolocation, OS
/// services). Injected so the pipeline never talks to platform APIs
/// directly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceLocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

/// Wraps the address-geocoding collaborator with bounded retry and a
/// per-attempt timeout. Stateless: pure request/response.
///
/// A successful call with zero matches is NOT a failure — it comes back as
/// an empty list so callers can distinguish "service unreachable" from
/// "address unmatched".
#[derive(Debug, Clone)]
pub struct GeocodingService {
    client: Client,
    base_url: String,
    attempts: u32,
    backoff: Duration,
}

impl GeocodingService {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ServiceError::InternalError(format!("failed to construct geocoding client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            attempts: attempts.max(1),
            backoff,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            config.geocode_base_url.clone(),
            config.geocode_timeout(),
            config.geocode_attempts,
            config.geocode_backoff(),
        )
    }

    /// Resolves a free-text address query to candidate coordinates.
    #[instrument(skip(self))]
    pub async fn resolve(&self, query: &str) -> Result<Vec<GeocodeHit>, ServiceError> {
        let params = [
            ("q".to_string(), query.to_string()),
            ("limit".to_string(), "1".to_string()),
            ("addressdetails".to_string(), "1".to_string()),
        ];
        self.get_with_retry("/order/geocode", &params).await
    }

    /// Reverse-geocodes a coordinate. `None` means the service had no match
    /// for that position.
    #[instrument(skip(self))]
    pub async fn reverse(
        &self,
        position: Coordinates,
    ) -> Result<Option<ReverseGeocodeHit>, ServiceError> {
        let params = [
            ("lat".to_string(), position.latitude.to_string()),
            ("lon".to_string(), position.longitude.to_string()),
            ("zoom".to_string(), "18".to_string()),
            ("addressdetails".to_string(), "1".to_string()),
        ];
        let hit: ReverseGeocodeHit =
            self.get_with_retry("/order/reverse-geocode", &params).await?;
        if hit.address.is_none() {
            return Ok(None);
        }
        Ok(Some(hit))
    }

    /// Turns the device's reported position into address-field prefill.
    ///
    /// A provider failure surfaces as `LocationUnavailable`; a network
    /// failure during the reverse lookup keeps its own error identity.
    /// `None` means the position reverse-geocoded to nothing usable.
    pub async fn resolve_current_device_location(
        &self,
        provider: &dyn DeviceLocationProvider,
    ) -> Result<Option<DeviceAddress>, ServiceError> {
        let position = provider
            .current_position()
            .await
            .map_err(|e| ServiceError::LocationUnavailable(e.to_string()))?;

        let Some(hit) = self.reverse(position).await? else {
            return Ok(None);
        };

        Ok(Some(device_address_from_hit(&hit)))
    }

    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, ServiceError> {
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            match self.get_once(path, params).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, path, "geocoding request recovered after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    warn!(attempt, path, "geocoding request failed: {}", err);
                    last_error = Some(err);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ServiceError::ExternalServiceError("geocoding request failed".to_string())
        }))
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!(
                    "failed to reach geocoding service: {}",
                    e
                ))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "geocoding service returned status {}",
                response.status()
            )));
        }

        response.json::<T>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!(
                "failed to parse geocoding response: {}",
                e
            ))
        })
    }
}

fn device_address_from_hit(hit: &ReverseGeocodeHit) -> DeviceAddress {
    let field = |key: &str| -> Option<String> {
        hit.address
            .as_ref()
            .and_then(|a| a.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    DeviceAddress {
        country: field("country"),
        city: field("city")
            .or_else(|| field("town"))
            .or_else(|| field("village"))
            .or_else(|| field("state")),
        address_line: hit.display_name.clone(),
    }
}
