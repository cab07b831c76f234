use async_trait::async_trait;

use crate::errors::{AppError, AppResult};
use crate::filters::Coordinates;

/// Seam over the platform's asynchronous position API. One outstanding request
/// at a time is sufficient; callers that re-invoke before completion race and
/// the last completed result wins.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self) -> AppResult<Coordinates>;
}

/// Constant-position source: the synthetic stand-in used where no device
/// geolocation exists (tests, headless tooling, kiosks with a known address).
pub struct FixedPositionSource {
    position: Coordinates,
}

impl FixedPositionSource {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            position: Coordinates {
                latitude,
                longitude,
            },
        }
    }
}

#[async_trait]
impl PositionSource for FixedPositionSource {
    async fn current_position(&self) -> AppResult<Coordinates> {
        Ok(self.position)
    }
}

/// Models denied permission or a platform without geolocation; every request
/// fails and coordinates stay unset until the user provides them manually.
#[derive(Default)]
pub struct UnavailablePositionSource;

#[async_trait]
impl PositionSource for UnavailablePositionSource {
    async fn current_position(&self) -> AppResult<Coordinates> {
        Err(AppError::Config("device position unavailable".into()))
    }
}
