//! Client for the upstream aircraft state feed.

pub mod decode;

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::aircraft::AircraftRecord;
use crate::config::BoundingBox;
use crate::errors::FeedError;

pub use decode::{FeedSnapshot, SkipCounts};

const USER_AGENT: &str = concat!("airtrack/", env!("CARGO_PKG_VERSION"));

/// Anything that can produce one cycle's worth of aircraft for a region.
pub trait AircraftSource: Send + Sync + 'static {
    fn fetch(&self, bounds: &BoundingBox) -> impl Future<Output = Result<FeedSnapshot, FeedError>> + Send;
}

#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    endpoint: String,
}

impl FeedClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).timeout(timeout).build()?;
        Ok(FeedClient { http, endpoint: endpoint.into() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Aircraft with a known position inside `bounds`. Failures are logged and
    /// reported as an empty sky.
    pub async fn fetch_aircraft(&self, bounds: &BoundingBox) -> Vec<AircraftRecord> {
        match self.fetch(bounds).await {
            Ok(snapshot) => snapshot.aircraft,
            Err(e) => {
                error!("Error fetching aircraft data: {}", e);
                Vec::new()
            }
        }
    }

    async fn request(&self, bounds: &BoundingBox) -> Result<FeedSnapshot, FeedError> {
        info!("Fetching aircraft from {} for {:?}", self.endpoint, bounds);
        let response = self.http.get(&self.endpoint).query(&bounds.query()).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("feed responded with {}", status);
            return Err(FeedError::Status(status));
        }

        let body = response.bytes().await?;
        let snapshot = decode::decode_response(&body)?;
        info!(
            "received {} aircraft (server time {}, {} skipped)",
            snapshot.aircraft.len(),
            snapshot.server_time,
            snapshot.skipped.total()
        );
        Ok(snapshot)
    }
}

impl AircraftSource for FeedClient {
    async fn fetch(&self, bounds: &BoundingBox) -> Result<FeedSnapshot, FeedError> {
        self.request(bounds).await
    }
}
