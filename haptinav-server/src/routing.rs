use std::time::Duration;

use async_trait::async_trait;
use haptinav_core::route::{RouteRequest, RouteResponse};

use crate::GuidanceError;

// A route request that takes longer than this is abandoned
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Something that computes routes
///
/// One call is one attempt; retrying is up to the caller.
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn fetch(&self, request: &RouteRequest) -> Result<RouteResponse, GuidanceError>;
}

/// GraphHopper compatible HTTP routing service
pub struct HttpRoutingProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpRoutingProvider {
    pub fn new(url: String, api_key: Option<String>) -> Result<Self, GuidanceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("haptinav/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpRoutingProvider {
            client,
            url,
            api_key,
        })
    }

    fn query(&self, request: &RouteRequest) -> Vec<(&'static str, String)> {
        let mut query = request.query_pairs();
        if let Some(key) = &self.api_key {
            query.push(("key", key.clone()));
        }
        query
    }
}

#[async_trait]
impl RoutingProvider for HttpRoutingProvider {
    async fn fetch(&self, request: &RouteRequest) -> Result<RouteResponse, GuidanceError> {
        log::debug!(
            "Requesting {} route {:?} -> {:?}",
            request.vehicle_profile,
            request.origin,
            request.destination
        );
        let response = self
            .client
            .get(&self.url)
            .query(&self.query(request))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        match RouteResponse::from_json(&body) {
            Ok(parsed) if status.is_success() => Ok(parsed),
            // The service explains its refusals in `message`
            Ok(RouteResponse {
                message: Some(message),
                ..
            }) => Err(GuidanceError::Routing(format!("{}: {}", status, message))),
            Ok(_) => Err(GuidanceError::Routing(status.to_string())),
            Err(e) if status.is_success() => Err(GuidanceError::Route(e)),
            Err(_) => Err(GuidanceError::Routing(status.to_string())),
        }
    }
}
