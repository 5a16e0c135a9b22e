//! Concurrent download of vehicle locations for a set of routes.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{Instrument, debug};

use super::FetchError;
use super::client::HttpClient;
use crate::clock::{Clock, SystemClock};
use crate::parser::{RegexVehicleParser, VehicleParser, VehicleRecord};

pub const DEFAULT_BASE_URL: &str = "http://webservices.nextbus.com";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);

/// One agency/route pair to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSubscription {
    pub agency: String,
    pub route: String,
}

impl RouteSubscription {
    pub fn new(agency: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            agency: agency.into(),
            route: route.into(),
        }
    }
}

/// Builds the `vehicleLocations` URL for `subscription` under `base_url`.
///
/// `t=0` asks for every vehicle regardless of when it last reported.
pub fn vehicle_locations_url(
    base_url: &str,
    subscription: &RouteSubscription,
) -> Result<Url, FetchError> {
    let raw = format!("{}/service/publicXMLFeed", base_url.trim_end_matches('/'));
    let mut url = Url::parse(&raw).map_err(|e| FetchError::InvalidUrl {
        url: raw.clone(),
        reason: e.to_string(),
    })?;

    url.query_pairs_mut()
        .append_pair("command", "vehicleLocations")
        .append_pair("a", &subscription.agency)
        .append_pair("t", "0")
        .append_pair("r", &subscription.route);

    Ok(url)
}

/// Fetches and parses vehicle locations for several routes at once.
///
/// All requests must succeed: the first failure aborts the rest and is
/// returned, so callers never see a partial list.
pub struct VehicleFetcher<C> {
    client: Arc<C>,
    parser: Box<dyn VehicleParser>,
    clock: Arc<dyn Clock>,
    base_url: String,
    timeout: Duration,
}

impl<C: HttpClient + 'static> VehicleFetcher<C> {
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
            parser: Box::new(RegexVehicleParser),
            clock: Arc::new(SystemClock),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Per-request deadline; a request that misses it fails the fetch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_parser(mut self, parser: impl VehicleParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Clock used to stamp each response as it arrives.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Issues one request per subscription and concatenates the parsed
    /// vehicles in completion order.
    #[tracing::instrument(skip(self, subscriptions), fields(routes = subscriptions.len()))]
    pub async fn fetch(
        &self,
        subscriptions: &[RouteSubscription],
    ) -> Result<Vec<VehicleRecord>, FetchError> {
        let mut tasks = JoinSet::new();

        for subscription in subscriptions {
            let url = vehicle_locations_url(&self.base_url, subscription)?;
            let client = Arc::clone(&self.client);
            let timeout = self.timeout;
            let route = subscription.clone();

            let route_span = tracing::debug_span!(
                "fetch_route",
                agency = %subscription.agency,
                route = %subscription.route,
            );

            tasks.spawn(
                async move {
                    let body = match tokio::time::timeout(timeout, client.get_text(&url)).await {
                        Ok(result) => result?,
                        Err(_) => {
                            return Err(FetchError::Timeout {
                                url: url.to_string(),
                                timeout_ms: timeout.as_millis() as u64,
                            });
                        }
                    };
                    debug!(bytes = body.len(), "Route payload received");
                    Ok((route, body))
                }
                .instrument(route_span),
            );
        }

        let mut combined = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| FetchError::Task(e.to_string()))
                .and_then(|result| result);

            match outcome {
                Ok((route, body)) => {
                    let vehicles = self.parser.parse(&body, self.clock.now());
                    debug!(
                        agency = %route.agency,
                        route = %route.route,
                        vehicles = vehicles.len(),
                        "Route parsed"
                    );
                    combined.extend(vehicles);
                }
                Err(e) => {
                    // Outstanding requests may still finish; their results are dropped.
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        Ok(combined)
    }
}
