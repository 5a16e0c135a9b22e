mod basic;
mod client;
mod error;
mod vehicles;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use error::FetchError;
pub use vehicles::{
    DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, RouteSubscription, VehicleFetcher,
    vehicle_locations_url,
};
