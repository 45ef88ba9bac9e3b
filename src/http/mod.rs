//! HTTP surface: health, status, operator routes and the bridge upgrade

pub mod middleware;
pub mod routes;

pub use routes::build_router;
