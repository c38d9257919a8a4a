//! Capture gateway
//!
//! Edge HTTP server accepting `ANY /w/{slug}/{*path}`. Each request is
//! normalized into a capture call to the store, and the store's answer becomes
//! the response: the endpoint's mock, `200 OK`, or a fixed error status.

pub mod api;
pub mod auth;
pub mod capture;
pub mod config;
pub mod error;
pub mod server;

pub use config::GatewayConfig;
pub use error::{ApiError, CaptureError};
pub use server::{GatewayError, GatewayServer};
