//! Checkout Backend Library
//!
//! Stock reservation and order placement, exposed for the binary, tests and
//! other consumers.

pub mod config;
pub mod database;
pub mod error;
pub mod http;
pub mod models;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult, CheckoutError, CheckoutResult};
pub use http::{router, AppState};
