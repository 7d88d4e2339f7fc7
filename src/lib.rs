// Core modules
pub mod api;
pub mod breakout;
pub mod config;
pub mod execution;
pub mod filters;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod patterns;
pub mod risk;
pub mod watchlist;

// Re-export commonly used types
pub use api::{MarketData, NewsSource};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
