//! Startup outcome prediction.
//!
//! Trains a tree-ensemble classifier on historical startup records, calibrates
//! its decision threshold and serves predictions over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ml;
pub mod models;

pub use config::Config;
pub use error::{AppError, Result};
