pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::{config::Config, ml::PredictionService};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<PredictionService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, service: Arc<PredictionService>) -> Self {
        Self {
            config,
            service,
            started_at: Instant::now(),
        }
    }
}
