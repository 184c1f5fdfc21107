pub mod lenient;
pub mod prediction;
pub mod record;

pub use prediction::*;
pub use record::{Outcome, StartupRecord, NUMERIC_COLUMNS, N_NUMERIC};
