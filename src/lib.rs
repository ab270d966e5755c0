mod config;
mod errors;
pub mod evaluator;
pub mod metrics;
pub mod middleware;
pub mod models;
mod observer;
pub mod processes;
pub mod reports;
pub mod samples;
pub mod snapshot;
pub mod sources;
pub mod storage;
pub mod transaction;
pub mod utils;

pub use config::*;
pub use errors::*;
pub use observer::*;
pub use utils::*;


//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
