pub mod artifacts;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use artifacts::Artifacts;
pub use config::Config;
pub use error::{AppError, Result};
pub use services::{ModelRegistry, RecommendationService};
