pub mod api;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod progress_service;
pub mod scheduler;
pub mod store;

pub use config::Config;
pub use errors::*;
pub use models::*;
pub use progress_service::{apply_study_streak, mastery_level, ProgressTracker};
pub use scheduler::Sm2Scheduler;
pub use store::{MemoryProgressStore, ProgressGateway, ProgressStore, SqliteProgressStore};
