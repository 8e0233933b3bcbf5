pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

use crate::commands::AppState;
use crate::error::AppResult;
use crate::services::providers::CalendarAccessProvider;

const DATABASE_FILE_NAME: &str = "taskflow.sqlite";

/// Sets up logging and storage under `data_dir` and returns a SQLite-backed
/// [`AppState`].
pub fn bootstrap(data_dir: &Path, calendar: Arc<dyn CalendarAccessProvider>) -> AppResult<AppState> {
    crate::utils::logger::init_logging(&data_dir.join("logs"))?;

    std::fs::create_dir_all(data_dir)?;
    let pool = crate::db::DbPool::new(data_dir.join(DATABASE_FILE_NAME))?;

    AppState::new(pool, calendar)
}
