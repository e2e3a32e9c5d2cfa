use std::path::Path;

use rusqlite::Connection;

use crate::error::{AppError, PLUGIN_CONFIGURATION};

fn validate_db_path(path: &Path) -> Result<(), AppError> {
    if path.as_os_str().is_empty() {
        return Err(AppError::new(
            PLUGIN_CONFIGURATION,
            "Outage database path is empty",
        ));
    }
    if path.exists() && path.is_dir() {
        return Err(AppError::new(
            PLUGIN_CONFIGURATION,
            "Outage database path must be a file (not a directory)",
        )
        .with_details(path.display().to_string()));
    }
    Ok(())
}

/// Open the outage database, creating the file and its parent directory on first use, and
/// migrate it.
pub fn open_or_create(db_path: &Path) -> Result<Connection, AppError> {
    validate_db_path(db_path)?;

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::new("WORKSPACE_CREATE_FAILED", "Failed to create database directory")
                .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }

    let mut conn = crate::db::open(db_path)?;
    crate::db::migrate(&mut conn).map_err(|e| {
        let details = e.details.clone().unwrap_or_else(|| e.to_string());
        AppError::new(
            "WORKSPACE_MIGRATION_FAILED",
            "Failed to migrate outage database",
        )
        .with_details(details)
    })?;
    Ok(conn)
}

/// Open an existing outage database; a missing file is a configuration problem.
pub fn open_existing(db_path: &Path) -> Result<Connection, AppError> {
    validate_db_path(db_path)?;
    if !db_path.is_file() {
        return Err(AppError::new(
            PLUGIN_CONFIGURATION,
            "Outage database file not found",
        )
        .with_details(db_path.display().to_string()));
    }
    open_or_create(db_path)
}
