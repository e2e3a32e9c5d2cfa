//! Narrow seams to the systems an outage change has to be pushed to: the calendar, the
//! standalone maintenance page and the maintenance-mode trigger setting.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::domain::Outage;
use crate::error::AppError;
use crate::render::static_page_html;

/// Setting name holding the next autostart timestamp.
pub const AUTOSTART_SETTING: &str = "maintenance_autostart";

pub trait CalendarSync {
    fn upsert(&self, conn: &Connection, outage: &Outage) -> Result<(), AppError>;
    fn remove(&self, conn: &Connection, outage_id: i64) -> Result<(), AppError>;
}

pub trait StaticPageRenderer {
    /// Produce the snapshot for `outage`, or remove it when `None`.
    fn regenerate(&self, outage: Option<&Outage>) -> Result<(), AppError>;
}

pub trait MaintenanceTrigger {
    fn publish(&self, conn: &Connection, starttime: i64) -> Result<(), AppError>;
    fn clear(&self, conn: &Connection) -> Result<(), AppError>;
    fn current(&self, conn: &Connection) -> Result<Option<i64>, AppError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCalendar;

impl CalendarSync for NoopCalendar {
    fn upsert(&self, _conn: &Connection, _outage: &Outage) -> Result<(), AppError> {
        Ok(())
    }

    fn remove(&self, _conn: &Connection, _outage_id: i64) -> Result<(), AppError> {
        Ok(())
    }
}

/// Calendar entries kept in the `calendar_events` table next to the outages.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteCalendar;

impl CalendarSync for SqliteCalendar {
    fn upsert(&self, conn: &Connection, outage: &Outage) -> Result<(), AppError> {
        let id = outage
            .id
            .ok_or_else(|| AppError::invalid_argument("Calendar entry needs a persisted outage"))?;
        conn.execute(
            r#"
      INSERT INTO calendar_events(outage_id, name, description, timestart, timeduration)
      VALUES (?1, ?2, ?3, ?4, ?5)
      ON CONFLICT(outage_id) DO UPDATE SET
        name = excluded.name,
        description = excluded.description,
        timestart = excluded.timestart,
        timeduration = excluded.timeduration
      "#,
            rusqlite::params![
                id,
                outage.title(),
                outage.description(),
                outage.starttime.unwrap_or_default(),
                outage.duration_planned().unwrap_or_default(),
            ],
        )
        .map_err(|e| {
            AppError::new("DB_WRITE_FAILED", "Failed to write calendar entry")
                .with_details(e.to_string())
        })?;
        Ok(())
    }

    fn remove(&self, conn: &Connection, outage_id: i64) -> Result<(), AppError> {
        conn.execute(
            "DELETE FROM calendar_events WHERE outage_id = ?1",
            [outage_id],
        )
        .map_err(|e| {
            AppError::new("DB_WRITE_FAILED", "Failed to delete calendar entry")
                .with_details(e.to_string())
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStaticPage;

impl StaticPageRenderer for NoopStaticPage {
    fn regenerate(&self, _outage: Option<&Outage>) -> Result<(), AppError> {
        Ok(())
    }
}

/// Writes the standalone maintenance page to a fixed file path.
#[derive(Debug, Clone)]
pub struct FileStaticPage {
    path: PathBuf,
}

impl FileStaticPage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl StaticPageRenderer for FileStaticPage {
    fn regenerate(&self, outage: Option<&Outage>) -> Result<(), AppError> {
        let Some(outage) = outage else {
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(|e| {
                    AppError::new("STATIC_PAGE_REMOVE_FAILED", "Failed to remove maintenance page")
                        .with_details(format!("path={}: {}", self.path.display(), e))
                })?;
                debug!(path = %self.path.display(), "removed maintenance page");
            }
            return Ok(());
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::new("STATIC_PAGE_WRITE_FAILED", "Failed to create maintenance page directory")
                    .with_details(format!("path={}: {}", parent.display(), e))
            })?;
        }

        // Write next to the target, then rename so readers never see a partial page.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, static_page_html(outage)).map_err(|e| {
            AppError::new("STATIC_PAGE_WRITE_FAILED", "Failed to write maintenance page")
                .with_details(format!("path={}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            AppError::new("STATIC_PAGE_WRITE_FAILED", "Failed to move maintenance page into place")
                .with_details(format!("path={}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), outage_id = ?outage.id, "wrote maintenance page");
        Ok(())
    }
}

/// Trigger stored in the `settings` table under [`AUTOSTART_SETTING`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsTrigger;

impl MaintenanceTrigger for SettingsTrigger {
    fn publish(&self, conn: &Connection, starttime: i64) -> Result<(), AppError> {
        conn.execute(
            "INSERT INTO settings(name, value) VALUES (?1, ?2) ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            rusqlite::params![AUTOSTART_SETTING, starttime.to_string()],
        )
        .map_err(|e| {
            AppError::new("DB_WRITE_FAILED", "Failed to publish maintenance trigger")
                .with_details(e.to_string())
        })?;
        Ok(())
    }

    fn clear(&self, conn: &Connection) -> Result<(), AppError> {
        conn.execute("DELETE FROM settings WHERE name = ?1", [AUTOSTART_SETTING])
            .map_err(|e| {
                AppError::new("DB_WRITE_FAILED", "Failed to clear maintenance trigger")
                    .with_details(e.to_string())
            })?;
        Ok(())
    }

    fn current(&self, conn: &Connection) -> Result<Option<i64>, AppError> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE name = ?1",
                [AUTOSTART_SETTING],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to read maintenance trigger")
                    .with_details(e.to_string())
            })?;
        raw.map(|v| {
            v.parse::<i64>().map_err(|e| {
                AppError::new("DB_DECODE_FAILED", "Maintenance trigger is not a timestamp")
                    .with_details(format!("value={v}; err={e}"))
            })
        })
        .transpose()
    }
}

/// In-process trigger. Clones share state, so a test can keep a handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrigger {
    value: Arc<Mutex<Option<i64>>>,
}

impl MemoryTrigger {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<i64>>, AppError> {
        self.value
            .lock()
            .map_err(|_| AppError::new("TRIGGER_LOCK_POISONED", "Maintenance trigger lock poisoned"))
    }
}

impl MaintenanceTrigger for MemoryTrigger {
    fn publish(&self, _conn: &Connection, starttime: i64) -> Result<(), AppError> {
        *self.lock()? = Some(starttime);
        Ok(())
    }

    fn clear(&self, _conn: &Connection) -> Result<(), AppError> {
        *self.lock()? = None;
        Ok(())
    }

    fn current(&self, _conn: &Connection) -> Result<Option<i64>, AppError> {
        Ok(*self.lock()?)
    }
}
