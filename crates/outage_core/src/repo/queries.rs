use std::cmp::Ordering;

use rusqlite::{Connection, OptionalExtension, Params, Row};
use serde::{Deserialize, Serialize};

use crate::domain::Outage;
use crate::error::{db_error, AppError};

const OUTAGE_COLUMNS: &str = r#"
  id, autostart, warntime, starttime, stoptime, finished,
  title, description, createdby, modifiedby, lastmodified
"#;

/// Audit trail entry written alongside every outage mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutageEvent {
    pub id: i64,
    pub outage_id: i64,
    pub action: OutageAction,
    pub actor: i64,
    pub snapshot: Outage,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutageAction {
    Created,
    Updated,
    Finished,
    Deleted,
}

impl OutageAction {
    pub fn as_str(self) -> &'static str {
        match self {
            OutageAction::Created => "created",
            OutageAction::Updated => "updated",
            OutageAction::Finished => "finished",
            OutageAction::Deleted => "deleted",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(OutageAction::Created),
            "updated" => Some(OutageAction::Updated),
            "finished" => Some(OutageAction::Finished),
            "deleted" => Some(OutageAction::Deleted),
            _ => None,
        }
    }
}

fn row_to_outage(row: &Row<'_>) -> rusqlite::Result<Outage> {
    Ok(Outage {
        id: Some(row.get(0)?),
        autostart: Some(row.get::<_, i64>(1)? != 0),
        warntime: Some(row.get(2)?),
        starttime: Some(row.get(3)?),
        stoptime: Some(row.get(4)?),
        finished: row.get(5)?,
        title: Some(row.get(6)?),
        description: Some(row.get(7)?),
        createdby: Some(row.get(8)?),
        modifiedby: Some(row.get(9)?),
        lastmodified: Some(row.get(10)?),
    })
}

fn query_outages<P: Params>(
    conn: &Connection,
    filter_and_order: &str,
    params: P,
) -> Result<Vec<Outage>, AppError> {
    let sql = format!("SELECT {OUTAGE_COLUMNS} FROM outages {filter_and_order}");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_error("DB_QUERY_FAILED", "Failed to prepare outages query", e))?;

    let rows = stmt
        .query_map(params, row_to_outage)
        .map_err(|e| db_error("DB_QUERY_FAILED", "Failed to query outages", e))?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| db_error("DB_QUERY_FAILED", "Failed to decode outage row", e))?);
    }
    Ok(out)
}

pub fn get_outage(conn: &Connection, id: i64) -> Result<Option<Outage>, AppError> {
    let sql = format!("SELECT {OUTAGE_COLUMNS} FROM outages WHERE id = ?1");
    conn.query_row(&sql, [id], row_to_outage)
        .optional()
        .map_err(|e| db_error("DB_QUERY_FAILED", "Failed to load outage", e))
}

pub fn list_outages(conn: &Connection) -> Result<Vec<Outage>, AppError> {
    query_outages(
        conn,
        "ORDER BY starttime ASC, stoptime ASC, title ASC, id ASC",
        [],
    )
}

pub fn list_unended(conn: &Connection, time: i64) -> Result<Vec<Outage>, AppError> {
    query_outages(
        conn,
        r#"
      WHERE stoptime > ?1 AND (finished IS NULL OR finished > ?1)
      ORDER BY starttime ASC, stoptime DESC, title ASC, id ASC
      "#,
        [time],
    )
}

pub fn list_ended(conn: &Connection, time: i64) -> Result<Vec<Outage>, AppError> {
    query_outages(
        conn,
        r#"
      WHERE stoptime <= ?1 OR (finished IS NOT NULL AND finished <= ?1)
      ORDER BY stoptime DESC, starttime DESC, title ASC, id ASC
      "#,
        [time],
    )
}

/// Ranking between two outages that are both active at `time`: ongoing beats warning, then the
/// earlier start wins, then the later stop wins. `Ordering::Less` means `a` is more important.
pub fn compare_importance(a: &Outage, b: &Outage, time: i64) -> Ordering {
    b.is_ongoing(time)
        .cmp(&a.is_ongoing(time))
        .then_with(|| a.starttime.cmp(&b.starttime))
        .then_with(|| b.stoptime.cmp(&a.stoptime))
        .then_with(|| a.id.cmp(&b.id))
}

/// Most important outage with `is_active(time)`.
pub fn resolve_active(conn: &Connection, time: i64) -> Result<Option<Outage>, AppError> {
    // SQL narrows the candidates; the entity predicate stays authoritative.
    let candidates = query_outages(
        conn,
        r#"
      WHERE (warntime <= ?1 OR starttime <= ?1)
        AND stoptime > ?1
        AND (finished IS NULL OR finished > ?1)
      "#,
        [time],
    )?;
    Ok(candidates
        .into_iter()
        .filter(|o| o.is_active(time))
        .min_by(|a, b| compare_importance(a, b, time)))
}

/// Most important outage with `is_ongoing(time)`.
pub fn resolve_ongoing(conn: &Connection, time: i64) -> Result<Option<Outage>, AppError> {
    let candidates = query_outages(
        conn,
        r#"
      WHERE starttime <= ?1
        AND stoptime > ?1
        AND (finished IS NULL OR finished > ?1)
      "#,
        [time],
    )?;
    Ok(candidates
        .into_iter()
        .filter(|o| o.is_ongoing(time))
        .min_by(|a, b| compare_importance(a, b, time)))
}

/// Earliest outage starting at or after `time`. Outages finished before they started are skipped.
pub fn next_starting(
    conn: &Connection,
    time: i64,
    autostart_only: bool,
) -> Result<Option<Outage>, AppError> {
    let filter = if autostart_only {
        "AND autostart = 1"
    } else {
        ""
    };
    let found = query_outages(
        conn,
        &format!(
            r#"
      WHERE starttime >= ?1 AND finished IS NULL {filter}
      ORDER BY starttime ASC, stoptime DESC, title ASC, id ASC
      LIMIT 1
      "#
        ),
        [time],
    )?;
    Ok(found.into_iter().next())
}

/// First instant after `time` at which any outage enters or leaves its warning or ongoing period.
pub fn next_boundary(conn: &Connection, time: i64) -> Result<Option<i64>, AppError> {
    conn.query_row(
        r#"
      SELECT MIN(b) FROM (
        SELECT warntime AS b FROM outages WHERE warntime > ?1
        UNION ALL SELECT starttime FROM outages WHERE starttime > ?1
        UNION ALL SELECT stoptime FROM outages WHERE stoptime > ?1
        UNION ALL SELECT finished FROM outages WHERE finished IS NOT NULL AND finished > ?1
      )
      "#,
        [time],
        |row| row.get(0),
    )
    .map_err(|e| db_error("DB_QUERY_FAILED", "Failed to compute next outage boundary", e))
}

pub fn insert_outage(conn: &Connection, record: &Outage) -> Result<i64, AppError> {
    conn.execute(
        r#"
      INSERT INTO outages(
        autostart, warntime, starttime, stoptime, finished,
        title, description, createdby, modifiedby, lastmodified
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
      "#,
        rusqlite::params![
            record.is_autostart() as i64,
            record.warntime,
            record.starttime,
            record.stoptime,
            record.finished,
            record.title.as_deref().unwrap_or_default(),
            record.description.as_deref().unwrap_or_default(),
            record.createdby,
            record.modifiedby,
            record.lastmodified,
        ],
    )
    .map_err(|e| db_error("DB_WRITE_FAILED", "Failed to insert outage", e))?;
    Ok(conn.last_insert_rowid())
}

/// Returns the number of rows changed (0 when the id does not exist).
pub fn update_outage(conn: &Connection, id: i64, record: &Outage) -> Result<usize, AppError> {
    conn.execute(
        r#"
      UPDATE outages SET
        autostart = ?1, warntime = ?2, starttime = ?3, stoptime = ?4, finished = ?5,
        title = ?6, description = ?7, createdby = ?8, modifiedby = ?9, lastmodified = ?10
      WHERE id = ?11
      "#,
        rusqlite::params![
            record.is_autostart() as i64,
            record.warntime,
            record.starttime,
            record.stoptime,
            record.finished,
            record.title.as_deref().unwrap_or_default(),
            record.description.as_deref().unwrap_or_default(),
            record.createdby,
            record.modifiedby,
            record.lastmodified,
            id,
        ],
    )
    .map_err(|e| db_error("DB_WRITE_FAILED", "Failed to update outage", e))
}

pub fn delete_outage_row(conn: &Connection, id: i64) -> Result<usize, AppError> {
    conn.execute("DELETE FROM outages WHERE id = ?1", [id])
        .map_err(|e| db_error("DB_WRITE_FAILED", "Failed to delete outage", e))
}

pub fn record_event(
    conn: &Connection,
    outage_id: i64,
    action: OutageAction,
    actor: i64,
    snapshot: &Outage,
    created_at: i64,
) -> Result<(), AppError> {
    let snapshot_json = serde_json::to_string(snapshot).map_err(|e| {
        AppError::new("DB_ENCODE_FAILED", "Failed to encode outage snapshot")
            .with_details(e.to_string())
    })?;
    conn.execute(
        "INSERT INTO outage_events(outage_id, action, actor, snapshot_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![outage_id, action.as_str(), actor, snapshot_json, created_at],
    )
    .map_err(|e| db_error("DB_WRITE_FAILED", "Failed to record outage event", e))?;
    Ok(())
}

pub fn list_events(conn: &Connection, outage_id: i64) -> Result<Vec<OutageEvent>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, outage_id, action, actor, snapshot_json, created_at
      FROM outage_events
      WHERE outage_id = ?1
      ORDER BY id ASC
      "#,
        )
        .map_err(|e| db_error("DB_QUERY_FAILED", "Failed to prepare outage events query", e))?;

    let rows = stmt
        .query_map([outage_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })
        .map_err(|e| db_error("DB_QUERY_FAILED", "Failed to query outage events", e))?;

    let mut out = Vec::new();
    for r in rows {
        let (id, outage_id, action, actor, snapshot_json, created_at) =
            r.map_err(|e| db_error("DB_QUERY_FAILED", "Failed to decode outage event row", e))?;
        let action = OutageAction::parse(&action).ok_or_else(|| {
            AppError::new("DB_DECODE_FAILED", "Unknown outage event action")
                .with_details(format!("action={action}"))
        })?;
        let snapshot: Outage = serde_json::from_str(&snapshot_json).map_err(|e| {
            AppError::new("DB_DECODE_FAILED", "Failed to decode outage snapshot")
                .with_details(e.to_string())
        })?;
        out.push(OutageEvent {
            id,
            outage_id,
            action,
            actor,
            snapshot,
            created_at,
        });
    }
    Ok(out)
}
