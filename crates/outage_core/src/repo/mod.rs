use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{ActiveOutageCache, CacheSlot};
use crate::clock::{Clock, SystemClock};
use crate::domain::Outage;
use crate::error::AppError;
use crate::integrations::{
    CalendarSync, MaintenanceTrigger, NoopStaticPage, SettingsTrigger, SqliteCalendar,
    StaticPageRenderer,
};

pub mod queries;

pub use queries::{OutageAction, OutageEvent};

/// What `finish` did. The no-op cases are ordinary outcomes, not errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishOutcome {
    Finished,
    AlreadyEnded,
    NotOngoing,
    NotFound,
}

fn check_id(id: i64) -> Result<(), AppError> {
    if id <= 0 {
        return Err(AppError::invalid_argument("Outage id must be a positive integer")
            .with_details(format!("id={id}")));
    }
    Ok(())
}

fn check_time(time: i64) -> Result<(), AppError> {
    if time <= 0 {
        return Err(AppError::invalid_argument("Time must be a positive timestamp")
            .with_details(format!("time={time}")));
    }
    Ok(())
}

/// Persisted outages plus everything that has to follow a change to them.
///
/// Owns the connection, the collaborators and the active-outage cache. Intended to live for one
/// request, command or task tick.
pub struct OutageRepository {
    conn: Connection,
    clock: Box<dyn Clock>,
    actor: i64,
    cache: ActiveOutageCache,
    calendar: Box<dyn CalendarSync>,
    static_page: Box<dyn StaticPageRenderer>,
    trigger: Box<dyn MaintenanceTrigger>,
}

impl OutageRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            clock: Box::new(SystemClock),
            actor: 0,
            cache: ActiveOutageCache::new(),
            calendar: Box::new(SqliteCalendar),
            static_page: Box::new(NoopStaticPage),
            trigger: Box::new(SettingsTrigger),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// User id recorded as `createdby` / `modifiedby` and in audit events.
    pub fn with_actor(mut self, actor: i64) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_calendar(mut self, calendar: impl CalendarSync + 'static) -> Self {
        self.calendar = Box::new(calendar);
        self
    }

    pub fn with_static_page(mut self, static_page: impl StaticPageRenderer + 'static) -> Self {
        self.static_page = Box::new(static_page);
        self
    }

    pub fn with_trigger(mut self, trigger: impl MaintenanceTrigger + 'static) -> Self {
        self.trigger = Box::new(trigger);
        self
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn cache(&self) -> &ActiveOutageCache {
        &self.cache
    }

    pub(crate) fn static_page(&self) -> &dyn StaticPageRenderer {
        self.static_page.as_ref()
    }

    pub(crate) fn trigger(&self) -> &dyn MaintenanceTrigger {
        self.trigger.as_ref()
    }

    /// Current value of the maintenance-mode trigger.
    pub fn trigger_value(&self) -> Result<Option<i64>, AppError> {
        self.trigger.current(&self.conn)
    }

    /// Insert (no id) or update (id set) and return the id. `outage` itself is never modified.
    pub fn save(&mut self, outage: &Outage) -> Result<i64, AppError> {
        let action = if outage.id.is_some() {
            OutageAction::Updated
        } else {
            OutageAction::Created
        };
        self.write(outage, action)
    }

    fn write(&mut self, outage: &Outage, action: OutageAction) -> Result<i64, AppError> {
        let (Some(warn), Some(start), Some(stop)) =
            (outage.warntime, outage.starttime, outage.stoptime)
        else {
            return Err(AppError::invalid_argument(
                "Outage needs warntime, starttime and stoptime",
            ));
        };
        if let Some(id) = outage.id {
            check_id(id)?;
        }

        let now = self.clock.now();
        let actor = self.actor;
        let tx = self.conn.transaction().map_err(|e| {
            AppError::new("DB_TX_FAILED", "Failed to start outage transaction")
                .with_details(e.to_string())
        })?;

        let saved = match outage.id {
            None => {
                let mut record = Outage {
                    id: None,
                    autostart: Some(outage.is_autostart()),
                    createdby: Some(actor),
                    modifiedby: Some(actor),
                    lastmodified: Some(now),
                    ..outage.clone()
                };
                let id = queries::insert_outage(&tx, &record)?;
                record.id = Some(id);
                record
            }
            Some(id) => {
                let existing = queries::get_outage(&tx, id)?.ok_or_else(|| {
                    AppError::not_found("Outage not found").with_details(format!("id={id}"))
                })?;
                let record = Outage {
                    autostart: Some(outage.is_autostart()),
                    createdby: existing.createdby,
                    modifiedby: Some(actor),
                    lastmodified: Some(now),
                    ..outage.clone()
                };
                queries::update_outage(&tx, id, &record)?;
                record
            }
        };
        let id = saved.id.unwrap_or_default();
        queries::record_event(&tx, id, action, actor, &saved, now)?;

        tx.commit().map_err(|e| {
            AppError::new("DB_TX_FAILED", "Failed to commit outage transaction")
                .with_details(e.to_string())
        })?;
        self.cache.invalidate_all();
        info!(
            outage_id = id,
            action = action.as_str(),
            warntime = warn,
            starttime = start,
            stoptime = stop,
            "outage saved"
        );

        if let Err(e) = self.calendar.upsert(&self.conn, &saved) {
            warn!(outage_id = id, error = %e, "calendar sync failed");
        }
        self.refresh_automation();
        Ok(id)
    }

    /// `None` when no outage has this id.
    pub fn get_by_id(&self, id: i64) -> Result<Option<Outage>, AppError> {
        check_id(id)?;
        queries::get_outage(&self.conn, id)
    }

    pub fn delete(&mut self, id: i64) -> Result<(), AppError> {
        check_id(id)?;
        let now = self.clock.now();
        let actor = self.actor;
        let tx = self.conn.transaction().map_err(|e| {
            AppError::new("DB_TX_FAILED", "Failed to start outage transaction")
                .with_details(e.to_string())
        })?;

        let previous = queries::get_outage(&tx, id)?.ok_or_else(|| {
            AppError::not_found("Outage not found").with_details(format!("id={id}"))
        })?;
        queries::delete_outage_row(&tx, id)?;
        queries::record_event(&tx, id, OutageAction::Deleted, actor, &previous, now)?;

        tx.commit().map_err(|e| {
            AppError::new("DB_TX_FAILED", "Failed to commit outage transaction")
                .with_details(e.to_string())
        })?;
        self.cache.invalidate_all();
        info!(outage_id = id, "outage deleted");

        if let Err(e) = self.calendar.remove(&self.conn, id) {
            warn!(outage_id = id, error = %e, "calendar removal failed");
        }
        self.refresh_automation();
        Ok(())
    }

    /// All outages by start, stop, title.
    pub fn get_all(&self) -> Result<Vec<Outage>, AppError> {
        queries::list_outages(&self.conn)
    }

    pub fn get_all_unended(&self, time: i64) -> Result<Vec<Outage>, AppError> {
        check_time(time)?;
        queries::list_unended(&self.conn, time)
    }

    pub fn get_all_ended(&self, time: i64) -> Result<Vec<Outage>, AppError> {
        check_time(time)?;
        queries::list_ended(&self.conn, time)
    }

    /// Most important outage in its warning or ongoing period at `time`.
    pub fn get_active(&self, time: i64) -> Result<Option<Outage>, AppError> {
        self.resolve_cached(CacheSlot::Active, time, queries::resolve_active)
    }

    /// Most important ongoing outage at `time`.
    pub fn get_ongoing(&self, time: i64) -> Result<Option<Outage>, AppError> {
        self.resolve_cached(CacheSlot::Ongoing, time, queries::resolve_ongoing)
    }

    fn resolve_cached(
        &self,
        slot: CacheSlot,
        time: i64,
        resolve: fn(&Connection, i64) -> Result<Option<Outage>, AppError>,
    ) -> Result<Option<Outage>, AppError> {
        check_time(time)?;
        if let Some(hit) = self.cache.get(slot, time) {
            return Ok(hit);
        }
        let resolved = resolve(&self.conn, time)?;
        let until = queries::next_boundary(&self.conn, time)?;
        debug!(?slot, time, ?until, outage_id = ?resolved.as_ref().and_then(|o| o.id), "resolved outage");
        self.cache.set(slot, resolved.clone(), time, until);
        Ok(resolved)
    }

    pub fn get_next_starting(&self, time: i64) -> Result<Option<Outage>, AppError> {
        check_time(time)?;
        queries::next_starting(&self.conn, time, false)
    }

    pub fn get_next_autostarting(&self, time: i64) -> Result<Option<Outage>, AppError> {
        check_time(time)?;
        queries::next_starting(&self.conn, time, true)
    }

    /// Mark the outage finished at `time` if it is ongoing; otherwise log and do nothing.
    pub fn finish(&mut self, id: i64, time: i64) -> Result<FinishOutcome, AppError> {
        check_id(id)?;
        check_time(time)?;

        let Some(outage) = queries::get_outage(&self.conn, id)? else {
            warn!(outage_id = id, "cannot finish outage: not found");
            return Ok(FinishOutcome::NotFound);
        };
        if outage.has_ended(time) {
            warn!(outage_id = id, time, "cannot finish outage: already ended");
            return Ok(FinishOutcome::AlreadyEnded);
        }
        if !outage.is_ongoing(time) {
            warn!(outage_id = id, time, "cannot finish outage: not ongoing");
            return Ok(FinishOutcome::NotOngoing);
        }

        let finished = Outage {
            finished: Some(time),
            ..outage
        };
        self.write(&finished, OutageAction::Finished)?;
        Ok(FinishOutcome::Finished)
    }

    /// Audit trail for one outage, oldest first.
    pub fn events(&self, outage_id: i64) -> Result<Vec<OutageEvent>, AppError> {
        check_id(outage_id)?;
        queries::list_events(&self.conn, outage_id)
    }

    fn refresh_automation(&self) {
        if let Err(e) = crate::automation::refresh(self) {
            warn!(error = %e, "automation refresh failed");
        }
    }
}
