use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Sleeper;
use crate::domain::{format_duration, Outage};
use crate::error::{AppError, OUTAGE_CHANGED, OUTAGE_ENDED};
use crate::repo::OutageRepository;

/// Upper bound for a single wait-loop sleep when none is configured.
pub const DEFAULT_MAX_SLEEP: i64 = 300;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshReport {
    /// True when the periodic task left a running outage alone.
    pub skipped: bool,
    /// Outage the maintenance page was rendered for, if any.
    pub static_page_outage: Option<i64>,
    /// Timestamp published to the maintenance-mode trigger, if any.
    pub autostart_at: Option<i64>,
}

/// Push the current outage schedule to the static page and the maintenance-mode trigger.
///
/// Collaborator failures are logged and do not fail the refresh; query failures do.
pub fn refresh(repo: &OutageRepository) -> Result<RefreshReport, AppError> {
    let now = repo.now();

    let next = repo.get_next_starting(now)?;
    if let Err(e) = repo.static_page().regenerate(next.as_ref()) {
        warn!(error = %e, "maintenance page regeneration failed");
    }

    let autostart = repo.get_next_autostarting(now)?;
    let published = match autostart.as_ref().and_then(|o| o.starttime) {
        Some(start) => repo.trigger().publish(repo.conn(), start),
        None => repo.trigger().clear(repo.conn()),
    };
    if let Err(e) = published {
        warn!(error = %e, "maintenance trigger update failed");
    }

    let report = RefreshReport {
        skipped: false,
        static_page_outage: next.and_then(|o| o.id),
        autostart_at: autostart.and_then(|o| o.starttime),
    };
    debug!(?report, "automation refreshed");
    Ok(report)
}

/// Periodic task body: leave a running outage alone, otherwise refresh.
pub fn tick(repo: &OutageRepository) -> Result<RefreshReport, AppError> {
    let now = repo.now();
    if let Some(ongoing) = repo.get_ongoing(now)? {
        debug!(outage_id = ?ongoing.id, "outage ongoing, nothing to refresh");
        return Ok(RefreshReport {
            skipped: true,
            ..RefreshReport::default()
        });
    }
    refresh(repo)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    Id(i64),
    Active,
}

fn emit(out: &mut dyn Write, line: &str) -> Result<(), AppError> {
    writeln!(out, "{line}").map_err(|e| {
        AppError::new("IO_WRITE_FAILED", "Failed to write progress").with_details(e.to_string())
    })
}

/// Block until the target outage starts, printing a countdown to `out`.
///
/// Each wake re-reads the outage; a stored copy that differs from the last one read fails with
/// `OUTAGE_CHANGED`, an ended outage with `OUTAGE_ENDED`. This is a check-then-act guard only.
pub fn wait_for_outage(
    repo: &OutageRepository,
    target: WaitTarget,
    max_sleep: i64,
    sleeper: &mut dyn Sleeper,
    out: &mut dyn Write,
) -> Result<Outage, AppError> {
    let max_sleep = if max_sleep > 0 {
        max_sleep
    } else {
        DEFAULT_MAX_SLEEP
    };

    let outage = match target {
        WaitTarget::Id(id) => repo.get_by_id(id)?.ok_or_else(|| {
            AppError::not_found("Outage not found").with_details(format!("id={id}"))
        })?,
        WaitTarget::Active => repo
            .get_active(repo.now())?
            .ok_or_else(|| AppError::not_found("No active outage"))?,
    };
    let id = outage
        .id
        .ok_or_else(|| AppError::invalid_argument("Outage has no id"))?;
    let start = outage
        .starttime
        .ok_or_else(|| AppError::invalid_argument("Outage has no start time"))?;

    loop {
        let now = repo.now();
        if outage.has_ended(now) {
            return Err(AppError::new(OUTAGE_ENDED, "Outage has already ended")
                .with_details(format!("id={id}")));
        }

        let remaining = start.saturating_sub(now);
        if remaining <= 0 {
            emit(out, &format!("Outage #{id} started."))?;
            info!(outage_id = id, "outage started");
            return Ok(outage);
        }

        emit(
            out,
            &format!(
                "Outage #{id} starts in {} ({remaining}s remaining).",
                format_duration(remaining)
            ),
        )?;
        sleeper.sleep(remaining.min(max_sleep))?;

        if repo.get_by_id(id)?.as_ref() != Some(&outage) {
            return Err(AppError::new(OUTAGE_CHANGED, "Outage changed while waiting")
                .with_details(format!("id={id}")));
        }
    }
}
