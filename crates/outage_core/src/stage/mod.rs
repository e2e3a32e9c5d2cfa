use crate::domain::{Outage, Stage};
use crate::error::AppError;

/// Classify `outage` at `time`.
///
/// Checked in order: finished, stopped, ongoing, warning, waiting. Finished comes first because
/// an outage can be finished either before or after its planned stop time.
pub fn get_stage(outage: &Outage, time: i64) -> Result<Stage, AppError> {
    if time <= 0 {
        return Err(AppError::invalid_time("Stage time must be a positive timestamp")
            .with_details(format!("time={time}")));
    }

    let reached = |ts: Option<i64>| matches!(ts, Some(ts) if time >= ts);

    let stage = if reached(outage.finished) {
        Stage::Finished
    } else if reached(outage.stoptime) {
        Stage::Stopped
    } else if reached(outage.starttime) {
        Stage::Ongoing
    } else if reached(outage.warntime) {
        Stage::Warning
    } else {
        Stage::Waiting
    };
    Ok(stage)
}
