use serde::{Deserialize, Serialize};

use crate::domain::Outage;
use crate::error::AppError;
use crate::repo::OutageRepository;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ValidationWarning {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn order_check(
    a_field: &str,
    a: Option<i64>,
    b_field: &str,
    b: Option<i64>,
    warnings: &mut Vec<ValidationWarning>,
) {
    let (Some(a), Some(b)) = (a, b) else { return };
    if a > b {
        warnings.push(
            ValidationWarning::new(
                "VALIDATION_TS_ORDER_VIOLATION",
                format!("Timestamp order violation: {a_field} must be <= {b_field}"),
            )
            .with_details(format!("{a_field}={a}; {b_field}={b}")),
        );
    }
}

/// Check an outage against the form rules: warntime <= starttime <= stoptime, all present,
/// non-empty title. The entity and the repository tolerate violations; callers decide.
pub fn validate_outage(outage: &Outage) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    for (field, value) in [
        ("warntime", outage.warntime),
        ("starttime", outage.starttime),
        ("stoptime", outage.stoptime),
    ] {
        match value {
            None => warnings.push(ValidationWarning::new(
                "VALIDATION_TS_MISSING",
                format!("{field} is required"),
            )),
            Some(v) if v <= 0 => warnings.push(
                ValidationWarning::new(
                    "VALIDATION_TS_NOT_POSITIVE",
                    format!("{field} must be a positive timestamp"),
                )
                .with_details(format!("value={v}")),
            ),
            Some(_) => {}
        }
    }

    order_check(
        "warntime",
        outage.warntime,
        "starttime",
        outage.starttime,
        &mut warnings,
    );
    order_check(
        "starttime",
        outage.starttime,
        "stoptime",
        outage.stoptime,
        &mut warnings,
    );

    if let (Some(start), Some(finished)) = (outage.starttime, outage.finished) {
        if finished < start {
            warnings.push(
                ValidationWarning::new(
                    "VALIDATION_FINISHED_BEFORE_START",
                    "Outage finished before it started",
                )
                .with_details(format!("starttime={start}; finished={finished}")),
            );
        }
    }

    if outage.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
        warnings.push(ValidationWarning::new(
            "VALIDATION_TITLE_EMPTY",
            "Title is required",
        ));
    }

    warnings
}

/// Reject an outage that fails [`validate_outage`], reporting every warning code.
pub fn ensure_valid(outage: &Outage) -> Result<(), AppError> {
    let warnings = validate_outage(outage);
    if warnings.is_empty() {
        return Ok(());
    }
    let details = warnings
        .iter()
        .map(|w| format!("{}: {}", w.code, w.message))
        .collect::<Vec<_>>()
        .join("; ");
    Err(AppError::invalid_argument("Outage failed validation").with_details(details))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutageValidationReportItem {
    pub id: i64,
    pub title: String,
    pub warnings: Vec<ValidationWarning>,
}

/// Validation warnings for every stored outage that has any, in storage order.
pub fn validate_all_outages(
    repo: &OutageRepository,
) -> Result<Vec<OutageValidationReportItem>, AppError> {
    let mut out = Vec::new();
    for outage in repo.get_all()? {
        let warnings = validate_outage(&outage);
        if warnings.is_empty() {
            continue;
        }
        out.push(OutageValidationReportItem {
            id: outage.id.unwrap_or_default(),
            title: outage.title.clone().unwrap_or_default(),
            warnings,
        });
    }
    Ok(out)
}
