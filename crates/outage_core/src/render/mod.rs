use tracing::error;

use crate::domain::{format_duration, format_timestamp, Outage, Stage};
use crate::repo::OutageRepository;
use crate::stage::get_stage;

/// Per-request rendering state. The warning bar is injected at most once per context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderContext {
    pub bar_injected: bool,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Waiting => "Scheduled",
        Stage::Warning => "Starting soon",
        Stage::Ongoing => "In progress",
        Stage::Stopped => "Ended",
        Stage::Finished => "Finished",
    }
}

/// Warning bar for the active outage at `time`, or `None` when there is nothing to show or the
/// bar was already injected into this context.
///
/// Resolution errors are logged and swallowed so page rendering never breaks.
pub fn render_warning_bar(
    ctx: &mut RenderContext,
    repo: &OutageRepository,
    time: i64,
) -> Option<String> {
    if ctx.bar_injected {
        return None;
    }
    let outage = match repo.get_active(time) {
        Ok(Some(outage)) => outage,
        Ok(None) => return None,
        Err(e) => {
            error!(error = %e, "failed to resolve active outage for warning bar");
            return None;
        }
    };
    let stage = match get_stage(&outage, time) {
        Ok(stage) => stage,
        Err(e) => {
            error!(error = %e, "failed to classify active outage for warning bar");
            return None;
        }
    };

    let countdown = match stage {
        Stage::Warning => outage
            .starttime
            .map(|start| format!("Starts in {}", format_duration(start.saturating_sub(time)))),
        Stage::Ongoing => outage
            .stoptime
            .map(|stop| format!("Back in {}", format_duration(stop.saturating_sub(time)))),
        _ => None,
    }
    .unwrap_or_default();

    ctx.bar_injected = true;
    Some(format!(
        "<div class=\"outage-bar outage-{}\" data-outage-id=\"{}\"><strong>{}</strong> <span class=\"outage-stage\">{}</span> <span class=\"outage-countdown\">{}</span></div>",
        stage.as_str().to_ascii_lowercase(),
        outage.id.unwrap_or_default(),
        escape_html(&outage.title()),
        stage_label(stage),
        escape_html(&countdown),
    ))
}

/// Standalone maintenance page for `outage`, served while the application itself is down.
pub fn static_page_html(outage: &Outage) -> String {
    let title = escape_html(&outage.title());
    let description = escape_html(&outage.description());
    let start = outage.starttime.map(format_timestamp).unwrap_or_default();
    let stop = outage.stoptime.map(format_timestamp).unwrap_or_default();
    let duration = outage
        .duration_planned()
        .map(format_duration)
        .unwrap_or_default();

    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n");
    out.push_str("<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{title}</title>\n"));
    out.push_str("<meta http-equiv=\"refresh\" content=\"300\">\n");
    out.push_str("</head>\n<body>\n<main class=\"maintenance\">\n");
    out.push_str(&format!("<h1>{title}</h1>\n"));
    out.push_str(&format!("<p class=\"description\">{description}</p>\n"));
    out.push_str("<dl>\n");
    out.push_str(&format!("<dt>Start</dt><dd>{start}</dd>\n"));
    out.push_str(&format!("<dt>Planned end</dt><dd>{stop}</dd>\n"));
    out.push_str(&format!("<dt>Duration</dt><dd>{duration}</dd>\n"));
    out.push_str("</dl>\n</main>\n</body>\n</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<b>\"A&B\"</b>"),
            "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn static_page_lists_window() {
        let outage = Outage {
            starttime: Some(0),
            stoptime: Some(5_400),
            title: Some("Upgrade".to_string()),
            description: Some("Back {{stop}}".to_string()),
            ..Outage::default()
        };
        let html = static_page_html(&outage);
        assert!(html.contains("<h1>Upgrade</h1>"));
        assert!(html.contains("Back 1970-01-01 01:30 UTC"));
        assert!(html.contains("<dd>1 hour 30 mins</dd>"));
    }
}
