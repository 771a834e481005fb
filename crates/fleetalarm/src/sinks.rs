//! Terminal notification sinks for `watch`.

use std::io::{self, Write};

use owo_colors::OwoColorize;
use tracing::info;

use fleetalarm_core::{Alarm, NotificationSink, NotifyError, Severity};

/// Audio cue: the terminal bell.
#[derive(Debug, Default)]
pub struct BellSink;

impl NotificationSink for BellSink {
    fn name(&self) -> &'static str {
        "bell"
    }

    fn notify(&self, _alarm: &Alarm) -> Result<(), NotifyError> {
        let mut stderr = io::stderr().lock();
        stderr
            .write_all(b"\x07")
            .and_then(|()| stderr.flush())
            .map_err(|e| NotifyError::new("bell", e.to_string()))
    }
}

/// Popup for urgent alarms, drawn on stderr so it never mixes with
/// structured stdout output.
#[derive(Debug)]
pub struct BannerSink {
    floor: Severity,
    color: bool,
}

impl BannerSink {
    pub fn new(color: bool) -> Self {
        Self {
            floor: Severity::High,
            color,
        }
    }

    fn render(&self, alarm: &Alarm) -> String {
        let title = format!(
            " {} ALARM: {} on {} ",
            alarm.severity.to_string().to_uppercase(),
            alarm.alarm_type,
            alarm.device_id.as_deref().unwrap_or("unknown vehicle")
        );
        let width = title.chars().count().max(alarm.description.chars().count() + 2);
        let rule = "━".repeat(width);
        let body = format!(" {} ", alarm.description);

        if self.color && alarm.severity == Severity::Critical {
            format!("{rule}\n{}\n{body}\n{rule}", title.on_red().white().bold())
        } else if self.color {
            format!("{rule}\n{}\n{body}\n{rule}", title.red().bold())
        } else {
            format!("{rule}\n{title}\n{body}\n{rule}")
        }
    }
}

impl NotificationSink for BannerSink {
    fn name(&self) -> &'static str {
        "banner"
    }

    fn notify(&self, alarm: &Alarm) -> Result<(), NotifyError> {
        if alarm.severity < self.floor {
            return Ok(());
        }
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{}", self.render(alarm))
            .map_err(|e| NotifyError::new("banner", e.to_string()))
    }
}

/// Platform notification stand-in: one structured log event per alarm.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&self, alarm: &Alarm) -> Result<(), NotifyError> {
        info!(
            target: "fleetalarm::notify",
            alarm_id = %alarm.id,
            device_id = ?alarm.device_id,
            severity = %alarm.severity,
            source = %alarm.source,
            "{}: {}",
            alarm.alarm_type,
            alarm.description
        );
        Ok(())
    }
}
