//! Watch command handler: follow the live alarm feed until Ctrl-C.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use fleetalarm_core::{
    Alarm, AlarmFilter, Liveness, NotificationSideEffects, Reconciler, ReconcilerConfig, Severity,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs, WatchFilter};
use crate::error::CliError;
use crate::output;
use crate::sinks::{BannerSink, BellSink, LogSink};

pub async fn handle(
    mut config: ReconcilerConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let defaults = crate::config::load_config().map(|c| c.defaults).unwrap_or_default();
    let color = output::should_color(global.color);

    if let Some(device) = args.device {
        config.device_id = Some(device);
    }
    if let Some(pages) = args.history_pages {
        config.initial_history_pages = pages;
    }

    let mut effects = NotificationSideEffects::new();
    if defaults.sound && !args.no_sound {
        effects = effects.with_sink(BellSink);
    }
    if defaults.notifications && !args.no_notify {
        effects = effects.with_sink(BannerSink::new(color)).with_sink(LogSink);
    }

    let filter = match args.filter {
        WatchFilter::All => AlarmFilter::All,
        WatchFilter::Live => AlarmFilter::Live,
        WatchFilter::Active => AlarmFilter::Active,
        WatchFilter::Critical => AlarmFilter::BySeverity(Severity::Critical),
    };
    let poll_interval = config.poll_interval;
    let stale_after = config.stale_after;

    let reconciler = Reconciler::new(config, effects)?;
    let mut new_alarms = reconciler.new_alarms();
    let mut events = reconciler.events();
    let mut liveness = reconciler.liveness();

    let spinner = (!global.quiet).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_message("Loading alarm history...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });
    let started = reconciler.start().await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    if let Err(e) = started {
        reconciler.shutdown().await;
        return Err(e.into());
    }

    // ── Initial snapshot ────────────────────────────────────────────
    let initial = filter.apply(&reconciler.snapshot());
    for alarm in initial.iter().rev() {
        print_alarm(alarm, global, color);
    }
    let mut printed = Printed::from_snapshot(&initial);
    if !global.quiet {
        let counts = reconciler.counts();
        eprintln!(
            "{} alarms loaded, {} unacknowledged critical. Watching for new alarms (Ctrl-C to stop)",
            counts.total, counts.unacknowledged_critical
        );
    }

    // ── Follow ──────────────────────────────────────────────────────
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            received = new_alarms.recv() => match received {
                Ok(alarm) => {
                    if filter.matches(&alarm) && printed.should_print(&alarm) {
                        print_alarm(&alarm, global, color);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "output fell behind the alarm feed");
                }
                Err(RecvError::Closed) => break,
            },
            changed = liveness.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *liveness.borrow_and_update();
                if !global.quiet {
                    eprintln!("{}", liveness_line(state, poll_interval, stale_after));
                }
            }
            event = events.recv() => match event {
                Ok(event) => debug!(?event, "reconciler event"),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    reconciler.shutdown().await;
    Ok(())
}

/// Ids shown with the initial snapshot. Alarms ingested while `start`
/// ran are in the snapshot and also queued on the new-alarm channel.
#[derive(Debug, Default)]
struct Printed(HashSet<String>);

impl Printed {
    fn from_snapshot(alarms: &[Arc<Alarm>]) -> Self {
        Self(alarms.iter().map(|a| a.id.clone()).collect())
    }

    /// Whether a followed alarm has not been shown yet.
    fn should_print(&mut self, alarm: &Alarm) -> bool {
        !self.0.remove(&alarm.id)
    }
}

fn print_alarm(alarm: &Alarm, global: &GlobalOpts, color: bool) {
    let line = match global.output {
        OutputFormat::Table => output::alarm_line(alarm, color),
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(alarm, true),
        OutputFormat::Yaml => format!("---\n{}", output::render_yaml(alarm)),
        OutputFormat::Plain => alarm.id.clone(),
    };
    output::print_output(&line, global.quiet);
}

fn liveness_line(state: Liveness, poll_interval: Duration, stale_after: Duration) -> String {
    match state {
        Liveness::Live => "● live: event stream connected".into(),
        Liveness::Connecting => "○ connecting to event stream...".into(),
        Liveness::Polling => format!(
            "◐ stream down, polling every {}",
            humantime::format_duration(poll_interval)
        ),
        Liveness::Stale => format!(
            "✗ nothing received for over {}; alarms may be missing",
            humantime::format_duration(stale_after)
        ),
    }
}
