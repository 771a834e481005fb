//! History command handler.

use tabled::Tabled;

use fleetalarm_core::{Alarm, Reconciler, ReconcilerConfig};

use crate::cli::{GlobalOpts, HistoryArgs};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub(crate) struct AlarmRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Type")]
    alarm_type: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&Alarm> for AlarmRow {
    fn from(a: &Alarm) -> Self {
        Self {
            id: a.id.clone(),
            time: a.occurred_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            severity: a.severity.to_string(),
            alarm_type: a.alarm_type.clone(),
            device: a.device_id.clone().unwrap_or_else(|| "-".into()),
            status: a.status.to_string(),
            description: a.description.clone(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    config: ReconcilerConfig,
    args: HistoryArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.page == 0 {
        return Err(CliError::Validation {
            field: "page".into(),
            reason: "pages start at 1".into(),
        });
    }
    let size = args.size.unwrap_or(config.history_page_size);
    let page = args.page;

    let alarms = Reconciler::oneshot(config, |reconciler| async move {
        reconciler.fetch_page(page, size).await
    })
    .await?;

    let out = output::render_list(global.output, &alarms, |a| AlarmRow::from(a), |a| {
        a.id.clone()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
