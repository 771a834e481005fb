//! Acknowledge / resolve handlers.

use fleetalarm_core::{AlarmAction, Reconciler, ReconcilerConfig};

use crate::cli::{AlarmIdArgs, GlobalOpts};
use crate::error::CliError;

pub async fn acknowledge(
    config: ReconcilerConfig,
    args: AlarmIdArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    mutate(config, args.id, AlarmAction::Acknowledge, global).await
}

pub async fn resolve(
    config: ReconcilerConfig,
    args: AlarmIdArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    mutate(config, args.id, AlarmAction::Resolve, global).await
}

async fn mutate(
    config: ReconcilerConfig,
    id: String,
    action: AlarmAction,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let target = id.clone();
    Reconciler::oneshot(config, |reconciler| async move {
        match action {
            AlarmAction::Acknowledge => reconciler.acknowledge(&target).await,
            AlarmAction::Resolve => reconciler.resolve(&target).await,
        }
    })
    .await?;

    if !global.quiet {
        let verb = match action {
            AlarmAction::Acknowledge => "acknowledged",
            AlarmAction::Resolve => "resolved",
        };
        eprintln!("✓ Alarm {id} {verb}");
    }
    Ok(())
}
