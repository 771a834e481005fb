//! Command handlers, one module per subcommand group.

pub mod alarms;
pub mod config_cmd;
pub mod history;
pub mod watch;

use fleetalarm_core::ReconcilerConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Route a backend-facing command to its handler.
pub async fn dispatch(
    cmd: Command,
    config: ReconcilerConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(config, args, global).await,
        Command::History(args) => history::handle(config, args, global).await,
        Command::Ack(args) => alarms::acknowledge(config, args, global).await,
        Command::Resolve(args) => alarms::resolve(config, args, global).await,
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
