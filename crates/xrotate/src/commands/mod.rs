//! Command dispatch.

pub mod config_cmd;
pub mod cron;
pub mod outbounds;
pub mod phases;

use clap::CommandFactory;

use crate::cli::{Cli, Command, CompletionsArgs, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    tracing::debug!(command = ?cmd, "dispatching command");
    match cmd {
        Command::Run => phases::run(global).await,
        Command::Cron(args) => cron::handle(args, global).await,
        Command::Scan => phases::scan(global).await,
        Command::Generate => phases::generate(global).await,
        Command::Update(args) => phases::update(args, global).await,
        Command::Outbounds => outbounds::handle(global).await,
        // Config commands don't need a panel connection
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(args) => {
            completions(&args);
            Ok(())
        }
    }
}

fn completions(args: &CompletionsArgs) {
    let mut cmd = Cli::command();
    clap_complete::generate(args.shell, &mut cmd, "xrotate", &mut std::io::stdout());
}
