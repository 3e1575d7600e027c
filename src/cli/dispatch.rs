use anyhow::Result;

use super::analyze::cmd_analyze;
use super::commands::Commands;
use super::context::CliContext;
use super::detect::cmd_context;
use super::dismiss::cmd_dismiss;
use super::env::CliArgs;
use super::knowledge::cmd_knowledge;
use super::recover::cmd_recover_json;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Analyze(args) => cmd_analyze(args, ctx).await,
        Commands::Context(args) => cmd_context(args, ctx).await,
        Commands::Knowledge(args) => cmd_knowledge(args, ctx).await,
        Commands::RecoverJson(args) => cmd_recover_json(args, ctx).await,
        Commands::Dismiss(args) => cmd_dismiss(args, ctx).await,
    }
}
