use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use purger::{DeleteOutcome, DeleteTarget, Purger};

#[derive(Parser, Debug)]
#[command(
    name = "granary",
    version,
    about = "Delete granules, providers and reconciliation reports from every catalog and object store"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delete one record from both catalogs and remove its artifacts
    Delete {
        #[command(subcommand)]
        target: TargetArg,
    },
    #[command(flatten)]
    Common(CommonCommands),
}

#[derive(Subcommand, Debug, Clone)]
enum TargetArg {
    /// Delete an unpublished granule and its files
    Granule { granule_id: String },
    /// Delete a provider no rule references
    Provider { name: String },
    /// Delete a reconciliation report and its stored body
    Report { name: String },
}

impl From<TargetArg> for DeleteTarget {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Granule { granule_id } => DeleteTarget::Granule(granule_id),
            TargetArg::Provider { name } => DeleteTarget::Provider(name),
            TargetArg::Report { name } => DeleteTarget::ReconciliationReport(name),
        }
    }
}

/// Process exit code for a delete outcome
fn exit_code(outcome: &DeleteOutcome) -> u8 {
    match outcome {
        DeleteOutcome::Deleted(_) => 0,
        DeleteOutcome::Failed(_) => 1,
        DeleteOutcome::Refused(_) => 2,
    }
}

fn report(outcome: &DeleteOutcome) {
    match outcome {
        DeleteOutcome::Deleted(summary) => {
            println!("{}", summary.message());
            for warning in summary.warnings() {
                eprintln!(
                    "warning: could not remove {}: {}",
                    warning.location, warning.error
                );
            }
        }
        DeleteOutcome::Refused(conflict) => eprintln!("{conflict}"),
        DeleteOutcome::Failed(e) => {
            eprintln!("error: {e}");
            if e.is_retryable() {
                eprintln!("the delete is safe to retry");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;

    match cli.command {
        Command::Common(command) => {
            utils::handle_common_command(&command, &config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Delete { target } => {
            let purger = Purger::from_config(&config)
                .await
                .context("Failed to connect to the configured stores")?;

            let target = DeleteTarget::from(target);
            tracing::info!(entity = %target, "Deleting");
            let outcome = purger.delete(&target).await;

            report(&outcome);
            Ok(ExitCode::from(exit_code(&outcome)))
        }
    }
}
