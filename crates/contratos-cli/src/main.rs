//! Contratos CLI - contracts, units and service orders from the command line
//!
//! Every command works on a cached copy of the shared database and pushes it
//! back to Google Drive when it changed.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;
use contratos_core::remote::RemoteStore;
use contratos_core::sync::ConflictResolution;

use crate::cli::{Cli, Commands};
use crate::commands::common::Runtime;
use crate::commands::completions::run_completions;
use crate::commands::files::{run_attach, run_fetch_file, run_list_files, run_remove_file};
use crate::commands::hierarchy::{run_company, run_contract, run_unit};
use crate::commands::order::run_order;
use crate::commands::people::{run_employee, run_login, run_user};
use crate::commands::sync::{run_pull, run_push, run_resync, run_status};
use crate::error::CliError;

fn main() {
    if let Err(error) = run() {
        eprintln!("Error: {error}");
        std::process::exit(error.exit_code());
    }
}

fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "contratos=info"
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
    );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let mut runtime = Runtime::from_env(cli.cache_dir, &cli.context)?;
    let result = dispatch(&mut runtime, cli.command);
    let persisted = runtime.finish();
    result.and(persisted)
}

fn dispatch<S: RemoteStore>(runtime: &mut Runtime<S>, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Status => run_status(runtime)?,
        Commands::Pull => run_pull(runtime)?,
        Commands::Push => run_push(runtime)?,
        Commands::Resync { take_remote, .. } => {
            let resolution = if take_remote {
                ConflictResolution::TakeRemote
            } else {
                ConflictResolution::KeepLocal
            };
            run_resync(runtime, resolution)?;
        }
        Commands::Login { login, password } => {
            run_login(runtime, &login, &password)?;
        }
        Commands::Company { command } => run_company(runtime, command)?,
        Commands::Contract { command } => run_contract(runtime, command)?,
        Commands::Unit { command } => run_unit(runtime, command)?,
        Commands::Order { command } => run_order(runtime, command)?,
        Commands::Employee { command } => run_employee(runtime, command)?,
        Commands::User { command } => run_user(runtime, command)?,
        Commands::Attach {
            kind,
            parent,
            path,
            description,
            mime,
        } => {
            run_attach(
                runtime,
                kind.into(),
                &parent,
                &path,
                description,
                mime.as_deref(),
            )?;
        }
        Commands::Files {
            kind,
            parent,
            fetch,
            output,
            remove,
            json,
        } => match (fetch, remove) {
            (Some(id), _) => {
                run_fetch_file(runtime, kind.into(), &parent, id, output)?;
            }
            (None, Some(id)) => run_remove_file(runtime, kind.into(), &parent, id)?,
            (None, None) => run_list_files(runtime, kind.into(), &parent, json)?,
        },
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }
    Ok(())
}
