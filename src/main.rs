//! sqfls — the SQF language server engine.
//!
//! The binary fronts the workspace analysis engine with two commands:
//!
//! - `sqfls scan`: one-shot — index and analyze a workspace, print every
//!   published diagnostic, and exit non-zero when errors were found.
//! - `sqfls watch`: keep the workspace analyzed — run the initial scan,
//!   then follow file-system events and re-analyze what they touch.
//!
//! The editor wire protocol is a separate concern; a transport embeds
//! [`sqfls_workspace::WorkspaceEngine`] and maps requests onto its query
//! surface.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::CliArguments;
use crate::commands::SqflsCommand;
use crate::error::Error;

mod commands;
mod error;

pub fn main() -> ExitCode {
    let result = run();

    result.unwrap_or_else(|error| {
        tracing::error!("{}", error);
        tracing::trace!("Exiting with error code due to: {:#?}", error);

        ExitCode::FAILURE
    })
}

fn run() -> Result<ExitCode, Error> {
    let arguments = CliArguments::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("SQFLS_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match arguments.command {
        SqflsCommand::Scan(command) => commands::scan::execute(command),
        SqflsCommand::Watch(command) => commands::watch::execute(command),
    }
}
