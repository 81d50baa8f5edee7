use clap::Parser;
use clap::Subcommand;

pub mod scan;
pub mod watch;

/// Top-level command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "sqfls", version, about = "Workspace analysis engine for SQF and its configuration format.")]
pub struct CliArguments {
    #[command(subcommand)]
    pub command: SqflsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SqflsCommand {
    Scan(scan::ScanCommand),
    Watch(watch::WatchCommand),
}
