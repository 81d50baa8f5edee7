use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use sqfls_workspace::WorkspaceEngine;
use sqfls_workspace::WorkspaceWatcher;

use crate::error::Error;

/// Continuous workspace analysis.
#[derive(Parser, Debug)]
#[command(name = "watch", about = "Analyze a workspace and keep it analyzed as files change.")]
pub struct WatchCommand {
    /// The workspace root to watch.
    #[arg(long, short = 'w', default_value = ".")]
    pub workspace: PathBuf,
}

pub fn execute(command: WatchCommand) -> Result<ExitCode, Error> {
    let mut engine = WorkspaceEngine::new(&command.workspace)?;

    engine.set_publisher(|params| {
        tracing::info!("{}: {} diagnostic(s)", params.uri.path(), params.diagnostics.len());
    });

    engine.initialize()?;

    let watcher = WorkspaceWatcher::watch(engine.root())?;
    tracing::info!("Initial analysis done; watching for changes (Ctrl-C to stop)");

    while let Ok(event) = watcher.receiver().recv() {
        engine.handle_event(event);
    }

    Ok(ExitCode::SUCCESS)
}
