use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use clap::Parser;
use lsp_types::DiagnosticSeverity;
use lsp_types::NumberOrString;

use sqfls_workspace::WorkspaceEngine;

use crate::error::Error;

/// One-shot workspace analysis.
#[derive(Parser, Debug)]
#[command(name = "scan", about = "Analyze a workspace once and print all diagnostics.")]
pub struct ScanCommand {
    /// The workspace root to analyze.
    #[arg(long, short = 'w', default_value = ".")]
    pub workspace: PathBuf,

    /// Print hint-level diagnostics too.
    #[arg(long)]
    pub verbose: bool,
}

pub fn execute(command: ScanCommand) -> Result<ExitCode, Error> {
    let errors = Arc::new(AtomicUsize::new(0));
    let total = Arc::new(AtomicUsize::new(0));
    let output = Arc::new(Mutex::new(std::io::stdout()));

    let mut engine = WorkspaceEngine::new(&command.workspace)?;

    let error_counter = Arc::clone(&errors);
    let total_counter = Arc::clone(&total);
    let verbose = command.verbose;
    engine.set_publisher(move |params| {
        use std::io::Write;

        let mut output = output.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for diagnostic in &params.diagnostics {
            let severity = diagnostic.severity.unwrap_or(DiagnosticSeverity::INFORMATION);
            if severity == DiagnosticSeverity::HINT && !verbose {
                continue;
            }
            if severity == DiagnosticSeverity::ERROR {
                error_counter.fetch_add(1, Ordering::Relaxed);
            }
            total_counter.fetch_add(1, Ordering::Relaxed);

            let code = match &diagnostic.code {
                Some(NumberOrString::String(code)) => code.clone(),
                Some(NumberOrString::Number(code)) => code.to_string(),
                None => String::from("-"),
            };
            let _ = writeln!(
                output,
                "{}:{}:{}: {} [{}] {}",
                params.uri.path(),
                diagnostic.range.start.line + 1,
                diagnostic.range.start.character,
                severity_label(severity),
                code,
                diagnostic.message,
            );
        }
    });

    engine.initialize()?;

    tracing::info!(
        "Scan finished: {} diagnostic(s), {} error(s)",
        total.load(Ordering::Relaxed),
        errors.load(Ordering::Relaxed),
    );

    if errors.load(Ordering::Relaxed) > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn severity_label(severity: DiagnosticSeverity) -> &'static str {
    match severity {
        DiagnosticSeverity::ERROR => "error",
        DiagnosticSeverity::WARNING => "warning",
        DiagnosticSeverity::INFORMATION => "info",
        _ => "hint",
    }
}
