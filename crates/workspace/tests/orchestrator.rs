//! Orchestrator integration: real workspaces on disk, synthetic events.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use lsp_types::DiagnosticSeverity;
use lsp_types::NumberOrString;
use lsp_types::Position;
use lsp_types::PublishDiagnosticsParams;
use lsp_types::Range;
use pretty_assertions::assert_eq;

use sqfls_workspace::WorkspaceEngine;
use sqfls_workspace::WorkspaceEvent;

type Published = Arc<Mutex<Vec<PublishDiagnosticsParams>>>;

struct Fixture {
    engine: WorkspaceEngine,
    published: Published,
    root: PathBuf,
    _tempdir: tempfile::TempDir,
}

impl Fixture {
    fn new(files: &[(&str, &str)]) -> Self {
        let tempdir = tempfile::tempdir().unwrap();
        let root = tempdir.path().canonicalize().unwrap();

        for (path, text) in files {
            let full = root.join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, text).unwrap();
        }

        let published: Published = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&published);

        let mut engine = WorkspaceEngine::new(&root).unwrap();
        engine.set_publisher(move |params| sink.lock().unwrap().push(params));
        engine.initialize().unwrap();

        Self { engine, published, root, _tempdir: tempdir }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn codes_for(&self, relative: &str) -> Vec<String> {
        self.engine
            .diagnostics_for(&self.path(relative))
            .map(|params| {
                params
                    .diagnostics
                    .iter()
                    .filter_map(|diagnostic| match &diagnostic.code {
                        Some(NumberOrString::String(code)) => Some(code.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn clear_published(&self) {
        self.published.lock().unwrap().clear();
    }

    fn published_uris(&self) -> Vec<String> {
        self.published.lock().unwrap().iter().map(|params| params.uri.to_string()).collect()
    }

    fn touch(&self, relative: &str, text: &str) {
        let full = self.path(relative);
        std::fs::write(&full, text).unwrap();
        // Let the modification timestamp move past the recorded snapshot.
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(2);
        let _ = filetime_set(&full, later);
        self.engine.handle_event(WorkspaceEvent::Modified(full));
    }
}

/// Best-effort mtime bump without an extra dependency.
fn filetime_set(path: &Path, _time: std::time::SystemTime) -> std::io::Result<()> {
    // Re-writing is enough on filesystems with coarse timestamps only when
    // the clock advanced; explicitly reopening in append keeps the content.
    let contents = std::fs::read(path)?;
    std::thread::sleep(std::time::Duration::from_millis(5));
    std::fs::write(path, contents)
}

#[test]
fn initialize_bootstraps_the_tooling_directory_and_analyzes() {
    let fixture = Fixture::new(&[("scripts/init.sqf", "private _x = 1;\n")]);

    let tooling = fixture.engine.tooling_dir();
    assert!(tooling.join("sqlite3.db").exists());
    assert!(tooling.join(".gitignore").exists());
    assert!(tooling.join("ls-ignore.txt").exists());

    assert_eq!(fixture.codes_for("scripts/init.sqf"), vec!["VV-001".to_string()]);
    assert!(!fixture.published.lock().unwrap().is_empty());
}

#[test]
fn include_changes_invalidate_the_including_file() {
    let fixture = Fixture::new(&[
        ("scripts/init.sqf", "#include \"defs.hpp\"\n_x = LIMIT;\ny = _x;\n"),
        ("scripts/defs.hpp", "#define LIMIT 10\n"),
    ]);

    let hover = fixture
        .engine
        .hover(&fixture.path("scripts/init.sqf"), Position { line: 1, character: 6 })
        .expect("a macro hover");
    let lsp_types::HoverContents::Markup(content) = hover.contents else {
        panic!("expected markup hover contents");
    };
    assert!(content.value.contains("10"));

    fixture.touch("scripts/defs.hpp", "#define LIMIT 20\n");

    let hover = fixture
        .engine
        .hover(&fixture.path("scripts/init.sqf"), Position { line: 1, character: 6 })
        .expect("a refreshed macro hover");
    let lsp_types::HoverContents::Markup(content) = hover.contents else {
        panic!("expected markup hover contents");
    };
    assert!(content.value.contains("20"));
}

#[test]
fn marker_files_map_virtual_include_prefixes() {
    let fixture = Fixture::new(&[
        ("addons/main/$PBOPREFIX$", "\\x\\main\n"),
        ("addons/main/defs.hpp", "#define VALUE 5\n"),
        ("scripts/init.sqf", "#include \"\\x\\main\\defs.hpp\"\nx = VALUE;\nz = x;\n"),
    ]);

    let params = fixture.engine.diagnostics_for(&fixture.path("scripts/init.sqf")).unwrap();
    assert!(
        params.diagnostics.iter().all(|diagnostic| diagnostic.severity != Some(DiagnosticSeverity::ERROR)),
        "include through the marker mapping should resolve: {:?}",
        params.diagnostics,
    );
}

#[test]
fn references_cover_every_use_of_the_variable() {
    let fixture = Fixture::new(&[("scripts/vars.sqf", "x = 1;\ny = x;\n")]);

    let locations =
        fixture.engine.references(&fixture.path("scripts/vars.sqf"), Position { line: 0, character: 0 });

    assert_eq!(locations.len(), 2);
    assert_eq!(locations[0].range.start.line, 0);
    assert_eq!(locations[1].range.start.line, 1);
    assert_eq!(locations[1].range.start.character, 4);
}

#[test]
fn inlay_hints_show_private_types() {
    let fixture = Fixture::new(&[("scripts/vars.sqf", "x = 1;\ny = x;\nprivate _a = 2;\n")]);

    let hints = fixture.engine.inlay_hints(
        &fixture.path("scripts/vars.sqf"),
        Range { start: Position { line: 0, character: 0 }, end: Position { line: 3, character: 0 } },
    );

    assert_eq!(hints.len(), 1);
    assert_eq!(hints[0].position, Position { line: 2, character: 10 });
    match &hints[0].label {
        lsp_types::InlayHintLabel::String(label) => assert_eq!(label, ": scalar"),
        other => panic!("expected a string label, got {other:?}"),
    }
}

#[test]
fn code_actions_offer_bracket_removal() {
    let fixture = Fixture::new(&[("scripts/fix.sqf", "z = (1 + 2);\n")]);

    let actions = fixture.engine.code_actions(
        &fixture.path("scripts/fix.sqf"),
        Range { start: Position { line: 0, character: 5 }, end: Position { line: 0, character: 5 } },
    );

    assert_eq!(actions.len(), 1);
    let lsp_types::CodeActionOrCommand::CodeAction(action) = &actions[0] else {
        panic!("expected a code action");
    };
    assert_eq!(action.title, "Remove needless brackets");
    assert!(action.edit.is_some());
}

#[test]
fn document_changes_reanalyze_from_editor_content() {
    let fixture = Fixture::new(&[("scripts/doc.sqf", "x = 1;\nq = x;\n")]);

    let params = fixture.engine.diagnostics_for(&fixture.path("scripts/doc.sqf")).unwrap();
    assert!(params.diagnostics.iter().any(|diagnostic| diagnostic.message.contains("'q'")));

    fixture.engine.document_changed(&fixture.path("scripts/doc.sqf"), "x = 1;\nq = x;\nr = q;\n");

    let params = fixture.engine.diagnostics_for(&fixture.path("scripts/doc.sqf")).unwrap();
    assert!(params.diagnostics.iter().any(|diagnostic| diagnostic.message.contains("'r'")));
    assert!(!params.diagnostics.iter().any(|diagnostic| diagnostic.message.contains("'q'")));
}

#[test]
fn removing_a_file_clears_its_diagnostics() {
    let fixture = Fixture::new(&[("scripts/gone.sqf", "private _x = 1;\n")]);
    assert_eq!(fixture.codes_for("scripts/gone.sqf"), vec!["VV-001".to_string()]);

    let full = fixture.path("scripts/gone.sqf");
    std::fs::remove_file(&full).unwrap();
    fixture.clear_published();
    fixture.engine.handle_event(WorkspaceEvent::Removed(full.clone()));

    assert!(fixture.codes_for("scripts/gone.sqf").is_empty());
    let published = fixture.published.lock().unwrap();
    let cleared = published
        .iter()
        .find(|params| params.uri.to_string().ends_with("gone.sqf"))
        .expect("an empty publish for the removed file");
    assert!(cleared.diagnostics.is_empty());
}

#[test]
fn shared_globals_propagate_staleness_between_files() {
    let fixture = Fixture::new(&[
        ("a.sqf", "shared = 1;\nx = shared;\n"),
        ("b.sqf", "y = shared;\nz = y;\n"),
    ]);

    fixture.clear_published();
    fixture.touch("a.sqf", "shared = 2;\nx = shared;\n");

    let uris = fixture.published_uris();
    assert!(uris.iter().any(|uri| uri.ends_with("a.sqf")), "changed file republished: {uris:?}");
    assert!(uris.iter().any(|uri| uri.ends_with("b.sqf")), "dependent file republished: {uris:?}");
}

#[test]
fn capabilities_cover_the_advertised_surface() {
    let fixture = Fixture::new(&[("scripts/init.sqf", "x = 1;\ny = x;\n")]);
    let capabilities = fixture.engine.capabilities();

    assert!(capabilities.hover_provider.is_some());
    assert!(capabilities.references_provider.is_some());
    assert!(capabilities.inlay_hint_provider.is_some());

    let Some(lsp_types::CodeActionProviderCapability::Options(options)) = capabilities.code_action_provider
    else {
        panic!("expected code-action options");
    };
    let kinds = options.code_action_kinds.unwrap();
    assert!(kinds.contains(&lsp_types::CodeActionKind::QUICKFIX));
    assert!(kinds.contains(&lsp_types::CodeActionKind::REFACTOR_REWRITE));
}

#[test]
fn configuration_updates_replace_workspace_mappings() {
    let fixture = Fixture::new(&[
        ("lib/defs.hpp", "#define VALUE 7\n"),
        ("scripts/init.sqf", "#include \"\\lib\\defs.hpp\"\nx = VALUE;\nz = x;\n"),
    ]);

    // Unmapped virtual include: the first analysis reports an error.
    let params = fixture.engine.diagnostics_for(&fixture.path("scripts/init.sqf")).unwrap();
    assert!(params.diagnostics.iter().any(|diagnostic| diagnostic.severity == Some(DiagnosticSeverity::ERROR)));

    let lib = fixture.path("lib");
    let settings = serde_json::json!({
        "Executable": {
            "PathMappings": [
                { "physical": lib.to_string_lossy(), "virtual": "\\lib" }
            ]
        }
    });
    fixture.engine.update_configuration(&settings);

    let params = fixture.engine.diagnostics_for(&fixture.path("scripts/init.sqf")).unwrap();
    assert!(
        params.diagnostics.iter().all(|diagnostic| diagnostic.severity != Some(DiagnosticSeverity::ERROR)),
        "mapped include should resolve: {:?}",
        params.diagnostics,
    );
}
