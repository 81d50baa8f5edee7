//! Editor-facing queries.
//!
//! Read-only lookups against the store, answering in `lsp-types` values.
//! Rows store 1-based lines; the wire protocol wants 0-based, so every
//! conversion happens here and nowhere else.

use foldhash::HashMap;
use foldhash::HashMapExt;
use lsp_types::CodeAction;
use lsp_types::CodeActionKind;
use lsp_types::CodeActionOptions;
use lsp_types::CodeActionOrCommand;
use lsp_types::CodeActionProviderCapability;
use lsp_types::CompletionOptions;
use lsp_types::CreateFile;
use lsp_types::CreateFileOptions;
use lsp_types::DeleteFile;
use lsp_types::DeleteFileOptions;
use lsp_types::Diagnostic;
use lsp_types::DiagnosticSeverity;
use lsp_types::DocumentChangeOperation;
use lsp_types::DocumentChanges;
use lsp_types::Hover;
use lsp_types::HoverContents;
use lsp_types::HoverProviderCapability;
use lsp_types::InlayHint;
use lsp_types::InlayHintKind;
use lsp_types::InlayHintLabel;
use lsp_types::InlayHintOptions;
use lsp_types::InlayHintServerCapabilities;
use lsp_types::Location;
use lsp_types::MarkupContent;
use lsp_types::MarkupKind;
use lsp_types::NumberOrString;
use lsp_types::OneOf;
use lsp_types::OptionalVersionedTextDocumentIdentifier;
use lsp_types::Position;
use lsp_types::PublishDiagnosticsParams;
use lsp_types::Range;
use lsp_types::RenameFile;
use lsp_types::RenameFileOptions;
use lsp_types::ResourceOp;
use lsp_types::SaveOptions;
use lsp_types::ServerCapabilities;
use lsp_types::TextDocumentEdit;
use lsp_types::TextDocumentSyncCapability;
use lsp_types::TextDocumentSyncKind;
use lsp_types::TextDocumentSyncOptions;
use lsp_types::TextDocumentSyncSaveOptions;
use lsp_types::TextEdit;
use lsp_types::Url;
use lsp_types::WorkspaceEdit;

use sqfls_database::Store;
use sqfls_database::StoreAccess;
use sqfls_database::model::ChangeOperation;
use sqfls_database::model::CodeActionChangeRecord;
use sqfls_database::model::CodeActionKind as StoredActionKind;
use sqfls_database::model::DiagnosticRecord;
use sqfls_database::model::FileRecord;
use sqfls_database::model::ReferenceRecord;
use sqfls_database::model::Severity;
use sqfls_database::model::TypeFlags;

/// The server capabilities the engine backs.
#[must_use]
pub fn capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(TextDocumentSyncOptions {
            open_close: Some(true),
            change: Some(TextDocumentSyncKind::FULL),
            will_save: Some(false),
            will_save_wait_until: Some(false),
            save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions { include_text: Some(true) })),
        })),
        completion_provider: Some(CompletionOptions { resolve_provider: Some(true), ..CompletionOptions::default() }),
        references_provider: Some(OneOf::Left(true)),
        code_action_provider: Some(CodeActionProviderCapability::Options(CodeActionOptions {
            code_action_kinds: Some(vec![
                CodeActionKind::QUICKFIX,
                CodeActionKind::REFACTOR,
                CodeActionKind::REFACTOR_EXTRACT,
                CodeActionKind::REFACTOR_INLINE,
                CodeActionKind::SOURCE,
                CodeActionKind::REFACTOR_REWRITE,
            ]),
            ..CodeActionOptions::default()
        })),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        inlay_hint_provider: Some(OneOf::Right(InlayHintServerCapabilities::Options(InlayHintOptions {
            resolve_provider: Some(true),
            ..InlayHintOptions::default()
        }))),
        ..ServerCapabilities::default()
    }
}

fn url_for(path: &str) -> Option<Url> {
    Url::from_file_path(path).ok()
}

fn range_of(reference: &ReferenceRecord) -> Range {
    let line = reference.line.saturating_sub(1);

    Range {
        start: Position { line, character: reference.column },
        end: Position { line, character: reference.column + reference.length },
    }
}

/// `textDocument/references`: the variables under the cursor, then every
/// reference to them anywhere in the workspace.
#[must_use]
pub fn references(store: &Store, file: &FileRecord, position: Position) -> Vec<Location> {
    let line = position.line + 1;
    let Ok(at_line) = store.references_at_line(file.id, line) else {
        return Vec::new();
    };

    let mut variable_ids: Vec<i64> = at_line
        .iter()
        .filter(|reference| {
            reference.column <= position.character && position.character <= reference.column + reference.length
        })
        .map(|reference| reference.variable_id)
        .collect();
    variable_ids.sort_unstable();
    variable_ids.dedup();

    let mut locations = Vec::new();
    for variable_id in variable_ids {
        let Ok(references) = store.references_of_variable(variable_id) else {
            continue;
        };
        for reference in references {
            if reference.is_magic {
                continue;
            }
            let Ok(Some(target)) = store.file_by_id(reference.file_id) else {
                continue;
            };
            let Some(uri) = url_for(&target.path) else {
                continue;
            };
            locations.push(Location { uri, range: range_of(&reference) });
        }
    }

    locations
}

/// `textDocument/hover`: every stored hover span containing the position,
/// concatenated.
#[must_use]
pub fn hover(store: &Store, file: &FileRecord, position: Position) -> Option<Hover> {
    let line = position.line + 1;
    let hovers = store.hovers_at(file.id, line, position.character).ok()?;
    let first = hovers.first()?;

    let range = Range {
        start: Position { line: first.start_line.saturating_sub(1), character: first.start_column },
        end: Position { line: first.end_line.saturating_sub(1), character: first.end_column },
    };
    let value = hovers.iter().map(|hover| hover.markdown.as_str()).collect::<Vec<_>>().join("\n\n");

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent { kind: MarkupKind::Markdown, value }),
        range: Some(range),
    })
}

/// `textDocument/inlayHint`: type hints after references of private
/// variables in the requested range.
#[must_use]
pub fn inlay_hints(store: &Store, file: &FileRecord, range: Range) -> Vec<InlayHint> {
    let start_line = range.start.line + 1;
    let end_line = range.end.line + 1;
    let Ok(in_range) = store.references_in_line_range(file.id, start_line, end_line) else {
        return Vec::new();
    };

    let mut by_variable: HashMap<i64, Vec<ReferenceRecord>> = HashMap::new();
    for reference in in_range {
        if reference.is_magic {
            continue;
        }
        if reference.line == start_line && reference.column < range.start.character {
            continue;
        }
        if reference.line == end_line && reference.column > range.end.character {
            continue;
        }
        by_variable.entry(reference.variable_id).or_default().push(reference);
    }

    let mut hints = Vec::new();
    for (variable_id, references) in by_variable {
        let Ok(Some(variable)) = store.variable_by_id(variable_id) else {
            continue;
        };
        // Globals carry no tracked type; only privates get hints.
        if variable.file_id.is_none() {
            continue;
        }

        let mut union = TypeFlags::NONE;
        for reference in &references {
            union |= reference.types;
        }
        if union.is_none() || union.is_any() {
            continue;
        }

        let label = format!(": {}", union.names().join(", "));
        for reference in &references {
            hints.push(InlayHint {
                position: Position {
                    line: reference.line.saturating_sub(1),
                    character: reference.column + reference.length,
                },
                label: InlayHintLabel::String(label.clone()),
                kind: Some(InlayHintKind::TYPE),
                text_edits: None,
                tooltip: None,
                padding_left: None,
                padding_right: None,
                data: None,
            });
        }
    }

    hints.sort_by_key(|hint| (hint.position.line, hint.position.character));

    hints
}

/// `textDocument/codeAction`: stored actions whose changes contain the
/// requested range, rendered as workspace edits.
#[must_use]
pub fn code_actions(store: &Store, file: &FileRecord, range: Range) -> Vec<CodeActionOrCommand> {
    let Ok(actions) = store.code_actions_by_file(file.id) else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for action in actions {
        let Ok(changes) = store.changes_of_code_action(action.id) else {
            continue;
        };

        let mut operations = Vec::new();
        let mut in_range = false;
        for change in &changes {
            in_range = in_range || change_contains(change, range);
            if let Some(operation) = operation_for(change) {
                operations.push(operation);
            }
        }

        if operations.is_empty() || !in_range {
            continue;
        }

        results.push(CodeActionOrCommand::CodeAction(CodeAction {
            title: action.title.clone(),
            kind: Some(action_kind(action.kind)),
            is_preferred: Some(true),
            edit: Some(WorkspaceEdit {
                document_changes: Some(DocumentChanges::Operations(operations)),
                ..WorkspaceEdit::default()
            }),
            ..CodeAction::default()
        }));
    }

    results
}

fn change_contains(change: &CodeActionChangeRecord, range: Range) -> bool {
    let (Some(start_line), Some(start_column), Some(end_line), Some(end_column)) =
        (change.start_line, change.start_column, change.end_line, change.end_column)
    else {
        return true;
    };

    start_line.saturating_sub(1) <= range.start.line
        && start_column <= range.start.character
        && end_line.saturating_sub(1) >= range.end.line
        && end_column >= range.end.character
}

fn change_range(change: &CodeActionChangeRecord) -> Range {
    Range {
        start: Position {
            line: change.start_line.unwrap_or(1).saturating_sub(1),
            character: change.start_column.unwrap_or(0),
        },
        end: Position {
            line: change.end_line.unwrap_or(1).saturating_sub(1),
            character: change.end_column.unwrap_or(0),
        },
    }
}

fn operation_for(change: &CodeActionChangeRecord) -> Option<DocumentChangeOperation> {
    let uri = url_for(&change.path)?;

    let operation = match change.operation {
        ChangeOperation::FileChange => DocumentChangeOperation::Edit(TextDocumentEdit {
            text_document: OptionalVersionedTextDocumentIdentifier { uri, version: None },
            edits: vec![OneOf::Left(TextEdit {
                range: change_range(change),
                new_text: change.content.clone().unwrap_or_default(),
            })],
        }),
        ChangeOperation::FileCreate => DocumentChangeOperation::Op(ResourceOp::Create(CreateFile {
            uri,
            options: Some(CreateFileOptions { overwrite: Some(true), ignore_if_exists: Some(true) }),
            annotation_id: None,
        })),
        ChangeOperation::FileDelete => DocumentChangeOperation::Op(ResourceOp::Delete(DeleteFile {
            uri,
            options: Some(DeleteFileOptions {
                recursive: Some(true),
                ignore_if_not_exists: Some(true),
                annotation_id: None,
            }),
        })),
        ChangeOperation::FileRename => DocumentChangeOperation::Op(ResourceOp::Rename(RenameFile {
            old_uri: url_for(change.old_path.as_deref().unwrap_or_default())?,
            new_uri: uri,
            options: Some(RenameFileOptions { overwrite: Some(true), ignore_if_exists: Some(true) }),
            annotation_id: None,
        })),
    };

    Some(operation)
}

fn action_kind(kind: StoredActionKind) -> CodeActionKind {
    match kind {
        StoredActionKind::QuickFix => CodeActionKind::QUICKFIX,
        StoredActionKind::Refactor => CodeActionKind::REFACTOR,
        StoredActionKind::Extract => CodeActionKind::REFACTOR_EXTRACT,
        StoredActionKind::Inline => CodeActionKind::REFACTOR_INLINE,
        StoredActionKind::Rewrite => CodeActionKind::REFACTOR_REWRITE,
        StoredActionKind::WholeFile => CodeActionKind::SOURCE,
        StoredActionKind::Generic => CodeActionKind::EMPTY,
    }
}

fn diagnostic_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Fatal | Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Info => DiagnosticSeverity::INFORMATION,
        Severity::Verbose | Severity::Trace => DiagnosticSeverity::HINT,
    }
}

fn lsp_diagnostic(record: &DiagnosticRecord) -> Diagnostic {
    let line = record.line.saturating_sub(1);

    Diagnostic {
        range: Range {
            start: Position { line, character: record.column },
            end: Position { line, character: record.column + record.length },
        },
        severity: Some(diagnostic_severity(record.severity)),
        code: if record.code.is_empty() { None } else { Some(NumberOrString::String(record.code.clone())) },
        message: record.message.clone(),
        ..Diagnostic::default()
    }
}

/// Builds the `publishDiagnostics` payload for a file, plus the ids of
/// other files this file's analysis produced diagnostics in.
#[must_use]
pub fn publish_params(store: &Store, file: &FileRecord) -> (Option<PublishDiagnosticsParams>, Vec<i64>) {
    let Some(uri) = url_for(&file.path) else {
        return (None, Vec::new());
    };

    let rows = store.diagnostics_to_publish(file.id).unwrap_or_default();
    let mut additional = Vec::new();
    let mut diagnostics = Vec::new();

    for row in &rows {
        if row.file_id != file.id {
            if !additional.contains(&row.file_id) {
                additional.push(row.file_id);
            }
            continue;
        }
        diagnostics.push(lsp_diagnostic(row));
    }

    (Some(PublishDiagnosticsParams { uri, diagnostics, version: None }), additional)
}
