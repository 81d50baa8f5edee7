//! The commit coordinator.
//!
//! Merges visitor outputs with the persisted index under one transaction
//! per file: variable reconciliation, reference replacement, diagnostic
//! suppression evaluation, include-edge replacement, and hover /
//! code-action replacement. Any failure rolls the whole transaction back;
//! the orchestrator then records `VV-ERR` for the file outside of it.

use foldhash::HashMap;
use foldhash::HashMapExt;

use sqfls_database::Store;
use sqfls_database::StoreAccess;
use sqfls_database::StoreTransaction;
use sqfls_database::model::DiagnosticRecord;
use sqfls_database::model::FileIncludeRecord;
use sqfls_database::model::FileRecord;
use sqfls_database::model::HoverRecord;
use sqfls_syntax::text::iequal;

use crate::error::AnalysisError;
use crate::suppression::SuppressionContext;
use crate::visitor::VisitorOutput;

/// Everything one analysis produced, ready to be persisted.
pub struct CommitInputs<'a> {
    pub outputs: Vec<VisitorOutput>,
    /// Diagnostics raised by the analyzer itself (preprocessor and parser
    /// errors, path failures).
    pub analyzer_diagnostics: Vec<DiagnosticRecord>,
    /// Observed textual includes as (included, including) paths.
    pub includes: Vec<(String, String)>,
    /// Hovers generated outside the visitors (macro expansions).
    pub extra_hovers: Vec<HoverRecord>,
    pub suppression: &'a SuppressionContext,
}

/// Commits one file's analysis atomically.
pub fn commit_analysis(store: &mut Store, file: &FileRecord, inputs: CommitInputs<'_>) -> Result<(), AnalysisError> {
    let tx = store.transaction()?;

    match run(&tx, file, inputs) {
        Ok(()) => {
            tx.commit()?;
            Ok(())
        }
        Err(error) => {
            // Dropping the transaction rolls it back; do it explicitly so
            // the failure path reads as one.
            let _ = tx.rollback();
            Err(error)
        }
    }
}

fn run(tx: &StoreTransaction<'_>, file: &FileRecord, inputs: CommitInputs<'_>) -> Result<(), AnalysisError> {
    let CommitInputs { outputs, analyzer_diagnostics, includes, extra_hovers, suppression } = inputs;

    let scope_prefix = format!("scope@{}://", file.id);
    let db_privates = tx.variables_with_scope_prefix(&scope_prefix)?;

    // Map every visitor-local variable onto a store row, reusing existing
    // rows where scope and name match and inserting the rest.
    let mut variable_map: HashMap<(usize, i64), i64> = HashMap::new();
    let mut inserted_this_run: HashMap<(String, String), i64> = HashMap::new();
    let mut kept_private_rows: Vec<i64> = Vec::new();

    for (visitor_index, output) in outputs.iter().enumerate() {
        for variable in &output.variables {
            let key = (visitor_index, variable.id);

            if variable.scope.starts_with(&scope_prefix) {
                let row_key = (variable.scope.clone(), variable.name.to_ascii_lowercase());
                if let Some(existing) = inserted_this_run.get(&row_key) {
                    variable_map.insert(key, *existing);
                    continue;
                }

                let db_id = match db_privates
                    .iter()
                    .find(|row| row.scope == variable.scope && iequal(&row.name, &variable.name))
                {
                    Some(row) => {
                        kept_private_rows.push(row.id);
                        row.id
                    }
                    None => {
                        let mut copy = variable.clone();
                        copy.id = 0;
                        copy.file_id = Some(file.id);
                        tx.insert_variable(&copy)?
                    }
                };
                inserted_this_run.insert(row_key, db_id);
                variable_map.insert(key, db_id);
            } else {
                let db_id = match tx.variable_by_scope_and_name(&variable.scope, &variable.name)? {
                    Some(row) => row.id,
                    None => {
                        let mut copy = variable.clone();
                        copy.id = 0;
                        tx.insert_variable(&copy)?
                    }
                };
                variable_map.insert(key, db_id);
            }
        }
    }

    // Privates the file no longer declares disappear, taking their
    // references with them.
    for row in &db_privates {
        if !kept_private_rows.contains(&row.id)
            && !inserted_this_run.values().any(|inserted| *inserted == row.id)
        {
            tx.delete_variable(row.id)?;
        }
    }

    // References are replaced wholesale, in visitor emission order.
    tx.delete_references_by_source(file.id)?;
    for (visitor_index, output) in outputs.iter().enumerate() {
        for reference in &output.references {
            let Some(variable_id) = variable_map.get(&(visitor_index, reference.variable_id)) else {
                continue;
            };
            let mut copy = reference.clone();
            copy.id = 0;
            copy.variable_id = *variable_id;
            if copy.file_id == 0 {
                copy.file_id = file.id;
            }
            if copy.source_file_id == 0 {
                copy.source_file_id = file.id;
            }
            tx.insert_reference(&copy)?;
        }
    }

    // Diagnostics, with suppression evaluated against the directive list of
    // this analysis.
    tx.delete_diagnostics_by_source(file.id)?;
    let mut path_cache: HashMap<i64, String> = HashMap::new();
    let visitor_diagnostics = outputs.iter().flat_map(|output| output.diagnostics.iter());
    for diagnostic in analyzer_diagnostics.iter().chain(visitor_diagnostics) {
        let mut copy = diagnostic.clone();
        if copy.file_id == 0 {
            copy.file_id = file.id;
        }
        if copy.source_file_id == 0 {
            copy.source_file_id = file.id;
        }

        let path = match path_cache.get(&copy.file_id) {
            Some(path) => path.clone(),
            None => {
                let path =
                    tx.file_by_id(copy.file_id)?.map(|record| record.path).unwrap_or_else(|| file.path.clone());
                path_cache.insert(copy.file_id, path.clone());
                path
            }
        };
        copy.is_suppressed = !suppression.can_report(&copy.code, &path, copy.line);
        tx.insert_diagnostic(&copy)?;
    }

    // Include edges; rows naming paths the store does not know are dropped.
    tx.delete_includes_by_source(file.id)?;
    for (included, including) in &includes {
        let (Some(included_row), Some(including_row)) = (tx.file_by_path(included)?, tx.file_by_path(including)?)
        else {
            continue;
        };
        tx.insert_file_include(&FileIncludeRecord {
            id: 0,
            included_file_id: included_row.id,
            including_file_id: including_row.id,
            source_file_id: file.id,
        })?;
    }

    // Hovers.
    tx.delete_hovers_by_file(file.id)?;
    for hover in extra_hovers.iter().chain(outputs.iter().flat_map(|output| output.hovers.iter())) {
        let mut copy = hover.clone();
        copy.id = 0;
        if copy.file_id == 0 {
            copy.file_id = file.id;
        }
        tx.insert_hover(&copy)?;
    }

    // Code actions with their changes.
    tx.delete_code_actions_by_file(file.id)?;
    for output in &outputs {
        for (action, changes) in &output.code_actions {
            let mut action_copy = action.clone();
            action_copy.id = 0;
            if action_copy.file_id == 0 {
                action_copy.file_id = file.id;
            }
            let action_id = tx.insert_code_action(&action_copy)?;

            for change in changes {
                let mut change_copy = change.clone();
                change_copy.id = 0;
                change_copy.code_action_id = action_id;
                tx.insert_code_action_change(&change_copy)?;
            }
        }
    }

    tx.clear_file_outdated(file.id)?;

    // Globals live only as long as something references them.
    tx.delete_orphan_globals()?;

    Ok(())
}
