//! End-to-end analysis scenarios: source text in, persisted rows out.

use std::sync::Arc;

use indoc::indoc;
use pretty_assertions::assert_eq;

use sqfls_analysis::AnalyzerInputs;
use sqfls_analysis::AnalyzerRegistry;
use sqfls_analysis::RuntimeFactory;
use sqfls_database::Store;
use sqfls_database::StoreAccess;
use sqfls_database::model::Access;
use sqfls_database::model::DiagnosticRecord;
use sqfls_database::model::FileRecord;
use sqfls_database::model::Severity;
use sqfls_preprocessor::MemoryFileProvider;

struct Workbench {
    store: Store,
    factory: Arc<RuntimeFactory>,
    registry: AnalyzerRegistry,
    tooling_dir: std::path::PathBuf,
    _tempdir: tempfile::TempDir,
}

impl Workbench {
    fn new(files: &[(&str, &str)]) -> Self {
        let mut provider = MemoryFileProvider::new();
        for (path, text) in files {
            provider.insert(*path, *text);
        }

        let tempdir = tempfile::tempdir().unwrap();
        let (store, _) = Store::open_in_memory().unwrap();

        Self {
            store,
            factory: Arc::new(RuntimeFactory::new(Arc::new(provider))),
            registry: AnalyzerRegistry::with_builtin_analyzers(),
            tooling_dir: tempdir.path().to_path_buf(),
            _tempdir: tempdir,
        }
    }

    fn analyze(&mut self, path: &str, text: &str) -> FileRecord {
        let file = self.store.ensure_file(path, 0).unwrap();
        let inputs = AnalyzerInputs {
            file: file.clone(),
            text: text.to_string(),
            tooling_dir: self.tooling_dir.clone(),
            factory: Arc::clone(&self.factory),
            now: 0,
        };

        let mut analyzer = self.registry.create(inputs).expect("an analyzer for the path");
        analyzer.analyze(&self.store).unwrap();
        analyzer.commit(&mut self.store).unwrap();

        self.store.file_by_id(file.id).unwrap().unwrap()
    }

    fn diagnostics(&self, file: &FileRecord) -> Vec<DiagnosticRecord> {
        self.store.diagnostics_by_source(file.id).unwrap()
    }
}

fn analyze_script(text: &str) -> (Workbench, FileRecord) {
    let mut workbench = Workbench::new(&[("scripts/init.sqf", text)]);
    let file = workbench.analyze("scripts/init.sqf", text);

    (workbench, file)
}

fn codes_on(diagnostics: &[DiagnosticRecord], content: &str) -> Vec<String> {
    diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.content == content)
        .map(|diagnostic| diagnostic.code.clone())
        .collect()
}

#[test]
fn set_but_never_read_private_yields_001() {
    let (workbench, file) = analyze_script("private _x = 1;\n");
    let diagnostics = workbench.diagnostics(&file);

    assert_eq!(codes_on(&diagnostics, "_x"), vec!["VV-001".to_string()]);
    assert!(!diagnostics.iter().any(|diagnostic| diagnostic.code == "VV-003"));
}

#[test]
fn reads_without_assignment_yield_003() {
    let (workbench, file) = analyze_script("private _x;\n_x = _y;\n");
    let diagnostics = workbench.diagnostics(&file);

    assert!(codes_on(&diagnostics, "_x").contains(&"VV-003".to_string()));
    assert!(codes_on(&diagnostics, "_y").contains(&"VV-003".to_string()));
    // `private` over a bare identifier cannot name the variable statically.
    assert!(diagnostics.iter().any(|diagnostic| diagnostic.code == "VV-007"));
}

#[test]
fn globals_read_later_are_fine_but_write_only_ones_are_002() {
    let (workbench, file) = analyze_script("x = 1;\ny = x;\n");
    let diagnostics = workbench.diagnostics(&file);

    assert!(codes_on(&diagnostics, "x").is_empty());
    assert_eq!(codes_on(&diagnostics, "y"), vec!["VV-002".to_string()]);

    let y_diagnostic = diagnostics.iter().find(|diagnostic| diagnostic.content == "y").unwrap();
    assert_eq!(y_diagnostic.severity, Severity::Verbose);
}

#[test]
fn declared_but_never_assigned_private_yields_003() {
    let (workbench, file) = analyze_script("private [\"_a\", \"_b\"];\n_a = 1;\n");
    let diagnostics = workbench.diagnostics(&file);

    assert_eq!(codes_on(&diagnostics, "_b"), vec!["VV-003".to_string()]);
    assert!(codes_on(&diagnostics, "_a").is_empty());
}

#[test]
fn needless_brackets_yield_008_and_a_fix() {
    let (workbench, file) = analyze_script("_x = (1 + 2);\n");
    let diagnostics = workbench.diagnostics(&file);

    let brackets: Vec<_> = diagnostics.iter().filter(|diagnostic| diagnostic.code == "VV-008").collect();
    assert_eq!(brackets.len(), 2);
    assert_eq!(brackets[0].severity, Severity::Info);
    assert_eq!(brackets[1].severity, Severity::Verbose);

    let actions = workbench.store.code_actions_by_file(file.id).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].title, "Remove needless brackets");

    let changes = workbench.store.changes_of_code_action(actions[0].id).unwrap();
    assert_eq!(changes.len(), 2);
    for change in &changes {
        assert_eq!(change.content.as_deref(), Some(""));
        assert_eq!(change.start_line, change.end_line);
        assert_eq!(change.end_column, change.start_column.map(|column| column + 1));
    }
}

#[test]
fn suppression_pragma_marks_diagnostics_suppressed() {
    let (workbench, file) = analyze_script("#pragma sls disable VV-001\nprivate _x = 1;\n");
    let diagnostics = workbench.diagnostics(&file);

    let vv001 = diagnostics.iter().find(|diagnostic| diagnostic.code == "VV-001").unwrap();
    assert!(vv001.is_suppressed);

    let published = workbench.store.diagnostics_to_publish(file.id).unwrap();
    assert!(!published.iter().any(|diagnostic| diagnostic.code == "VV-001"));
}

#[test]
fn suppressed_line_only_covers_the_following_line() {
    let text = indoc! {r#"
        #pragma sls disable line VV-001
        private _x = 1;
        private _y = 2;
    "#};
    let (workbench, file) = analyze_script(text);
    let published = workbench.store.diagnostics_to_publish(file.id).unwrap();

    assert!(!published.iter().any(|diagnostic| diagnostic.content == "_x"));
    assert!(published.iter().any(|diagnostic| diagnostic.content == "_y" && diagnostic.code == "VV-001"));
}

#[test]
fn macro_expanded_brackets_report_but_do_not_fix() {
    let text = "#define WRAP(x) (x)\n_y = WRAP(1 + 2);\n";
    let (workbench, file) = analyze_script(text);
    let diagnostics = workbench.diagnostics(&file);

    assert_eq!(diagnostics.iter().filter(|diagnostic| diagnostic.code == "VV-008").count(), 2);
    assert!(workbench.store.code_actions_by_file(file.id).unwrap().is_empty());
}

#[test]
fn is_nil_with_code_block_is_not_a_type_mismatch() {
    let (workbench, file) = analyze_script("private _x = 1;\nisNil { _x };\n");
    let diagnostics = workbench.diagnostics(&file);

    assert!(!diagnostics.iter().any(|diagnostic| diagnostic.code == "VV-006"));
    // The block read the variable, so it is used.
    assert!(codes_on(&diagnostics, "_x").is_empty());
}

#[test]
fn is_nil_with_string_reads_the_variable() {
    let (workbench, file) = analyze_script("private _x = 1;\nisNil \"_x\";\n");
    let diagnostics = workbench.diagnostics(&file);

    assert!(codes_on(&diagnostics, "_x").is_empty());
}

#[test]
fn for_with_non_string_yields_006_and_no_set() {
    let (workbench, file) = analyze_script("for _i from 1 to 5 do {};\n");
    let diagnostics = workbench.diagnostics(&file);

    assert!(diagnostics.iter().any(|diagnostic| diagnostic.code == "VV-006"));

    let variable = workbench.store.variable_by_scope_and_name(&format!("scope@{}://", file.id), "_i").unwrap();
    if let Some(variable) = variable {
        let references = workbench.store.references_of_variable(variable.id).unwrap();
        assert!(references.iter().all(|reference| reference.access != Access::Set));
    }
}

#[test]
fn for_with_string_declares_the_loop_variable() {
    let (workbench, file) = analyze_script("for \"_i\" from 1 to 5 do { x = _i; };\n");
    let diagnostics = workbench.diagnostics(&file);

    assert!(!diagnostics.iter().any(|diagnostic| diagnostic.code == "VV-006"));
    assert!(codes_on(&diagnostics, "_i").is_empty());

    let variable = workbench
        .store
        .variable_by_scope_and_name(&format!("scope@{}://", file.id), "_i")
        .unwrap()
        .expect("the loop variable");
    let references = workbench.store.references_of_variable(variable.id).unwrap();
    assert!(references.iter().any(|reference| reference.access == Access::Set && reference.is_declaration));
}

#[test]
fn shadowing_declaration_yields_a_009_pair() {
    let (workbench, file) = analyze_script("private \"_x\";\n_x = 1;\ncall { private \"_x\"; _x = 2; };\n");
    let diagnostics = workbench.diagnostics(&file);

    let shadow: Vec<_> = diagnostics.iter().filter(|diagnostic| diagnostic.code == "VV-009").collect();
    assert_eq!(shadow.len(), 2);
    assert!(shadow.iter().any(|diagnostic| diagnostic.severity == Severity::Warning));
    assert!(shadow.iter().any(|diagnostic| diagnostic.severity == Severity::Verbose));
}

#[test]
fn differing_textual_form_yields_005() {
    let (workbench, file) = analyze_script("private _foo = 1;\n_Foo = 2;\n_z = _foo;\n");
    let diagnostics = workbench.diagnostics(&file);

    let name_mismatch = diagnostics.iter().find(|diagnostic| diagnostic.code == "VV-005").unwrap();
    assert_eq!(name_mismatch.content, "Expected: _foo, got: _Foo");
    assert_eq!(file.id, name_mismatch.source_file_id);
}

#[test]
fn magic_loop_variables_resolve_inside_foreach() {
    let (workbench, file) = analyze_script("{ x = _x; } forEach [1, 2, 3];\n");
    let diagnostics = workbench.diagnostics(&file);

    // `_x` is injected by the iteration operator; reading it is neither a
    // missing assignment nor a name mismatch.
    assert!(!diagnostics.iter().any(|diagnostic| diagnostic.code == "VV-003"));
    assert!(!diagnostics.iter().any(|diagnostic| diagnostic.code == "VV-005"));
}

#[test]
fn string_quoted_names_round_trip_destringified() {
    let (workbench, file) = analyze_script("private \"_value\";\n_value = 1;\n_z = _value;\n");
    let scope = format!("scope@{}://", file.id);

    let variable = workbench.store.variable_by_scope_and_name(&scope, "_value").unwrap().expect("the variable");
    assert_eq!(variable.name, "_value");

    let references = workbench.store.references_of_variable(variable.id).unwrap();
    assert_eq!(references.len(), 3);
    assert!(workbench.diagnostics(&file).iter().all(|diagnostic| diagnostic.code != "VV-005"));
}

#[test]
fn assignment_types_feed_the_reference_bitset() {
    use sqfls_database::model::TypeFlags;

    let (workbench, file) = analyze_script("private _a = 1;\nprivate _b = \"s\";\nprivate _c = { x = 1; };\n");
    let scope_prefix = format!("scope@{}://", file.id);
    let variables = workbench.store.variables_with_scope_prefix(&scope_prefix).unwrap();

    let types_of = |name: &str| {
        let variable = variables.iter().find(|variable| variable.name == name).unwrap();
        workbench.store.references_of_variable(variable.id).unwrap()[0].types
    };

    assert_eq!(types_of("_a"), TypeFlags::SCALAR);
    assert_eq!(types_of("_b"), TypeFlags::STRING);
    assert_eq!(types_of("_c"), TypeFlags::CODE);
}

#[test]
fn include_edges_survive_commit_when_both_files_are_known() {
    let main = "#include \"defs.hpp\"\nx = LIMIT;\n";
    let defs = "#define LIMIT 10\ny = 2;\n";

    let mut workbench = Workbench::new(&[("scripts/init.sqf", main), ("scripts/defs.hpp", defs)]);
    let file = workbench.analyze("scripts/init.sqf", main);

    let defs_file = workbench.store.file_by_path("scripts/defs.hpp").unwrap().expect("included file indexed");
    let includers = workbench.store.includers_of(defs_file.id).unwrap();

    assert_eq!(includers, vec![file.id]);
}

#[test]
fn macro_expansions_produce_hovers() {
    let text = "#define LIMIT 10\n_x = LIMIT;\n_y = _x;\n";
    let (workbench, file) = analyze_script(text);

    let hovers = workbench.store.hovers_by_file(file.id).unwrap();
    assert_eq!(hovers.len(), 1);
    assert!(hovers[0].markdown.contains("LIMIT"));
    assert!(hovers[0].markdown.contains("10"));
    assert_eq!(hovers[0].start_line, 2);
}

#[test]
fn preprocessor_failure_surfaces_as_a_diagnostic() {
    let (workbench, file) = analyze_script("#include \"missing.hpp\"\nx = 1;\n");
    let diagnostics = workbench.diagnostics(&file);

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Error);
    assert!(diagnostics[0].message.contains("missing.hpp"));
    assert_eq!(diagnostics[0].line, 1);
}

#[test]
fn parse_failure_surfaces_as_a_diagnostic() {
    let (workbench, file) = analyze_script("x = (1 + ;\n");
    let diagnostics = workbench.diagnostics(&file);

    assert!(!diagnostics.is_empty());
    assert!(diagnostics.iter().all(|diagnostic| diagnostic.severity == Severity::Error));
}

#[test]
fn reanalysis_is_idempotent() {
    let text = "private _x = 1;\ny = _x;\nz = (1 + 2);\n";
    let mut workbench = Workbench::new(&[("scripts/init.sqf", text)]);

    let file = workbench.analyze("scripts/init.sqf", text);
    let first_diagnostics: Vec<_> = workbench
        .diagnostics(&file)
        .into_iter()
        .map(|diagnostic| (diagnostic.code, diagnostic.line, diagnostic.column, diagnostic.content))
        .collect();
    let first_variables = workbench.store.variables_with_scope_prefix("").unwrap().len();

    let file = workbench.analyze("scripts/init.sqf", text);
    let second_diagnostics: Vec<_> = workbench
        .diagnostics(&file)
        .into_iter()
        .map(|diagnostic| (diagnostic.code, diagnostic.line, diagnostic.column, diagnostic.content))
        .collect();
    let second_variables = workbench.store.variables_with_scope_prefix("").unwrap().len();

    assert_eq!(first_diagnostics, second_diagnostics);
    assert_eq!(first_variables, second_variables);
}

#[test]
fn commit_clears_the_outdated_flag() {
    let (_, file) = analyze_script("x = 1;\ny = x;\n");

    assert!(!file.is_outdated);
}

#[test]
fn dropped_private_variables_disappear_on_reanalysis() {
    let mut workbench = Workbench::new(&[("scripts/init.sqf", "")]);

    let file = workbench.analyze("scripts/init.sqf", "private _gone = 1;\n");
    let scope_prefix = format!("scope@{}://", file.id);
    assert!(workbench
        .store
        .variables_with_scope_prefix(&scope_prefix)
        .unwrap()
        .iter()
        .any(|variable| variable.name == "_gone"));

    workbench.analyze("scripts/init.sqf", "x = 1;\ny = x;\n");
    assert!(!workbench
        .store
        .variables_with_scope_prefix(&scope_prefix)
        .unwrap()
        .iter()
        .any(|variable| variable.name == "_gone"));
}

#[test]
fn orphaned_globals_disappear_with_their_last_reference() {
    let mut workbench = Workbench::new(&[("scripts/init.sqf", "")]);

    workbench.analyze("scripts/init.sqf", "someGlobal = 1;\nx = someGlobal;\n");
    assert!(workbench
        .store
        .variable_by_scope_and_name(sqfls_database::GLOBAL_SCOPE, "someGlobal")
        .unwrap()
        .is_some());

    workbench.analyze("scripts/init.sqf", "y = 2;\nz = y;\n");
    assert!(workbench
        .store
        .variable_by_scope_and_name(sqfls_database::GLOBAL_SCOPE, "someGlobal")
        .unwrap()
        .is_none());
}

#[test]
fn config_analyzer_produces_class_hovers_and_no_variables() {
    let text = indoc! {r#"
        class CfgPatches {
            class MyMod : BaseMod {
                version = 1.5;
                units[] = {"MyUnit"};
            };
        };
    "#};
    let mut workbench = Workbench::new(&[("addons/main/config.cpp", text)]);
    let file = workbench.analyze("addons/main/config.cpp", text);

    let hovers = workbench.store.hovers_by_file(file.id).unwrap();
    assert!(hovers.iter().any(|hover| hover.markdown.contains("class CfgPatches")));
    assert!(hovers.iter().any(|hover| hover.markdown.contains("CfgPatches » MyMod")));
    assert!(hovers.iter().any(|hover| hover.markdown.contains("version = 1.5;")));

    assert!(workbench.store.variables_with_scope_prefix("scope@").unwrap().is_empty());
}

#[test]
fn exception_variable_is_injected_in_catch_blocks() {
    let (workbench, file) = analyze_script("try { x = 1; } catch { y = _exception; };\n");
    let diagnostics = workbench.diagnostics(&file);

    assert!(!diagnostics.iter().any(|diagnostic| diagnostic.code == "VV-003" && diagnostic.content == "_exception"));
}
