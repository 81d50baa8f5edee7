//! The scripted extension host.
//!
//! Users can extend the analysis with scripts written in the target
//! language itself. The host materializes one user-editable script per
//! phase (`start`, `enter`, `exit`, `end`, `analyze`) plus a ReadMe
//! documenting the ABI, wraps AST nodes in opaque handles that never
//! outlive the analysis, and exposes a fixed operator vocabulary. The
//! interpreter is an external seam: anything implementing [`ScriptEngine`]
//! can back the host, and script failures surface as diagnostics on the
//! file without aborting the analysis.

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use sqfls_database::model::DiagnosticRecord;
use sqfls_database::model::FileRecord;
use sqfls_database::model::Severity;
use sqfls_syntax::Node;

use crate::visitor::AnalyzerView;
use crate::visitor::Visitor;
use crate::visitor::VisitorOutput;

/// Marker file enabling the host, relative to the tooling directory.
pub const MARKER_FILE: &str = "use_scripted_analyzers";

/// An opaque handle onto an AST node. Valid only within the analysis call
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub u32);

/// Values crossing the host boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Nil,
    Boolean(bool),
    Scalar(f64),
    String(String),
    Array(Vec<ScriptValue>),
    Node(NodeHandle),
}

/// A compiled user script, identified by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledScript(pub u32);

/// A failure compiling or executing a user script.
#[derive(Debug, Clone)]
pub struct ScriptError {
    pub message: String,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScriptError {}

/// The operator vocabulary the host exposes to user scripts.
///
/// Handle-based accessors return `None` for stale or foreign handles; the
/// engine is expected to surface that as a script error.
pub trait ScriptHost {
    fn line_of(&self, handle: NodeHandle) -> Option<u32>;
    fn column_of(&self, handle: NodeHandle) -> Option<u32>;
    fn offset_of(&self, handle: NodeHandle) -> Option<u32>;
    fn content_of(&self, handle: NodeHandle) -> Option<String>;
    fn path_of(&self, handle: NodeHandle) -> Option<String>;
    fn type_of(&self, handle: NodeHandle) -> Option<String>;
    fn children_of(&mut self, handle: NodeHandle) -> Option<Vec<NodeHandle>>;
    /// The analyzed file as `(id, name, contents)`.
    fn file_of(&self, handle: NodeHandle) -> Option<(i64, String, String)>;
    /// Accepts the 9-tuple `[severity, code, content, message, line,
    /// column, offset, length, file_id]`.
    fn report_diagnostic(&mut self, tuple: &[ScriptValue]) -> Result<(), ScriptError>;
}

/// The external interpreter seam.
pub trait ScriptEngine {
    fn compile(&mut self, name: &str, source: &str) -> Result<CompiledScript, ScriptError>;

    fn call(
        &mut self,
        script: CompiledScript,
        host: &mut dyn ScriptHost,
        argument: ScriptValue,
    ) -> Result<ScriptValue, ScriptError>;
}

struct HostState {
    arena: Vec<Node>,
    reported: Vec<DiagnosticRecord>,
    file_id: i64,
    file_path: String,
    file_contents: String,
}

impl HostState {
    fn register(&mut self, node: Node) -> NodeHandle {
        self.arena.push(node);

        NodeHandle(self.arena.len() as u32 - 1)
    }

    fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.arena.get(handle.0 as usize)
    }
}

impl ScriptHost for HostState {
    fn line_of(&self, handle: NodeHandle) -> Option<u32> {
        self.node(handle).map(|node| node.token.location.line)
    }

    fn column_of(&self, handle: NodeHandle) -> Option<u32> {
        self.node(handle).map(|node| node.token.location.column)
    }

    fn offset_of(&self, handle: NodeHandle) -> Option<u32> {
        self.node(handle).map(|node| node.token.location.offset)
    }

    fn content_of(&self, handle: NodeHandle) -> Option<String> {
        self.node(handle).map(|node| node.token.contents.clone())
    }

    fn path_of(&self, handle: NodeHandle) -> Option<String> {
        self.node(handle).map(|node| node.token.path.to_string())
    }

    fn type_of(&self, handle: NodeHandle) -> Option<String> {
        self.node(handle).map(|node| node.kind.to_string())
    }

    fn children_of(&mut self, handle: NodeHandle) -> Option<Vec<NodeHandle>> {
        let children = self.node(handle)?.children.clone();

        Some(children.into_iter().map(|child| self.register(child)).collect())
    }

    fn file_of(&self, handle: NodeHandle) -> Option<(i64, String, String)> {
        self.node(handle)?;

        Some((self.file_id, self.file_path.clone(), self.file_contents.clone()))
    }

    fn report_diagnostic(&mut self, tuple: &[ScriptValue]) -> Result<(), ScriptError> {
        if tuple.len() != 9 {
            return Err(ScriptError { message: format!("reportDiagnostic expects 9 elements, got {}", tuple.len()) });
        }

        let severity = match &tuple[0] {
            ScriptValue::String(text) => Severity::from_str(text)
                .map_err(|_| ScriptError { message: format!("unknown severity `{text}`") })?,
            other => return Err(ScriptError { message: format!("severity must be a string, got {other:?}") }),
        };

        let text = |value: &ScriptValue, field: &str| -> Result<String, ScriptError> {
            match value {
                ScriptValue::String(text) => Ok(text.clone()),
                other => Err(ScriptError { message: format!("{field} must be a string, got {other:?}") }),
            }
        };
        let scalar = |value: &ScriptValue, field: &str| -> Result<i64, ScriptError> {
            match value {
                ScriptValue::Scalar(number) => Ok(*number as i64),
                other => Err(ScriptError { message: format!("{field} must be a scalar, got {other:?}") }),
            }
        };

        let file_id = scalar(&tuple[8], "file_id")?;
        self.reported.push(DiagnosticRecord {
            id: 0,
            file_id: if file_id == 0 { self.file_id } else { file_id },
            source_file_id: self.file_id,
            line: scalar(&tuple[4], "line")? as u32,
            column: scalar(&tuple[5], "column")? as u32,
            offset: scalar(&tuple[6], "offset")? as u32,
            length: scalar(&tuple[7], "length")? as u32,
            severity,
            code: text(&tuple[1], "code")?,
            content: text(&tuple[2], "content")?,
            message: text(&tuple[3], "message")?,
            is_suppressed: false,
        });

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Enter,
    Exit,
    End,
    Analyze,
}

impl Phase {
    const ALL: [Phase; 5] = [Phase::Start, Phase::Enter, Phase::Exit, Phase::End, Phase::Analyze];

    const fn file_name(self) -> &'static str {
        match self {
            Phase::Start => "start.sqf",
            Phase::Enter => "enter.sqf",
            Phase::Exit => "exit.sqf",
            Phase::End => "end.sqf",
            Phase::Analyze => "analyze.sqf",
        }
    }

    const fn template(self) -> &'static str {
        match self {
            Phase::Start => "// Runs once per analyzed file, before the tree walk starts.\n// _this: nil\n",
            Phase::Enter => "// Runs for every node on the way down.\n// _this: a node handle\n",
            Phase::Exit => "// Runs for every node on the way back up.\n// _this: a node handle\n",
            Phase::End => "// Runs after the tree walk finished.\n// _this: nil\n",
            Phase::Analyze => {
                "// Runs last. Report findings from here:\n// [\"WARNING\", \"MY-001\", _content, _message, _line, _column, _offset, _length, 0] call reportDiagnostic;\n"
            }
        }
    }
}

/// The scripted-analyzer visitor.
pub struct ScriptedVisitor {
    engine: Option<Box<dyn ScriptEngine>>,
    enabled: bool,
    slots: [Option<CompiledScript>; 5],
    state: HostState,
    failures: Vec<DiagnosticRecord>,
}

impl ScriptedVisitor {
    #[must_use]
    pub fn new(engine: Box<dyn ScriptEngine>, file: &FileRecord) -> Self {
        Self {
            engine: Some(engine),
            enabled: false,
            slots: [None; 5],
            state: HostState {
                arena: Vec::new(),
                reported: Vec::new(),
                file_id: file.id,
                file_path: file.path.clone(),
                file_contents: String::new(),
            },
            failures: Vec::new(),
        }
    }

    fn script_directory(tooling_dir: &Path) -> PathBuf {
        tooling_dir.join("scripted").join("analyzers").join("sqf")
    }

    fn materialize(&mut self, directory: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(directory)?;

        let readme = directory.join("ReadMe.md");
        if !readme.exists() {
            std::fs::write(&readme, README)?;
        }

        for phase in Phase::ALL {
            let path = directory.join(phase.file_name());
            if !path.exists() {
                std::fs::write(&path, phase.template())?;
            }
        }

        Ok(())
    }

    fn compile_slots(&mut self, directory: &Path) {
        let Some(mut engine) = self.engine.take() else {
            return;
        };

        for phase in Phase::ALL {
            let path = directory.join(phase.file_name());
            let source = match std::fs::read_to_string(&path) {
                Ok(source) => source,
                Err(error) => {
                    self.record_failure(phase, &format!("failed to read `{}`: {error}", path.display()));
                    continue;
                }
            };

            match engine.compile(phase.file_name(), &source) {
                Ok(compiled) => self.slots[phase as usize] = Some(compiled),
                Err(error) => self.record_failure(phase, &error.message),
            }
        }

        self.engine = Some(engine);
    }

    fn record_failure(&mut self, phase: Phase, message: &str) {
        self.failures.push(DiagnosticRecord {
            file_id: self.state.file_id,
            source_file_id: self.state.file_id,
            severity: Severity::Error,
            code: "VV-ERR".to_string(),
            message: format!("Scripted analyzer `{}` failed: {message}", phase.file_name()),
            content: phase.file_name().to_string(),
            ..DiagnosticRecord::default()
        });
    }

    fn call_phase(&mut self, phase: Phase, argument: ScriptValue) {
        let Some(script) = self.slots[phase as usize] else {
            return;
        };
        let Some(mut engine) = self.engine.take() else {
            return;
        };

        if let Err(error) = engine.call(script, &mut self.state, argument) {
            // One failure silences the slot so a bad script does not flood
            // every node of every file.
            self.slots[phase as usize] = None;
            self.record_failure(phase, &error.message);
        }

        self.engine = Some(engine);
    }
}

impl Visitor<Node> for ScriptedVisitor {
    fn start(&mut self, view: &AnalyzerView<'_>) {
        if !view.tooling_dir.join(MARKER_FILE).exists() {
            return;
        }

        let directory = Self::script_directory(view.tooling_dir);
        if let Err(error) = self.materialize(&directory) {
            tracing::warn!("Failed to materialize scripted analyzers under `{}`: {error}", directory.display());
            return;
        }

        self.enabled = true;
        self.state.file_contents = view.preprocessed_text.to_string();
        self.compile_slots(&directory);
        self.call_phase(Phase::Start, ScriptValue::Nil);
    }

    fn enter(&mut self, _view: &AnalyzerView<'_>, node: &Node, _parents: &[&Node]) {
        if !self.enabled || self.slots[Phase::Enter as usize].is_none() {
            return;
        }

        let handle = self.state.register(node.clone());
        self.call_phase(Phase::Enter, ScriptValue::Node(handle));
    }

    fn exit(&mut self, _view: &AnalyzerView<'_>, node: &Node, _parents: &[&Node]) {
        if !self.enabled || self.slots[Phase::Exit as usize].is_none() {
            return;
        }

        let handle = self.state.register(node.clone());
        self.call_phase(Phase::Exit, ScriptValue::Node(handle));
    }

    fn end(&mut self, _view: &AnalyzerView<'_>) {
        if self.enabled {
            self.call_phase(Phase::End, ScriptValue::Nil);
        }
    }

    fn analyze(&mut self, _view: &AnalyzerView<'_>) {
        if self.enabled {
            self.call_phase(Phase::Analyze, ScriptValue::Nil);
        }

        // Handles do not outlive the analysis that produced them.
        self.state.arena.clear();
    }

    fn take_output(&mut self) -> VisitorOutput {
        let mut diagnostics = std::mem::take(&mut self.state.reported);
        diagnostics.append(&mut self.failures);

        VisitorOutput { diagnostics, ..VisitorOutput::default() }
    }
}

const README: &str = r##"# Scripted analyzers

Scripted analyzers extend the language server with your own checks, written
in the language being analyzed. One script runs per phase of a file's
analysis:

| Script        | Runs                                          | `_this`       |
|---------------|-----------------------------------------------|---------------|
| `start.sqf`   | once, before the syntax tree is walked        | nil           |
| `enter.sqf`   | for every node on the way down                | a node handle |
| `exit.sqf`    | for every node on the way back up             | a node handle |
| `end.sqf`     | once, after the walk                          | nil           |
| `analyze.sqf` | once, last; report your findings from here    | nil           |

A failing script never aborts the analysis; the failure shows up as a
diagnostic on the file and the script is skipped for the rest of the run.

## Severities

`"FATAL"`, `"ERROR"`, `"WARNING"`, `"INFO"`, `"VERBOSE"`, `"TRACE"` — from
most to least severe. FATAL and ERROR render as errors in the editor,
WARNING as a warning, INFO as information, VERBOSE and TRACE as hints.

## Diagnostics

A diagnostic is an array of nine elements:

```sqf
[
    severity,   // string, see above
    code,       // string, your own identifier
    content,    // string, the text the diagnostic refers to
    message,    // string, what the user reads
    line,       // scalar, 1-based
    column,     // scalar, 0-based
    offset,     // scalar, byte offset
    length,     // scalar, byte length
    file_id     // scalar, 0 for the analyzed file
]
```

## Node handles

`enter.sqf` and `exit.sqf` receive an opaque handle onto the current syntax
node. Handles are only valid during the analysis that produced them; do not
store them between runs.

Node types: `STATEMENTS`, `STATEMENT`, `IDENT`, `NUMBER`, `HEXNUMBER`,
`STRING`, `BOOLEAN_TRUE`, `BOOLEAN_FALSE`, `CODE`, `ARRAY`, `ASSIGNMENT`,
`ASSIGNMENT_LOCAL`, `EXPN`, `EXP1` … `EXP9`, `EXPU`, `EXP_GROUP`,
`__TOKEN`.

## Operators

| Operator                   | Result                                     |
|----------------------------|--------------------------------------------|
| `lineOf <node>`            | 1-based line of the node                   |
| `columnOf <node>`          | 0-based column of the node                 |
| `offsetOf <node>`          | byte offset of the node                    |
| `contentOf <node>`         | the node's token text                      |
| `pathOf <node>`            | the file the node was written in           |
| `typeOf <node>`            | the node type string                       |
| `childrenOf <node>`        | array of child node handles                |
| `fileOf <node>`            | `[file_id, file_name, file_contents]`      |
| `reportDiagnostic <array>` | records a diagnostic (nine-element array)  |
"##;

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingEngine {
        compiled: Vec<String>,
        calls: std::rc::Rc<std::cell::RefCell<Vec<String>>>,
        report_on_analyze: bool,
    }

    impl ScriptEngine for RecordingEngine {
        fn compile(&mut self, name: &str, _source: &str) -> Result<CompiledScript, ScriptError> {
            self.compiled.push(name.to_string());
            Ok(CompiledScript(self.compiled.len() as u32 - 1))
        }

        fn call(
            &mut self,
            script: CompiledScript,
            host: &mut dyn ScriptHost,
            argument: ScriptValue,
        ) -> Result<ScriptValue, ScriptError> {
            let name = self.compiled[script.0 as usize].clone();
            self.calls.borrow_mut().push(name.clone());

            if let ScriptValue::Node(handle) = argument {
                // Exercise the vocabulary.
                host.type_of(handle).ok_or(ScriptError { message: "stale handle".to_string() })?;
                host.children_of(handle).ok_or(ScriptError { message: "stale handle".to_string() })?;
            }

            if self.report_on_analyze && name == "analyze.sqf" {
                host.report_diagnostic(&[
                    ScriptValue::String("WARNING".to_string()),
                    ScriptValue::String("USR-001".to_string()),
                    ScriptValue::String("content".to_string()),
                    ScriptValue::String("scripted finding".to_string()),
                    ScriptValue::Scalar(3.0),
                    ScriptValue::Scalar(0.0),
                    ScriptValue::Scalar(10.0),
                    ScriptValue::Scalar(2.0),
                    ScriptValue::Scalar(0.0),
                ])?;
            }

            Ok(ScriptValue::Nil)
        }
    }

    #[test]
    fn report_diagnostic_validates_the_tuple() {
        let mut state = HostState {
            arena: Vec::new(),
            reported: Vec::new(),
            file_id: 7,
            file_path: "a.sqf".to_string(),
            file_contents: String::new(),
        };

        let error = state.report_diagnostic(&[ScriptValue::Nil]).unwrap_err();
        assert!(error.message.contains("9 elements"));

        state
            .report_diagnostic(&[
                ScriptValue::String("INFO".to_string()),
                ScriptValue::String("USR-001".to_string()),
                ScriptValue::String("x".to_string()),
                ScriptValue::String("message".to_string()),
                ScriptValue::Scalar(1.0),
                ScriptValue::Scalar(2.0),
                ScriptValue::Scalar(3.0),
                ScriptValue::Scalar(4.0),
                ScriptValue::Scalar(0.0),
            ])
            .unwrap();

        assert_eq!(state.reported.len(), 1);
        assert_eq!(state.reported[0].file_id, 7);
        assert_eq!(state.reported[0].severity, Severity::Info);
    }

    #[test]
    fn host_runs_all_phases_and_collects_reports() {
        use sqfls_database::Store;
        use sqfls_database::StoreAccess;

        let dir = tempfile::tempdir().unwrap();
        let tooling = dir.path().to_path_buf();
        std::fs::write(tooling.join(MARKER_FILE), "").unwrap();

        let (store, _) = Store::open_in_memory().unwrap();
        let file = store.ensure_file("a.sqf", 0).unwrap();

        let calls = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let engine = RecordingEngine { compiled: Vec::new(), calls: std::rc::Rc::clone(&calls), report_on_analyze: true };

        let offsets = crate::offset_map::OffsetMap::new();
        let view = AnalyzerView::new(&file, "x = 1;\n", &offsets, &store, &tooling, 0);

        let root = sqfls_syntax::parse_script("x = 1;", "a.sqf", None).unwrap();
        let mut visitors: Vec<Box<dyn Visitor<sqfls_syntax::Node>>> =
            vec![Box::new(ScriptedVisitor::new(Box::new(engine), &file))];
        crate::visitor::drive(&root, &mut visitors, &view);

        let output = visitors[0].take_output();

        // Templates were materialized once.
        assert!(tooling.join("scripted/analyzers/sqf/ReadMe.md").exists());
        assert!(tooling.join("scripted/analyzers/sqf/analyze.sqf").exists());

        let calls = calls.borrow();
        assert!(calls.iter().any(|name| name == "start.sqf"));
        assert!(calls.iter().any(|name| name == "enter.sqf"));
        assert!(calls.iter().any(|name| name == "analyze.sqf"));

        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].code, "USR-001");
        assert_eq!(output.diagnostics[0].file_id, file.id);
    }

    #[test]
    fn missing_marker_disables_the_host() {
        use sqfls_database::Store;
        use sqfls_database::StoreAccess;

        let dir = tempfile::tempdir().unwrap();
        let (store, _) = Store::open_in_memory().unwrap();
        let file = store.ensure_file("a.sqf", 0).unwrap();

        let calls = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let engine = RecordingEngine { compiled: Vec::new(), calls: std::rc::Rc::clone(&calls), report_on_analyze: false };

        let offsets = crate::offset_map::OffsetMap::new();
        let view = AnalyzerView::new(&file, "", &offsets, &store, dir.path(), 0);

        let root = sqfls_syntax::parse_script("x = 1;", "a.sqf", None).unwrap();
        let mut visitors: Vec<Box<dyn Visitor<sqfls_syntax::Node>>> =
            vec![Box::new(ScriptedVisitor::new(Box::new(engine), &file))];
        crate::visitor::drive(&root, &mut visitors, &view);

        assert!(calls.borrow().is_empty());
        assert!(!dir.path().join("scripted").exists());
    }
}
