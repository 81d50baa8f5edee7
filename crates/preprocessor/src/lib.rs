//! C-like preprocessor for SQF sources.
//!
//! Handles `#define` (object- and function-like, with `\` continuation),
//! `#undef`, `#include`, `#ifdef`/`#ifndef`/`#else`/`#endif`, and
//! `#pragma <name> <data>` dispatched to registered handlers. Output is the
//! expanded text together with a [`LineOrigins`] map attributing every
//! output line to the file and line it came from.
//!
//! Two observation points feed the analysis layer: every macro invocation
//! expanded into the output reports its raw start/end locations and
//! preprocessed start/end offsets (the material of the offset map), and
//! every resolved `#include` reports the included and including paths (the
//! material of the include edges).

use std::sync::Arc;

use foldhash::HashMap;
use foldhash::HashMapExt;
use foldhash::HashSet;
use foldhash::HashSetExt;

use sqfls_span::LineOrigins;
use sqfls_span::Location;

pub mod error;
pub mod macros;
pub mod mappings;
pub mod provider;

pub use error::PreprocessError;
pub use macros::MacroDefinition;
pub use mappings::PathMapping;
pub use mappings::resolve_include;
pub use provider::DiskFileProvider;
pub use provider::FileProvider;
pub use provider::MemoryFileProvider;

const MAX_INCLUDE_DEPTH: usize = 16;

/// One macro invocation expanded into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroExpansion {
    pub name: String,
    /// The file the invocation was written in.
    pub path: Arc<str>,
    /// Location of the invocation's first byte in that file's raw text.
    pub raw_start: Location,
    /// Location one past the invocation's last byte in that file's raw text.
    pub raw_end: Location,
    /// Offset of the expansion's first byte in the preprocessed output.
    pub preprocessed_start: u32,
    /// Offset one past the expansion's last byte in the preprocessed output.
    pub preprocessed_end: u32,
}

/// Context handed to a pragma handler.
#[derive(Debug)]
pub struct PragmaContext<'a> {
    /// The file the pragma was written in.
    pub path: &'a str,
    /// The 1-based line of the pragma directive.
    pub line: u32,
    /// Everything after the pragma name.
    pub data: &'a str,
}

/// Preprocessed output: the expanded text and its line attribution.
#[derive(Debug, Clone)]
pub struct PreprocessedText {
    pub text: String,
    pub origins: LineOrigins,
}

type PragmaHandler = Box<dyn FnMut(&PragmaContext<'_>)>;
type ExpansionObserver = Box<dyn FnMut(&MacroExpansion)>;
type IncludeObserver = Box<dyn FnMut(&str, &str)>;

/// The preprocessor. Built fresh per analysis by the runtime factory.
pub struct Preprocessor {
    defines: HashMap<String, MacroDefinition>,
    mappings: Vec<PathMapping>,
    provider: Arc<dyn FileProvider>,
    pragmas: HashMap<String, PragmaHandler>,
    on_expansion: Option<ExpansionObserver>,
    on_include: Option<IncludeObserver>,
}

impl Preprocessor {
    #[must_use]
    pub fn new(provider: Arc<dyn FileProvider>, mappings: Vec<PathMapping>) -> Self {
        Self {
            defines: HashMap::new(),
            mappings,
            provider,
            pragmas: HashMap::new(),
            on_expansion: None,
            on_include: None,
        }
    }

    /// Registers a handler for `#pragma <name> …` directives.
    pub fn register_pragma(&mut self, name: impl Into<String>, handler: impl FnMut(&PragmaContext<'_>) + 'static) {
        self.pragmas.insert(name.into(), Box::new(handler));
    }

    /// Registers the macro-expansion observer.
    pub fn on_macro_expansion(&mut self, observer: impl FnMut(&MacroExpansion) + 'static) {
        self.on_expansion = Some(Box::new(observer));
    }

    /// Registers the include observer, called with (included, including).
    pub fn on_file_included(&mut self, observer: impl FnMut(&str, &str) + 'static) {
        self.on_include = Some(Box::new(observer));
    }

    /// Preprocesses a file's text.
    pub fn preprocess(&mut self, text: &str, path: &str) -> Result<PreprocessedText, PreprocessError> {
        let mut output = Output { text: String::with_capacity(text.len()), origins: LineOrigins::new() };
        self.process(text, path, 0, &mut output)?;

        Ok(PreprocessedText { text: output.text, origins: output.origins })
    }

    fn process(&mut self, text: &str, path: &str, depth: usize, output: &mut Output) -> Result<(), PreprocessError> {
        let path_arc: Arc<str> = Arc::from(path);
        let lines = split_lines(text);
        let mut conditionals: Vec<Conditional> = Vec::new();
        let mut in_block_comment = false;
        let mut index = 0;

        while index < lines.len() {
            let (line_no, line_start, line) = lines[index];
            let active = conditionals.iter().all(|conditional| conditional.active);

            if in_block_comment {
                if active {
                    output.emit_line(line, Arc::clone(&path_arc), line_no);
                }
                if line.contains("*/") {
                    in_block_comment = false;
                }
                index += 1;
                continue;
            }

            let trimmed = line.trim_start();
            if trimmed.starts_with('#') && !trimmed.starts_with("##") {
                // Merge `\` continuations into one logical directive.
                let mut logical = line.trim_end_matches('\r').to_string();
                while logical.ends_with('\\') && index + 1 < lines.len() {
                    logical.pop();
                    index += 1;
                    logical.push(' ');
                    logical.push_str(lines[index].2.trim_end_matches('\r'));
                }

                self.handle_directive(&logical, path, line_no, depth, active, &mut conditionals, output)?;
                index += 1;
                continue;
            }

            if active {
                in_block_comment = self.expand_line(line, Arc::clone(&path_arc), line_no, line_start, output);
                output.finish_line(Arc::clone(&path_arc), line_no);
            }
            index += 1;
        }

        if let Some(conditional) = conditionals.first() {
            return Err(PreprocessError::UnbalancedConditional { path: path.to_string(), line: conditional.line });
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_directive(
        &mut self,
        logical: &str,
        path: &str,
        line_no: u32,
        depth: usize,
        active: bool,
        conditionals: &mut Vec<Conditional>,
        output: &mut Output,
    ) -> Result<(), PreprocessError> {
        let body = logical.trim_start().trim_start_matches('#').trim_start();
        let (directive, rest) = match body.find(char::is_whitespace) {
            Some(split) => (&body[..split], body[split..].trim_start()),
            None => (body, ""),
        };

        match directive.to_ascii_lowercase().as_str() {
            "define" if active => {
                let definition = parse_define(rest).ok_or_else(|| PreprocessError::MalformedDirective {
                    directive: "define".to_string(),
                    path: path.to_string(),
                    line: line_no,
                })?;
                self.defines.insert(definition.name.clone(), definition);
            }
            "undef" if active => {
                self.defines.remove(rest.trim());
            }
            "include" if active => {
                self.handle_include(rest, path, line_no, depth, output)?;
            }
            "ifdef" => {
                let parent_active = active;
                let name = rest.trim();
                conditionals.push(Conditional {
                    active: parent_active && self.defines.contains_key(name),
                    parent_active,
                    seen_else: false,
                    line: line_no,
                });
            }
            "ifndef" => {
                let parent_active = active;
                let name = rest.trim();
                conditionals.push(Conditional {
                    active: parent_active && !self.defines.contains_key(name),
                    parent_active,
                    seen_else: false,
                    line: line_no,
                });
            }
            "else" => {
                let Some(conditional) = conditionals.last_mut() else {
                    return Err(PreprocessError::UnbalancedConditional { path: path.to_string(), line: line_no });
                };
                if conditional.seen_else {
                    return Err(PreprocessError::UnbalancedConditional { path: path.to_string(), line: line_no });
                }
                conditional.seen_else = true;
                conditional.active = conditional.parent_active && !conditional.active;
            }
            "endif" => {
                if conditionals.pop().is_none() {
                    return Err(PreprocessError::UnbalancedConditional { path: path.to_string(), line: line_no });
                }
            }
            "pragma" if active => {
                let (name, data) = match rest.find(char::is_whitespace) {
                    Some(split) => (&rest[..split], rest[split..].trim()),
                    None => (rest, ""),
                };
                if let Some(handler) = self.pragmas.get_mut(name) {
                    handler(&PragmaContext { path, line: line_no, data });
                } else {
                    tracing::trace!("Ignoring unknown pragma `{name}` in {path}:{line_no}");
                }
            }
            "define" | "undef" | "include" | "pragma" => {}
            other => {
                tracing::warn!("Ignoring unsupported preprocessor directive `#{other}` in {path}:{line_no}");
            }
        }

        Ok(())
    }

    fn handle_include(
        &mut self,
        argument: &str,
        path: &str,
        line_no: u32,
        depth: usize,
        output: &mut Output,
    ) -> Result<(), PreprocessError> {
        let target = argument.trim().trim_matches(|byte| byte == '"' || byte == '<' || byte == '>');
        let resolved = resolve_include(target, path, &self.mappings).ok_or_else(|| {
            PreprocessError::UnresolvedInclude { include: target.to_string(), path: path.to_string(), line: line_no }
        })?;

        if depth >= MAX_INCLUDE_DEPTH {
            return Err(PreprocessError::IncludeDepthExceeded {
                include: resolved,
                path: path.to_string(),
                line: line_no,
            });
        }

        let contents = self.provider.read(&resolved).map_err(|error| PreprocessError::IncludeRead {
            include: resolved.clone(),
            path: path.to_string(),
            line: line_no,
            error,
        })?;

        if let Some(observer) = self.on_include.as_mut() {
            observer(&resolved, path);
        }

        self.process(&contents, &resolved, depth + 1, output)
    }

    /// Expands macros in one line, appending to the output. Returns whether
    /// the line opened a block comment that continues past its end.
    fn expand_line(&mut self, line: &str, path: Arc<str>, line_no: u32, line_start: u32, output: &mut Output) -> bool {
        let line = line.trim_end_matches('\r');
        let bytes = line.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            let byte = bytes[i];

            if byte == b'"' || byte == b'\'' {
                let end = macros::skip_string(line, i);
                output.text.push_str(&line[i..end]);
                i = end;
                continue;
            }

            if byte == b'/' && bytes.get(i + 1) == Some(&b'/') {
                output.text.push_str(&line[i..]);
                return false;
            }

            if byte == b'/' && bytes.get(i + 1) == Some(&b'*') {
                match line[i..].find("*/") {
                    Some(close) => {
                        output.text.push_str(&line[i..i + close + 2]);
                        i += close + 2;
                        continue;
                    }
                    None => {
                        output.text.push_str(&line[i..]);
                        return true;
                    }
                }
            }

            if byte.is_ascii_alphabetic() || byte == b'_' {
                let start = i;
                let mut end = i;
                while bytes.get(end).is_some_and(|next| next.is_ascii_alphanumeric() || *next == b'_') {
                    end += 1;
                }
                let name = &line[start..end];

                if let Some(definition) = self.defines.get(name).cloned() {
                    let invocation = match &definition.params {
                        None => Some((end, Vec::new())),
                        Some(_) => macros::parse_arguments(line, end),
                    };

                    if let Some((after, arguments)) = invocation {
                        let mut in_progress: HashSet<String> = HashSet::new();
                        let arguments: Vec<String> = arguments
                            .iter()
                            .map(|argument| macros::expand_text(argument, &self.defines, &mut in_progress))
                            .collect();

                        in_progress.insert(name.to_string());
                        let substituted = macros::substitute(&definition, &arguments);
                        let expanded = macros::expand_text(&substituted, &self.defines, &mut in_progress);

                        let preprocessed_start = output.text.len() as u32;
                        output.text.push_str(&expanded);
                        let preprocessed_end = output.text.len() as u32;

                        if let Some(observer) = self.on_expansion.as_mut() {
                            observer(&MacroExpansion {
                                name: name.to_string(),
                                path: Arc::clone(&path),
                                raw_start: Location::new(line_no, start as u32, line_start + start as u32),
                                raw_end: Location::new(line_no, after as u32, line_start + after as u32),
                                preprocessed_start,
                                preprocessed_end,
                            });
                        }

                        i = after;
                        continue;
                    }
                }

                output.text.push_str(name);
                i = end;
                continue;
            }

            output.text.push(byte as char);
            i += 1;
        }

        false
    }
}

struct Output {
    text: String,
    origins: LineOrigins,
}

impl Output {
    /// Emits a full line verbatim.
    fn emit_line(&mut self, line: &str, path: Arc<str>, line_no: u32) {
        self.text.push_str(line.trim_end_matches('\r'));
        self.finish_line(path, line_no);
    }

    /// Terminates the current output line and records its origin.
    fn finish_line(&mut self, path: Arc<str>, line_no: u32) {
        self.text.push('\n');
        self.origins.push(path, line_no);
    }
}

#[derive(Debug)]
struct Conditional {
    active: bool,
    parent_active: bool,
    seen_else: bool,
    line: u32,
}

/// Splits text into (1-based line number, byte offset of line start, line).
fn split_lines(text: &str) -> Vec<(u32, u32, &str)> {
    let mut lines = Vec::new();
    let mut start = 0usize;
    let mut line_no = 1u32;

    for (index, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            lines.push((line_no, start as u32, &text[start..index]));
            start = index + 1;
            line_no += 1;
        }
    }

    if start < text.len() {
        lines.push((line_no, start as u32, &text[start..]));
    }

    lines
}

/// Parses the remainder of a `#define` directive.
fn parse_define(rest: &str) -> Option<MacroDefinition> {
    let bytes = rest.as_bytes();
    if bytes.is_empty() || !(bytes[0].is_ascii_alphabetic() || bytes[0] == b'_') {
        return None;
    }

    let mut end = 0;
    while bytes.get(end).is_some_and(|byte| byte.is_ascii_alphanumeric() || *byte == b'_') {
        end += 1;
    }
    let name = rest[..end].to_string();

    // Function-like only when the parenthesis follows immediately.
    if bytes.get(end) == Some(&b'(') {
        let close = rest[end..].find(')')? + end;
        let params: Vec<String> = rest[end + 1..close]
            .split(',')
            .map(str::trim)
            .filter(|param| !param.is_empty())
            .map(str::to_string)
            .collect();
        let body = rest[close + 1..].trim().to_string();

        return Some(MacroDefinition { name, params: Some(params), body });
    }

    let body = rest[end..].trim().to_string();

    Some(MacroDefinition { name, params: None, body })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(Arc::new(MemoryFileProvider::new()), Vec::new())
    }

    #[test]
    fn expands_object_macro() {
        let mut preprocessor = preprocessor();
        let result = preprocessor.preprocess("#define LIMIT 10\n_x = LIMIT;\n", "a.sqf").unwrap();

        assert_eq!(result.text, "_x = 10;\n");
        // The directive line does not reach the output; line 1 of the
        // output is line 2 of the source.
        assert_eq!(result.origins.origin_of(1).unwrap().1, 2);
    }

    #[test]
    fn expands_function_macro_and_reports_offsets() {
        let events: Rc<RefCell<Vec<MacroExpansion>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);

        let mut preprocessor = preprocessor();
        preprocessor.on_macro_expansion(move |expansion| sink.borrow_mut().push(expansion.clone()));

        let text = "#define DOUBLE(x) (x + x)\n_y = DOUBLE(2);\n";
        let result = preprocessor.preprocess(text, "a.sqf").unwrap();

        assert_eq!(result.text, "_y = (2 + 2);\n");

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        let expansion = &events[0];
        assert_eq!(expansion.name, "DOUBLE");
        assert_eq!(expansion.raw_start.line, 2);
        assert_eq!(expansion.raw_start.column, 5);
        assert_eq!(expansion.preprocessed_start, 5);
        assert_eq!(expansion.preprocessed_end, 12);
        assert!(expansion.raw_end.offset > expansion.raw_start.offset);
    }

    #[test]
    fn includes_splice_lines_with_their_own_origins() {
        let mut provider = MemoryFileProvider::new();
        provider.insert("/ws/defs.hpp", "#define GREETING \"hi\"\nanswer = 42;\n");

        let edges: Rc<RefCell<Vec<(String, String)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&edges);

        let mut preprocessor = Preprocessor::new(Arc::new(provider), Vec::new());
        preprocessor.on_file_included(move |included, including| {
            sink.borrow_mut().push((included.to_string(), including.to_string()));
        });

        let text = indoc! {r#"
            #include "defs.hpp"
            _x = GREETING;
        "#};
        let result = preprocessor.preprocess(text, "/ws/init.sqf").unwrap();

        assert_eq!(result.text, "answer = 42;\n_x = \"hi\";\n");

        let (path, line) = result.origins.origin_of(1).unwrap();
        assert_eq!(path.as_ref(), "/ws/defs.hpp");
        assert_eq!(line, 2);

        let (path, line) = result.origins.origin_of(2).unwrap();
        assert_eq!(path.as_ref(), "/ws/init.sqf");
        assert_eq!(line, 2);

        assert_eq!(edges.borrow().as_slice(), &[("/ws/defs.hpp".to_string(), "/ws/init.sqf".to_string())]);
    }

    #[test]
    fn virtual_includes_resolve_through_mappings() {
        let mut provider = MemoryFileProvider::new();
        provider.insert("/ws/addons/main/defs.hpp", "value = 1;\n");

        let mappings = vec![PathMapping::new("/ws/addons/main", "\\x\\main", false)];
        let mut preprocessor = Preprocessor::new(Arc::new(provider), mappings);

        let result = preprocessor.preprocess("#include \"\\x\\main\\defs.hpp\"\n", "/ws/init.sqf").unwrap();

        assert_eq!(result.text, "value = 1;\n");
    }

    #[test]
    fn missing_include_is_an_error() {
        let mut preprocessor = preprocessor();
        let error = preprocessor.preprocess("#include \"gone.hpp\"\n", "/ws/init.sqf").unwrap_err();

        assert!(matches!(error, PreprocessError::IncludeRead { .. }));
        assert_eq!(error.line(), 1);
    }

    #[test]
    fn conditionals_select_branches() {
        let mut preprocessor = preprocessor();
        let text = indoc! {r#"
            #define FEATURE
            #ifdef FEATURE
            enabled = true;
            #else
            enabled = false;
            #endif
            #ifndef FEATURE
            ghost = 1;
            #endif
        "#};

        let result = preprocessor.preprocess(text, "a.sqf").unwrap();

        assert_eq!(result.text, "enabled = true;\n");
    }

    #[test]
    fn unbalanced_conditional_is_an_error() {
        let mut preprocessor = preprocessor();
        let error = preprocessor.preprocess("#ifdef MISSING\nx = 1;\n", "a.sqf").unwrap_err();

        assert!(matches!(error, PreprocessError::UnbalancedConditional { .. }));
    }

    #[test]
    fn pragmas_dispatch_with_file_and_line() {
        let seen: Rc<RefCell<Vec<(String, u32, String)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut preprocessor = preprocessor();
        preprocessor.register_pragma("sls", move |context| {
            sink.borrow_mut().push((context.path.to_string(), context.line, context.data.to_string()));
        });

        let text = "line;\n#pragma sls disable line VV-001\nnext;\n";
        preprocessor.preprocess(text, "a.sqf").unwrap();

        assert_eq!(seen.borrow().as_slice(), &[("a.sqf".to_string(), 2, "disable line VV-001".to_string())]);
    }

    #[test]
    fn continued_defines_merge() {
        let mut preprocessor = preprocessor();
        let text = "#define WIDE(x) x + \\\n    x\n_a = WIDE(1);\n";
        let result = preprocessor.preprocess(text, "a.sqf").unwrap();

        assert_eq!(result.text.replace(' ', ""), "_a=1+1;\n");
    }

    #[test]
    fn macros_do_not_expand_inside_strings() {
        let mut preprocessor = preprocessor();
        let text = "#define NAME bob\n_s = \"NAME\";\n";
        let result = preprocessor.preprocess(text, "a.sqf").unwrap();

        assert_eq!(result.text, "_s = \"NAME\";\n");
    }
}
