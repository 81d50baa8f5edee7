//! The symbol and reference visitor.
//!
//! Tracks a scope stack with detached frames, classifies names into private
//! and global variables, handles the variable-introducing and
//! variable-consuming operators, buffers assignment candidates for type
//! tagging, detects redundant parentheses, and runs the post-pass sweeps
//! that produce VV-001 through VV-005 and VV-009.

use sqfls_database::GLOBAL_SCOPE;
use sqfls_database::model::Access;
use sqfls_database::model::ChangeOperation;
use sqfls_database::model::CodeActionChangeRecord;
use sqfls_database::model::CodeActionKind;
use sqfls_database::model::CodeActionRecord;
use sqfls_database::model::DiagnosticRecord;
use sqfls_database::model::ReferenceRecord;
use sqfls_database::model::TypeFlags;
use sqfls_database::model::VariableRecord;
use sqfls_syntax::Node;
use sqfls_syntax::NodeKind;
use sqfls_syntax::text::destringify;
use sqfls_syntax::text::iequal;
use sqfls_syntax::token::Token;

use crate::script::diagnostics;
use crate::visitor::AnalyzerView;
use crate::visitor::Visitor;
use crate::visitor::VisitorOutput;

/// Operators that keep the ambient `_this` visible inside their code block.
/// A block under any other parent is a detached scope.
const ATTACHED_OPERATORS: &[&str] = &[
    "then", "else", "exitWith", "call", "while", "do", "switch", ":", "default", "isNil", "waitUntil", "try",
    "catch", "count", "forEach", "apply", "select", "findIf", "&&", "and", "||", "or",
];

#[derive(Debug)]
struct ScopeFrame {
    child_count: u32,
    name: String,
    detached: bool,
}

/// The main script visitor.
#[derive(Debug, Default)]
pub struct SymbolVisitor {
    scopes: Vec<ScopeFrame>,
    namespaces: Vec<String>,
    variables: Vec<VariableRecord>,
    references: Vec<ReferenceRecord>,
    diagnostics: Vec<DiagnosticRecord>,
    code_actions: Vec<(CodeActionRecord, Vec<CodeActionChangeRecord>)>,
    assignment_candidate: Option<ReferenceRecord>,
}

impl SymbolVisitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn current_namespace(&self) -> &str {
        self.namespaces.last().map(String::as_str).unwrap_or(GLOBAL_SCOPE)
    }

    fn make_reference(&self, view: &AnalyzerView<'_>, node: &Node) -> ReferenceRecord {
        ReferenceRecord {
            file_id: view.file_id_of(&node.token.path),
            source_file_id: view.file.id,
            line: node.token.location.line,
            column: node.token.location.column,
            offset: node.token.location.offset,
            length: node.token.contents.len() as u32,
            ..ReferenceRecord::default()
        }
    }

    /// Local variable lookup and creation.
    ///
    /// Privates resolve by walking the scope stack outward, stopping after
    /// a detached frame; a declaration always creates a fresh entry in the
    /// current frame. Globals resolve case-insensitively within the
    /// current namespace.
    fn get_or_create_variable(&mut self, view: &AnalyzerView<'_>, name: &str, is_declaration: bool) -> i64 {
        if name.starts_with('_') {
            if !is_declaration {
                for frame in self.scopes.iter().rev() {
                    if let Some(variable) =
                        self.variables.iter().find(|variable| iequal(&variable.name, name) && variable.scope == frame.name)
                    {
                        return variable.id;
                    }
                    if frame.detached {
                        break;
                    }
                }
            }

            let id = self.variables.len() as i64 + 1;
            let scope = self.scopes.last().map(|frame| frame.name.clone()).unwrap_or_else(|| view.scope_name().to_string());
            self.variables.push(VariableRecord { id, name: name.to_string(), scope, file_id: Some(view.file.id) });

            return id;
        }

        if let Some(variable) = self
            .variables
            .iter()
            .find(|variable| iequal(&variable.name, name) && variable.scope == self.current_namespace())
        {
            return variable.id;
        }

        let id = self.variables.len() as i64 + 1;
        self.variables.push(VariableRecord {
            id,
            name: name.to_string(),
            scope: self.current_namespace().to_string(),
            file_id: None,
        });

        id
    }

    fn push_set_reference(&mut self, view: &AnalyzerView<'_>, node: &Node, name: &str, declaration: bool, types: TypeFlags) {
        let variable = self.get_or_create_variable(view, name, declaration);
        let mut reference = self.make_reference(view, node);
        reference.variable_id = variable;
        reference.access = Access::Set;
        reference.is_declaration = declaration;
        reference.types = types;
        self.references.push(reference);
    }

    fn push_get_reference(&mut self, view: &AnalyzerView<'_>, node: &Node, name: &str) {
        let variable = self.get_or_create_variable(view, name, false);
        let mut reference = self.make_reference(view, node);
        reference.variable_id = variable;
        reference.access = Access::Get;
        self.references.push(reference);
    }

    fn commit_candidate(&mut self, types: TypeFlags) {
        if let Some(mut candidate) = self.assignment_candidate.take() {
            candidate.types = types;
            self.references.push(candidate);
        }
    }

    fn is_left_side_of_assignment(parents: &[&Node], node: &Node) -> bool {
        let Some(parent) = parents.last() else {
            return false;
        };

        matches!(parent.kind, NodeKind::Assignment | NodeKind::AssignmentLocal)
            && parent.children.first().is_some_and(|first| std::ptr::eq(first, node))
    }

    fn is_right_side_of_assignment(parents: &[&Node], node: &Node) -> bool {
        let Some(parent) = parents.last() else {
            return false;
        };

        matches!(parent.kind, NodeKind::Assignment | NodeKind::AssignmentLocal)
            && !parent.children.first().is_some_and(|first| std::ptr::eq(first, node))
    }

    fn is_detached_scope(parents: &[&Node]) -> bool {
        let Some(parent) = parents.last() else {
            return false;
        };
        if !parent.kind.is_operator_expression() {
            return true;
        }

        !ATTACHED_OPERATORS.iter().any(|operator| iequal(&parent.token.contents, operator))
    }

    fn push_scope(&mut self, view: &AnalyzerView<'_>, node: &Node, parents: &[&Node]) {
        let detached = Self::is_detached_scope(parents);

        let name = match self.scopes.last_mut() {
            Some(parent) => {
                let name = if parent.name.ends_with("://") {
                    format!("{}{}", parent.name, parent.child_count)
                } else {
                    format!("{}/{}", parent.name, parent.child_count)
                };
                parent.child_count += 1;
                name
            }
            None => view.scope_name().to_string(),
        };

        self.scopes.push(ScopeFrame { child_count: 0, name, detached });

        if detached {
            let variable = self.get_or_create_variable(view, "_this", true);
            let mut reference = self.make_reference(view, node);
            reference.variable_id = variable;
            reference.access = Access::Set;
            reference.is_declaration = true;
            reference.is_magic = true;
            self.references.push(reference);
        }
    }

    fn add_magic_variables(&mut self, view: &AnalyzerView<'_>, node: &Node, parents: &[&Node]) {
        let Some(parent) = parents.last() else {
            return;
        };
        if !parent.kind.is_operator_expression() {
            return;
        }

        let names: &[&str] = if iequal(&parent.token.contents, "apply")
            || iequal(&parent.token.contents, "select")
            || iequal(&parent.token.contents, "count")
            || iequal(&parent.token.contents, "findIf")
        {
            &["_x"]
        } else if iequal(&parent.token.contents, "catch") {
            &["_exception"]
        } else if iequal(&parent.token.contents, "forEach") {
            &["_x", "_y", "_forEachIndex"]
        } else {
            return;
        };

        for name in names {
            let variable = self.get_or_create_variable(view, name, true);
            let mut reference = self.make_reference(view, node);
            reference.variable_id = variable;
            reference.access = Access::Set;
            reference.is_declaration = true;
            reference.is_magic = true;
            self.references.push(reference);
        }
    }

    // Operator-specific handling. The variable name appears as a string
    // literal or inside a structured literal; anything else is VV-006, and
    // an identifier whose text cannot be statically known is VV-007.

    fn handle_private(&mut self, view: &AnalyzerView<'_>, node: &Node) {
        let Some(argument) = node.children.first() else {
            return;
        };

        let mut names: Vec<&Node> = Vec::new();
        match argument.kind {
            NodeKind::String => names.push(argument),
            NodeKind::Array => {
                for child in &argument.children {
                    match child.kind {
                        NodeKind::String => names.push(child),
                        NodeKind::Ident => self.diagnostics.push(diagnostics::name_not_statically_known_007(
                            view.file.id,
                            view.file_id_of(&node.token.path),
                            child,
                            &[NodeKind::String],
                        )),
                        _ => self.diagnostics.push(diagnostics::type_mismatch_006(
                            view.file.id,
                            view.file_id_of(&node.token.path),
                            child,
                            &[NodeKind::String],
                        )),
                    }
                }
            }
            NodeKind::Ident => self.diagnostics.push(diagnostics::name_not_statically_known_007(
                view.file.id,
                view.file_id_of(&node.token.path),
                argument,
                &[NodeKind::String, NodeKind::Array],
            )),
            _ => self.diagnostics.push(diagnostics::type_mismatch_006(
                view.file.id,
                view.file_id_of(&node.token.path),
                argument,
                &[NodeKind::String, NodeKind::Array],
            )),
        }

        for name_node in names {
            let name = destringify(&name_node.token.contents);
            let variable = self.get_or_create_variable(view, &name, true);
            let mut reference = self.make_reference(view, name_node);
            reference.variable_id = variable;
            reference.access = Access::Set;
            reference.is_declaration = true;
            reference.types = TypeFlags::NIL;
            self.references.push(reference);
        }
    }

    fn handle_params(&mut self, view: &AnalyzerView<'_>, node: &Node) {
        let Some(argument) = node.children.last() else {
            return;
        };

        let mut names: Vec<&Node> = Vec::new();
        match argument.kind {
            NodeKind::Array => {
                for child in &argument.children {
                    match child.kind {
                        NodeKind::String => names.push(child),
                        NodeKind::Array => match child.children.first() {
                            Some(first) if first.kind == NodeKind::String => names.push(first),
                            Some(first) if first.kind == NodeKind::Ident => {
                                self.diagnostics.push(diagnostics::name_not_statically_known_007(
                                    view.file.id,
                                    view.file_id_of(&node.token.path),
                                    first,
                                    &[NodeKind::String],
                                ));
                            }
                            Some(first) => self.diagnostics.push(diagnostics::type_mismatch_006(
                                view.file.id,
                                view.file_id_of(&node.token.path),
                                first,
                                &[NodeKind::String],
                            )),
                            None => {}
                        },
                        NodeKind::Ident => self.diagnostics.push(diagnostics::name_not_statically_known_007(
                            view.file.id,
                            view.file_id_of(&node.token.path),
                            child,
                            &[NodeKind::String, NodeKind::Array],
                        )),
                        _ => self.diagnostics.push(diagnostics::type_mismatch_006(
                            view.file.id,
                            view.file_id_of(&node.token.path),
                            child,
                            &[NodeKind::String, NodeKind::Array],
                        )),
                    }
                }
            }
            NodeKind::Ident => self.diagnostics.push(diagnostics::name_not_statically_known_007(
                view.file.id,
                view.file_id_of(&node.token.path),
                argument,
                &[NodeKind::Array],
            )),
            _ => self.diagnostics.push(diagnostics::type_mismatch_006(
                view.file.id,
                view.file_id_of(&node.token.path),
                argument,
                &[NodeKind::Array],
            )),
        }

        for name_node in names {
            let name = destringify(&name_node.token.contents);
            self.push_set_reference(view, name_node, &name, false, TypeFlags::NONE);
        }
    }

    fn handle_get_variable(&mut self, view: &AnalyzerView<'_>, node: &Node) {
        let Some(argument) = node.children.last() else {
            return;
        };

        let name_node = match argument.kind {
            NodeKind::String => Some(argument),
            NodeKind::Array => match argument.children.first() {
                Some(first) if first.kind == NodeKind::String => Some(first),
                Some(first) if first.kind == NodeKind::Ident => {
                    self.diagnostics.push(diagnostics::name_not_statically_known_007(
                        view.file.id,
                        view.file_id_of(&node.token.path),
                        first,
                        &[NodeKind::String],
                    ));
                    None
                }
                Some(first) => {
                    self.diagnostics.push(diagnostics::type_mismatch_006(
                        view.file.id,
                        view.file_id_of(&node.token.path),
                        first,
                        &[NodeKind::String],
                    ));
                    None
                }
                None => None,
            },
            NodeKind::Ident => {
                self.diagnostics.push(diagnostics::name_not_statically_known_007(
                    view.file.id,
                    view.file_id_of(&node.token.path),
                    argument,
                    &[NodeKind::String, NodeKind::Array],
                ));
                None
            }
            _ => {
                self.diagnostics.push(diagnostics::type_mismatch_006(
                    view.file.id,
                    view.file_id_of(&node.token.path),
                    argument,
                    &[NodeKind::String, NodeKind::Array],
                ));
                None
            }
        };

        if let Some(name_node) = name_node {
            let name = destringify(&name_node.token.contents);
            self.push_get_reference(view, name_node, &name);
        }
    }

    fn handle_set_variable(&mut self, view: &AnalyzerView<'_>, node: &Node) {
        let Some(argument) = node.children.last() else {
            return;
        };

        let name_node = match argument.kind {
            NodeKind::Array => match argument.children.first() {
                Some(first) if first.kind == NodeKind::String => Some(first),
                Some(first) if first.kind == NodeKind::Ident => {
                    self.diagnostics.push(diagnostics::name_not_statically_known_007(
                        view.file.id,
                        view.file_id_of(&node.token.path),
                        first,
                        &[NodeKind::String],
                    ));
                    None
                }
                Some(first) => {
                    self.diagnostics.push(diagnostics::type_mismatch_006(
                        view.file.id,
                        view.file_id_of(&node.token.path),
                        first,
                        &[NodeKind::String],
                    ));
                    None
                }
                None => None,
            },
            NodeKind::Ident => {
                self.diagnostics.push(diagnostics::name_not_statically_known_007(
                    view.file.id,
                    view.file_id_of(&node.token.path),
                    argument,
                    &[NodeKind::String, NodeKind::Array],
                ));
                None
            }
            _ => {
                self.diagnostics.push(diagnostics::type_mismatch_006(
                    view.file.id,
                    view.file_id_of(&node.token.path),
                    argument,
                    &[NodeKind::Array],
                ));
                None
            }
        };

        if let Some(name_node) = name_node {
            let name = destringify(&name_node.token.contents);
            self.push_set_reference(view, name_node, &name, false, TypeFlags::NONE);
        }
    }

    fn handle_is_nil(&mut self, view: &AnalyzerView<'_>, node: &Node) {
        let Some(argument) = node.children.last() else {
            return;
        };

        match argument.kind {
            NodeKind::String => {
                let name = destringify(&argument.token.contents);
                self.push_get_reference(view, argument, &name);
            }
            // A code argument is analyzed as a normal code child.
            NodeKind::Code => {}
            NodeKind::Ident => self.diagnostics.push(diagnostics::name_not_statically_known_007(
                view.file.id,
                view.file_id_of(&node.token.path),
                argument,
                &[NodeKind::String, NodeKind::Code],
            )),
            _ => self.diagnostics.push(diagnostics::type_mismatch_006(
                view.file.id,
                view.file_id_of(&node.token.path),
                argument,
                &[NodeKind::String, NodeKind::Code],
            )),
        }
    }

    fn handle_for(&mut self, view: &AnalyzerView<'_>, node: &Node) {
        let Some(argument) = node.children.first() else {
            return;
        };

        if argument.kind != NodeKind::String {
            self.diagnostics.push(diagnostics::type_mismatch_006(
                view.file.id,
                view.file_id_of(&node.token.path),
                argument,
                &[NodeKind::String],
            ));
            return;
        }

        let name = destringify(&argument.token.contents);
        self.push_set_reference(view, argument, &name, true, TypeFlags::NONE);
    }

    /// Redundant-parentheses detection on a node whose direct parent is a
    /// group expression.
    fn handle_needless_parentheses(&mut self, view: &AnalyzerView<'_>, node: &Node, parents: &[&Node]) {
        if parents.len() < 2 {
            return;
        }
        let group = parents[parents.len() - 1];
        if group.kind != NodeKind::GroupExp {
            return;
        }
        let outer = parents[parents.len() - 2];

        let redundant = if outer.kind == NodeKind::GroupExp {
            true
        } else if outer.kind.is_operator_expression() {
            node.kind.precedence_class() > outer.kind.precedence_class()
        } else {
            // The surrounding context imposes no binding of its own, so the
            // grouping cannot change meaning.
            true
        };

        if !redundant {
            return;
        }

        let Some(closer) = group.children.last() else {
            return;
        };
        let left = &group.token;
        let right = &closer.token;
        let file_id = view.file_id_of(&left.path);

        self.diagnostics.push(diagnostics::needless_brackets_008(view.file.id, file_id, left, true));
        self.diagnostics.push(diagnostics::needless_brackets_008(view.file.id, file_id, right, false));

        if view.is_in_macro(left.location.offset) || view.is_in_macro(right.location.offset) {
            return;
        }

        let action = CodeActionRecord {
            file_id: view.file.id,
            kind: CodeActionKind::Generic,
            identifier: "VV-008".to_string(),
            title: "Remove needless brackets".to_string(),
            ..CodeActionRecord::default()
        };
        let changes = vec![self.bracket_deletion(view, left), self.bracket_deletion(view, right)];
        self.code_actions.push((action, changes));
    }

    fn bracket_deletion(&self, view: &AnalyzerView<'_>, bracket: &Token) -> CodeActionChangeRecord {
        let (line, column) = match view.decode_offset(bracket.location.offset) {
            Some(decoded) => (decoded.raw.line, decoded.raw.column),
            None => (bracket.location.line, bracket.location.column),
        };

        CodeActionChangeRecord {
            operation: ChangeOperation::FileChange,
            path: view.file.path.clone(),
            start_line: Some(line),
            start_column: Some(column),
            end_line: Some(line),
            end_column: Some(column + 1),
            content: Some(String::new()),
            ..CodeActionChangeRecord::default()
        }
    }

    fn variable_of(&self, reference: &ReferenceRecord) -> Option<&VariableRecord> {
        self.variables.iter().find(|variable| variable.id == reference.variable_id)
    }

    fn is_private(variable: &VariableRecord) -> bool {
        variable.name.starts_with('_')
    }

    fn scope_is_ancestor(ancestor: &str, descendant: &str) -> bool {
        ancestor == descendant
            || (ancestor.ends_with("://") && descendant.starts_with(ancestor))
            || descendant.starts_with(&format!("{ancestor}/"))
    }
}

impl Visitor<Node> for SymbolVisitor {
    fn start(&mut self, view: &AnalyzerView<'_>) {
        self.scopes.push(ScopeFrame { child_count: 0, name: view.scope_name().to_string(), detached: false });
        self.namespaces.push(GLOBAL_SCOPE.to_string());

        for name in ["_this", "_fnc_scriptName"] {
            let variable = self.get_or_create_variable(view, name, false);
            self.references.push(ReferenceRecord {
                file_id: view.file.id,
                source_file_id: view.file.id,
                variable_id: variable,
                access: Access::Set,
                is_magic: true,
                ..ReferenceRecord::default()
            });
        }
    }

    fn enter(&mut self, view: &AnalyzerView<'_>, node: &Node, parents: &[&Node]) {
        match node.kind {
            NodeKind::Code => {
                self.handle_needless_parentheses(view, node, parents);
                if self.assignment_candidate.is_some() && Self::is_right_side_of_assignment(parents, node) {
                    self.commit_candidate(TypeFlags::CODE);
                }
                self.push_scope(view, node, parents);
                self.add_magic_variables(view, node, parents);
            }
            NodeKind::UnaryExp
            | NodeKind::BinaryExp1
            | NodeKind::BinaryExp2
            | NodeKind::BinaryExp3
            | NodeKind::BinaryExp4
            | NodeKind::BinaryExp5
            | NodeKind::BinaryExp6
            | NodeKind::BinaryExp7
            | NodeKind::BinaryExp8
            | NodeKind::BinaryExp9 => {
                self.handle_needless_parentheses(view, node, parents);
                let contents = node.token.contents.as_str();
                if iequal(contents, "private") {
                    self.handle_private(view, node);
                } else if iequal(contents, "params") {
                    self.handle_params(view, node);
                } else if iequal(contents, "getVariable") {
                    self.handle_get_variable(view, node);
                } else if iequal(contents, "setVariable") {
                    self.handle_set_variable(view, node);
                } else if iequal(contents, "isNil") {
                    self.handle_is_nil(view, node);
                } else if iequal(contents, "for") {
                    self.handle_for(view, node);
                }
            }
            NodeKind::NullarExp => {
                self.handle_needless_parentheses(view, node, parents);
                if self.assignment_candidate.is_some()
                    && iequal(&node.token.contents, "nil")
                    && Self::is_right_side_of_assignment(parents, node)
                {
                    self.commit_candidate(TypeFlags::NIL);
                }
            }
            NodeKind::BooleanTrue | NodeKind::BooleanFalse => {
                self.handle_needless_parentheses(view, node, parents);
                if self.assignment_candidate.is_some() && Self::is_right_side_of_assignment(parents, node) {
                    self.commit_candidate(TypeFlags::BOOLEAN);
                }
            }
            NodeKind::Array => {
                self.handle_needless_parentheses(view, node, parents);
                if self.assignment_candidate.is_some() && Self::is_right_side_of_assignment(parents, node) {
                    self.commit_candidate(TypeFlags::ARRAY);
                }
            }
            NodeKind::Number | NodeKind::HexNumber => {
                self.handle_needless_parentheses(view, node, parents);
                if self.assignment_candidate.is_some() && Self::is_right_side_of_assignment(parents, node) {
                    self.commit_candidate(TypeFlags::SCALAR);
                }
            }
            NodeKind::String => {
                self.handle_needless_parentheses(view, node, parents);
                if self.assignment_candidate.is_some() && Self::is_right_side_of_assignment(parents, node) {
                    self.commit_candidate(TypeFlags::STRING);
                }
            }
            NodeKind::Ident => {
                self.handle_needless_parentheses(view, node, parents);
                if self.assignment_candidate.is_some() {
                    // An identifier's value type is not statically known.
                    self.commit_candidate(TypeFlags::ANY);
                }

                let is_declaration = Self::is_left_side_of_assignment(parents, node)
                    && parents.last().is_some_and(|parent| parent.kind == NodeKind::AssignmentLocal);
                let variable = self.get_or_create_variable(view, &node.token.contents, is_declaration);
                let mut reference = self.make_reference(view, node);
                reference.variable_id = variable;

                if Self::is_left_side_of_assignment(parents, node) {
                    reference.access = Access::Set;
                    reference.is_declaration = is_declaration;
                    self.assignment_candidate = Some(reference);
                } else {
                    reference.access = Access::Get;
                    self.references.push(reference);
                }
            }
            _ => {}
        }
    }

    fn exit(&mut self, _view: &AnalyzerView<'_>, node: &Node, _parents: &[&Node]) {
        match node.kind {
            NodeKind::Code => {
                self.scopes.pop();
            }
            NodeKind::Assignment | NodeKind::AssignmentLocal => {
                self.commit_candidate(TypeFlags::ANY);
            }
            _ => {}
        }
    }

    fn end(&mut self, _view: &AnalyzerView<'_>) {
        self.scopes.pop();
        self.namespaces.pop();
    }

    fn analyze(&mut self, view: &AnalyzerView<'_>) {
        let source_file_id = view.file.id;
        let mut sweep: Vec<DiagnosticRecord> = Vec::new();

        // Set but never read afterwards. Nil-typed sets are declarations
        // and intentional, and a set preceded by such a declaration is the
        // initialization of a deliberately declared variable.
        for variable in &self.variables {
            for (index, reference) in self.references.iter().enumerate() {
                if reference.variable_id != variable.id || reference.access != Access::Set || reference.is_magic {
                    continue;
                }
                if reference.types == TypeFlags::NIL {
                    continue;
                }
                let declared_earlier = self.references[..index].iter().any(|earlier| {
                    earlier.variable_id == variable.id && earlier.is_declaration && earlier.types == TypeFlags::NIL
                });
                if declared_earlier {
                    continue;
                }

                let next = self.references[index + 1..].iter().find(|next| next.variable_id == variable.id);
                if next.is_none_or(|next| next.access != Access::Get) {
                    if Self::is_private(variable) {
                        sweep.push(diagnostics::private_never_used_001(source_file_id, variable, reference));
                    } else {
                        sweep.push(diagnostics::global_never_used_in_file_002(source_file_id, variable, reference));
                    }
                }
            }
        }

        // Read without a preceding set.
        for variable in &self.variables {
            for (index, reference) in self.references.iter().enumerate() {
                if reference.variable_id != variable.id || reference.access != Access::Get || reference.is_magic {
                    continue;
                }

                let previously_set = self.references[..index]
                    .iter()
                    .any(|earlier| earlier.variable_id == variable.id && earlier.access == Access::Set);
                if !previously_set {
                    if Self::is_private(variable) {
                        sweep.push(diagnostics::private_never_assigned_003(source_file_id, variable, reference));
                    } else {
                        sweep.push(diagnostics::global_never_assigned_in_file_004(source_file_id, variable, reference));
                    }
                }
            }
        }

        // Declared but never given a value and never read.
        for variable in &self.variables {
            if !Self::is_private(variable) {
                continue;
            }

            let mut visible: Vec<&ReferenceRecord> =
                self.references.iter().filter(|reference| reference.variable_id == variable.id && !reference.is_magic).collect();
            if visible.is_empty() {
                continue;
            }
            if visible
                .iter()
                .all(|reference| reference.access == Access::Set && reference.is_declaration && reference.types == TypeFlags::NIL)
            {
                let first = visible.remove(0);
                sweep.push(diagnostics::private_never_assigned_003(source_file_id, variable, first));
            }
        }

        // Textual form differing from the canonical variable name.
        for reference in &self.references {
            if reference.is_magic {
                continue;
            }
            let Some(variable) = self.variable_of(reference) else {
                continue;
            };

            let start = reference.offset as usize;
            let end = start + reference.length as usize;
            let Some(text) = view.preprocessed_text.get(start..end) else {
                continue;
            };

            let written = if text.starts_with('"') || text.starts_with('\'') { destringify(text) } else { text.to_string() };
            if written != variable.name {
                sweep.push(diagnostics::name_differs_from_declared_005(source_file_id, variable, reference, &written));
            }
        }

        // Private declarations shadowing an outer private declaration.
        for (index, test) in self.references.iter().enumerate() {
            if test.is_magic || !test.is_declaration {
                continue;
            }
            let Some(test_variable) = self.variable_of(test) else {
                continue;
            };
            if !Self::is_private(test_variable) {
                continue;
            }

            let shadowed = self.references[..index].iter().find(|earlier| {
                if earlier.access != Access::Set || !earlier.is_declaration {
                    return false;
                }
                if earlier.variable_id == test.variable_id {
                    return false;
                }
                let Some(earlier_variable) = self.variable_of(earlier) else {
                    return false;
                };

                Self::is_private(earlier_variable)
                    && iequal(&earlier_variable.name, &test_variable.name)
                    && earlier_variable.scope.len() <= test_variable.scope.len()
                    && Self::scope_is_ancestor(&earlier_variable.scope, &test_variable.scope)
            });

            if let Some(shadowed) = shadowed {
                sweep.push(diagnostics::shadowing_previous_declaration_009(source_file_id, test_variable, test));
                sweep.push(diagnostics::shadowed_by_later_declaration_009(source_file_id, test_variable, shadowed));
            }
        }

        self.diagnostics.extend(sweep);
    }

    fn take_output(&mut self) -> VisitorOutput {
        VisitorOutput {
            variables: std::mem::take(&mut self.variables),
            references: std::mem::take(&mut self.references),
            diagnostics: std::mem::take(&mut self.diagnostics),
            hovers: Vec::new(),
            code_actions: std::mem::take(&mut self.code_actions),
        }
    }
}

#[cfg(test)]
mod tests {
    use sqfls_database::Store;
    use sqfls_database::StoreAccess;

    use crate::offset_map::OffsetMap;
    use crate::visitor::drive;

    use super::*;

    fn run(text: &str) -> (VisitorOutput, i64) {
        let (store, _) = Store::open_in_memory().unwrap();
        let file = store.ensure_file("test.sqf", 0).unwrap();
        let offsets = OffsetMap::new();
        let tooling = std::path::PathBuf::from(".");
        let view = AnalyzerView::new(&file, text, &offsets, &store, &tooling, 0);

        let root = sqfls_syntax::parse_script(text, "test.sqf", None).unwrap();
        let mut visitors: Vec<Box<dyn Visitor<Node>>> = vec![Box::new(SymbolVisitor::new())];
        drive(&root, &mut visitors, &view);

        (visitors[0].take_output(), file.id)
    }

    fn variable_named<'a>(output: &'a VisitorOutput, name: &str) -> &'a VariableRecord {
        output.variables.iter().find(|variable| variable.name == name).expect("variable")
    }

    #[test]
    fn scope_tags_nest_by_child_index() {
        let (output, file_id) = run("call { private \"_a\"; call { private \"_b\"; }; };");

        assert_eq!(variable_named(&output, "_a").scope, format!("scope@{file_id}://0"));
        assert_eq!(variable_named(&output, "_b").scope, format!("scope@{file_id}://0/0"));
    }

    #[test]
    fn detached_blocks_declare_a_fresh_this() {
        let (output, _) = run("_f = { x = 1; };");

        let this = variable_named(&output, "_this");
        let injected = output
            .references
            .iter()
            .filter(|reference| reference.variable_id == this.id && reference.is_magic && reference.is_declaration)
            .count();
        assert_eq!(injected, 1);
    }

    #[test]
    fn attached_blocks_see_the_enclosing_scope() {
        let (output, _) = run("private \"_v\";\n_v = 1;\ncall { x = _v; };");

        let declared: Vec<_> = output.variables.iter().filter(|variable| variable.name == "_v").collect();
        assert_eq!(declared.len(), 1);

        let uses = output.references.iter().filter(|reference| reference.variable_id == declared[0].id).count();
        assert_eq!(uses, 3);
    }

    #[test]
    fn iteration_operators_inject_their_magic_variables() {
        let (output, _) = run("{ x = _x; } forEach [1, 2];");

        for name in ["_x", "_y", "_forEachIndex"] {
            let variable = variable_named(&output, name);
            assert!(output
                .references
                .iter()
                .any(|reference| reference.variable_id == variable.id && reference.is_magic && reference.is_declaration));
        }
    }

    #[test]
    fn assignment_candidate_falls_through_to_any() {
        let (output, _) = run("_a = foo bar;");

        let variable = variable_named(&output, "_a");
        let set = output
            .references
            .iter()
            .find(|reference| reference.variable_id == variable.id && reference.access == Access::Set)
            .expect("the buffered set");
        assert_eq!(set.types, TypeFlags::ANY);
    }
}
