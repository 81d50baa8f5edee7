//! Constructors for the analyzer's diagnostic codes.

use sqfls_database::model::DiagnosticRecord;
use sqfls_database::model::ReferenceRecord;
use sqfls_database::model::Severity;
use sqfls_database::model::VariableRecord;
use sqfls_syntax::Node;
use sqfls_syntax::NodeKind;

fn at_reference(reference: &ReferenceRecord, source_file_id: i64) -> DiagnosticRecord {
    DiagnosticRecord {
        file_id: reference.file_id,
        source_file_id,
        line: reference.line,
        column: reference.column,
        offset: reference.offset,
        length: reference.length,
        ..DiagnosticRecord::default()
    }
}

fn at_node(node: &Node, file_id: i64, source_file_id: i64) -> DiagnosticRecord {
    DiagnosticRecord {
        file_id,
        source_file_id,
        line: node.token.location.line,
        column: node.token.location.column,
        offset: node.token.location.offset,
        length: node.token.contents.len() as u32,
        ..DiagnosticRecord::default()
    }
}

pub fn private_never_used_001(
    source_file_id: i64,
    variable: &VariableRecord,
    reference: &ReferenceRecord,
) -> DiagnosticRecord {
    DiagnosticRecord {
        severity: Severity::Info,
        message: format!("Private variable '{}' is never used", variable.name),
        content: variable.name.clone(),
        code: "VV-001".to_string(),
        ..at_reference(reference, source_file_id)
    }
}

pub fn global_never_used_in_file_002(
    source_file_id: i64,
    variable: &VariableRecord,
    reference: &ReferenceRecord,
) -> DiagnosticRecord {
    DiagnosticRecord {
        severity: Severity::Verbose,
        message: format!("Global variable '{}' is never used in this file", variable.name),
        content: variable.name.clone(),
        code: "VV-002".to_string(),
        ..at_reference(reference, source_file_id)
    }
}

pub fn private_never_assigned_003(
    source_file_id: i64,
    variable: &VariableRecord,
    reference: &ReferenceRecord,
) -> DiagnosticRecord {
    DiagnosticRecord {
        severity: Severity::Warning,
        message: format!("Private variable '{}' is never assigned", variable.name),
        content: variable.name.clone(),
        code: "VV-003".to_string(),
        ..at_reference(reference, source_file_id)
    }
}

pub fn global_never_assigned_in_file_004(
    source_file_id: i64,
    variable: &VariableRecord,
    reference: &ReferenceRecord,
) -> DiagnosticRecord {
    DiagnosticRecord {
        severity: Severity::Verbose,
        message: format!("Global variable '{}' is never assigned in this file", variable.name),
        content: variable.name.clone(),
        code: "VV-004".to_string(),
        ..at_reference(reference, source_file_id)
    }
}

pub fn name_differs_from_declared_005(
    source_file_id: i64,
    variable: &VariableRecord,
    reference: &ReferenceRecord,
    reference_content: &str,
) -> DiagnosticRecord {
    DiagnosticRecord {
        severity: Severity::Info,
        message: "Variable name differs from declared name".to_string(),
        content: format!("Expected: {}, got: {}", variable.name, reference_content),
        code: "VV-005".to_string(),
        ..at_reference(reference, source_file_id)
    }
}

pub fn type_mismatch_006(
    source_file_id: i64,
    file_id: i64,
    node: &Node,
    expected: &[NodeKind],
) -> DiagnosticRecord {
    DiagnosticRecord {
        severity: Severity::Error,
        message: "Node type mismatch".to_string(),
        content: expectation(expected, node.kind),
        code: "VV-006".to_string(),
        ..at_node(node, file_id, source_file_id)
    }
}

pub fn name_not_statically_known_007(
    source_file_id: i64,
    file_id: i64,
    node: &Node,
    expected: &[NodeKind],
) -> DiagnosticRecord {
    DiagnosticRecord {
        severity: Severity::Verbose,
        message: "The provided type cannot be used to determine the variable name for referral".to_string(),
        content: expectation(expected, node.kind),
        code: "VV-007".to_string(),
        ..at_node(node, file_id, source_file_id)
    }
}

pub fn needless_brackets_008(
    source_file_id: i64,
    file_id: i64,
    bracket: &sqfls_syntax::token::Token,
    is_left: bool,
) -> DiagnosticRecord {
    DiagnosticRecord {
        file_id,
        source_file_id,
        line: bracket.location.line,
        column: bracket.location.column,
        offset: bracket.location.offset,
        length: bracket.contents.len() as u32,
        severity: if is_left { Severity::Info } else { Severity::Verbose },
        message: "The round brackets can safely be removed".to_string(),
        content: "The round brackets can safely be removed".to_string(),
        code: "VV-008".to_string(),
        ..DiagnosticRecord::default()
    }
}

pub fn shadowing_previous_declaration_009(
    source_file_id: i64,
    variable: &VariableRecord,
    reference: &ReferenceRecord,
) -> DiagnosticRecord {
    DiagnosticRecord {
        severity: Severity::Warning,
        message: format!("Private variable '{}' is shadowing a previously declared private variable", variable.name),
        content: variable.name.clone(),
        code: "VV-009".to_string(),
        ..at_reference(reference, source_file_id)
    }
}

pub fn shadowed_by_later_declaration_009(
    source_file_id: i64,
    variable: &VariableRecord,
    reference: &ReferenceRecord,
) -> DiagnosticRecord {
    DiagnosticRecord {
        severity: Severity::Verbose,
        message: format!("Private variable '{}' is shadowed", variable.name),
        content: variable.name.clone(),
        code: "VV-009".to_string(),
        ..at_reference(reference, source_file_id)
    }
}

fn expectation(expected: &[NodeKind], got: NodeKind) -> String {
    let expected: Vec<String> = expected.iter().map(|kind| kind.to_string()).collect();

    format!("Expected: {}, got: {}", expected.join(" or "), got)
}
