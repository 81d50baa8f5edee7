//! In-source diagnostic suppression.
//!
//! The preprocessor's `sls` pragma feeds directives into a context scoped to
//! one analysis of one file; the commit coordinator consults
//! [`SuppressionContext::can_report`] when persisting diagnostics.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectiveKind {
    Enable,
    Disable,
    DisableLine,
    DisableFile,
}

#[derive(Debug, Clone)]
struct Directive {
    kind: DirectiveKind,
    file: String,
    line: u32,
    code: String,
}

/// Ordered list of suppression directives for one analysis.
#[derive(Debug, Clone, Default)]
pub struct SuppressionContext {
    directives: Vec<Directive>,
}

impl SuppressionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_enable(&mut self, file: impl Into<String>, line: u32, code: impl Into<String>) {
        self.push(DirectiveKind::Enable, file.into(), line, code.into());
    }

    pub fn push_disable(&mut self, file: impl Into<String>, line: u32, code: impl Into<String>) {
        self.push(DirectiveKind::Disable, file.into(), line, code.into());
    }

    pub fn push_disable_line(&mut self, file: impl Into<String>, line: u32, code: impl Into<String>) {
        self.push(DirectiveKind::DisableLine, file.into(), line, code.into());
    }

    pub fn push_disable_file(&mut self, code: impl Into<String>) {
        self.push(DirectiveKind::DisableFile, String::new(), 0, code.into());
    }

    fn push(&mut self, kind: DirectiveKind, file: String, line: u32, code: String) {
        self.directives.push(Directive { kind, file, line, code });
    }

    /// Whether a diagnostic with `code` at `path`:`line` may be reported.
    ///
    /// Directives apply in insertion order. A `disable` takes effect from
    /// the line after it until a matching `enable`; `disable line` covers
    /// exactly the following line; `disable file` short-circuits for the
    /// rest of the analysis regardless of file.
    #[must_use]
    pub fn can_report(&self, code: &str, path: &str, line: u32) -> bool {
        let mut can_report = true;

        for directive in &self.directives {
            if directive.kind != DirectiveKind::DisableFile {
                if directive.file != path {
                    continue;
                }
                if directive.line >= line {
                    break;
                }
            }

            if directive.code != code {
                continue;
            }

            match directive.kind {
                DirectiveKind::Enable => can_report = true,
                DirectiveKind::Disable => can_report = false,
                DirectiveKind::DisableFile => return false,
                DirectiveKind::DisableLine => {
                    if directive.line + 1 == line {
                        return false;
                    }
                }
            }
        }

        can_report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disable_applies_from_the_following_line() {
        let mut context = SuppressionContext::new();
        context.push_disable("a.sqf", 3, "VV-001");

        assert!(context.can_report("VV-001", "a.sqf", 3));
        assert!(!context.can_report("VV-001", "a.sqf", 4));
        assert!(!context.can_report("VV-001", "a.sqf", 40));
    }

    #[test]
    fn enable_reverses_a_disable() {
        let mut context = SuppressionContext::new();
        context.push_disable("a.sqf", 3, "VV-001");
        context.push_enable("a.sqf", 7, "VV-001");

        assert!(!context.can_report("VV-001", "a.sqf", 5));
        assert!(context.can_report("VV-001", "a.sqf", 9));
    }

    #[test]
    fn disable_line_covers_exactly_one_line() {
        let mut context = SuppressionContext::new();
        context.push_disable_line("a.sqf", 3, "VV-008");

        assert!(context.can_report("VV-008", "a.sqf", 3));
        assert!(!context.can_report("VV-008", "a.sqf", 4));
        assert!(context.can_report("VV-008", "a.sqf", 5));
    }

    #[test]
    fn disable_file_ignores_path_and_line() {
        let mut context = SuppressionContext::new();
        context.push_disable_file("VV-002");

        assert!(!context.can_report("VV-002", "a.sqf", 1));
        assert!(!context.can_report("VV-002", "other.sqf", 99));
        assert!(context.can_report("VV-001", "a.sqf", 1));
    }

    #[test]
    fn directives_are_file_scoped() {
        let mut context = SuppressionContext::new();
        context.push_disable("a.sqf", 1, "VV-001");

        assert!(context.can_report("VV-001", "b.sqf", 10));
        assert!(!context.can_report("VV-001", "a.sqf", 10));
    }

    #[test]
    fn unrelated_codes_are_untouched() {
        let mut context = SuppressionContext::new();
        context.push_disable("a.sqf", 1, "VV-001");

        assert!(context.can_report("VV-003", "a.sqf", 10));
    }
}
