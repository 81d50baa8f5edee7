//! Small text helpers shared by the parsers and the analysis layer.

/// Case-insensitive comparison, the identifier equivalence of the language.
#[must_use]
pub fn iequal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Strips the quotes from a string literal and collapses doubled quote
/// characters, the language's escape form.
///
/// Text that does not look like a string literal is returned unchanged.
#[must_use]
pub fn destringify(literal: &str) -> String {
    let bytes = literal.as_bytes();
    let quote = match bytes.first() {
        Some(b'"') => '"',
        Some(b'\'') => '\'',
        _ => return literal.to_string(),
    };

    let inner = if literal.len() >= 2 && literal.ends_with(quote) { &literal[1..literal.len() - 1] } else { &literal[1..] };

    let doubled = match quote {
        '"' => "\"\"",
        _ => "''",
    };

    inner.replace(doubled, &quote.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destringify_double_quoted() {
        assert_eq!(destringify("\"_x\""), "_x");
        assert_eq!(destringify("\"say \"\"hi\"\"\""), "say \"hi\"");
    }

    #[test]
    fn destringify_single_quoted() {
        assert_eq!(destringify("'_x'"), "_x");
        assert_eq!(destringify("'it''s'"), "it's");
    }

    #[test]
    fn destringify_passes_through_bare_text() {
        assert_eq!(destringify("_x"), "_x");
    }

    #[test]
    fn iequal_ignores_case() {
        assert!(iequal("forEach", "foreach"));
        assert!(!iequal("forEach", "forEachIndex"));
    }
}
