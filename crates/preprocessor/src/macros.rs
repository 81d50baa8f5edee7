//! Macro definitions and body substitution.

use foldhash::HashMap;
use foldhash::HashSet;

/// A `#define` entry. `params` is `None` for object-like macros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub name: String,
    pub params: Option<Vec<String>>,
    pub body: String,
}

/// Substitutes arguments into a macro body.
///
/// Handles the two operators of the format: `#param` stringifies an argument
/// and `##` concatenates adjacent tokens by vanishing.
#[must_use]
pub fn substitute(definition: &MacroDefinition, arguments: &[String]) -> String {
    let params = definition.params.as_deref().unwrap_or(&[]);
    let bytes = definition.body.as_bytes();
    let mut output = String::with_capacity(definition.body.len());
    let mut i = 0;

    let argument_for = |name: &str| -> Option<&String> {
        params.iter().position(|param| param == name).and_then(|index| arguments.get(index))
    };

    while i < bytes.len() {
        let byte = bytes[i];

        if byte == b'#' && bytes.get(i + 1) == Some(&b'#') {
            // Token concatenation: the operator vanishes, and surrounding
            // whitespace with it.
            while output.ends_with(' ') || output.ends_with('\t') {
                output.pop();
            }
            i += 2;
            while bytes.get(i).is_some_and(|next| *next == b' ' || *next == b'\t') {
                i += 1;
            }
            continue;
        }

        if byte == b'#' && bytes.get(i + 1).is_some_and(|next| next.is_ascii_alphabetic() || *next == b'_') {
            let start = i + 1;
            let mut end = start;
            while bytes.get(end).is_some_and(|next| next.is_ascii_alphanumeric() || *next == b'_') {
                end += 1;
            }
            let name = &definition.body[start..end];
            if let Some(argument) = argument_for(name) {
                output.push('"');
                output.push_str(argument);
                output.push('"');
                i = end;
                continue;
            }
        }

        if byte.is_ascii_alphabetic() || byte == b'_' {
            let start = i;
            let mut end = i;
            while bytes.get(end).is_some_and(|next| next.is_ascii_alphanumeric() || *next == b'_') {
                end += 1;
            }
            let name = &definition.body[start..end];
            if let Some(argument) = argument_for(name) {
                output.push_str(argument);
            } else {
                output.push_str(name);
            }
            i = end;
            continue;
        }

        output.push(byte as char);
        i += 1;
    }

    output
}

/// Expands all known macros within a text, without reporting expansion
/// events. Used for nested expansion inside macro bodies and arguments,
/// where offsets already map to the outermost invocation.
#[must_use]
pub fn expand_text(text: &str, defines: &HashMap<String, MacroDefinition>, in_progress: &mut HashSet<String>) -> String {
    let bytes = text.as_bytes();
    let mut output = String::with_capacity(text.len());
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];

        if byte == b'"' || byte == b'\'' {
            let end = skip_string(text, i);
            output.push_str(&text[i..end]);
            i = end;
            continue;
        }

        if byte.is_ascii_alphabetic() || byte == b'_' {
            let start = i;
            let mut end = i;
            while bytes.get(end).is_some_and(|next| next.is_ascii_alphanumeric() || *next == b'_') {
                end += 1;
            }
            let name = &text[start..end];

            if let Some(definition) = defines.get(name) {
                if !in_progress.contains(name) {
                    let invocation_end = match &definition.params {
                        None => Some((end, Vec::new())),
                        Some(_) => parse_arguments(text, end),
                    };

                    if let Some((after, arguments)) = invocation_end {
                        let arguments: Vec<String> = arguments
                            .iter()
                            .map(|argument| expand_text(argument, defines, in_progress))
                            .collect();

                        in_progress.insert(name.to_string());
                        let substituted = substitute(definition, &arguments);
                        let expanded = expand_text(&substituted, defines, in_progress);
                        in_progress.remove(name);

                        output.push_str(&expanded);
                        i = after;
                        continue;
                    }
                }
            }

            output.push_str(name);
            i = end;
            continue;
        }

        output.push(byte as char);
        i += 1;
    }

    output
}

/// Parses a parenthesized argument list starting at `start` (which must
/// point at the byte right after the macro name). Returns the index one past
/// the closing parenthesis and the raw argument texts, or `None` when no
/// argument list follows.
#[must_use]
pub fn parse_arguments(text: &str, start: usize) -> Option<(usize, Vec<String>)> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'(') {
        return None;
    }

    let mut depth = 0usize;
    let mut arguments = Vec::new();
    let mut current = String::new();
    let mut i = start;

    while i < bytes.len() {
        let byte = bytes[i];

        if byte == b'"' || byte == b'\'' {
            let end = skip_string(text, i);
            current.push_str(&text[i..end]);
            i = end;
            continue;
        }

        match byte {
            b'(' | b'[' | b'{' => {
                depth += 1;
                if depth > 1 {
                    current.push(byte as char);
                }
            }
            b')' | b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if byte == b')' {
                        if !current.trim().is_empty() || !arguments.is_empty() {
                            arguments.push(current.trim().to_string());
                        }
                        return Some((i + 1, arguments));
                    }
                    return None;
                }
                current.push(byte as char);
            }
            b',' if depth == 1 => {
                arguments.push(current.trim().to_string());
                current.clear();
            }
            other => current.push(other as char),
        }

        i += 1;
    }

    None
}

/// Returns the index one past the end of the string literal starting at
/// `start`, honoring doubled-quote escapes.
#[must_use]
pub fn skip_string(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let quote = bytes[start];
    let mut i = start + 1;

    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }

    bytes.len()
}

#[cfg(test)]
mod tests {
    use foldhash::HashMapExt;
    use foldhash::HashSetExt;
    use pretty_assertions::assert_eq;

    use super::*;

    fn definition(name: &str, params: Option<&[&str]>, body: &str) -> MacroDefinition {
        MacroDefinition {
            name: name.to_string(),
            params: params.map(|names| names.iter().map(|name| name.to_string()).collect()),
            body: body.to_string(),
        }
    }

    #[test]
    fn substitutes_parameters() {
        let double = definition("DOUBLE", Some(&["x"]), "(x + x)");

        assert_eq!(substitute(&double, &["2".to_string()]), "(2 + 2)");
    }

    #[test]
    fn stringify_wraps_the_argument() {
        let quote = definition("QUOTE", Some(&["v"]), "#v");

        assert_eq!(substitute(&quote, &["hello".to_string()]), "\"hello\"");
    }

    #[test]
    fn concatenation_vanishes() {
        let glue = definition("GLUE", Some(&["a", "b"]), "a ## b");

        assert_eq!(substitute(&glue, &["foo".to_string(), "Bar".to_string()]), "fooBar");
    }

    #[test]
    fn nested_expansion_terminates_on_self_reference() {
        let mut defines = HashMap::new();
        defines.insert("LOOP".to_string(), definition("LOOP", None, "LOOP"));

        let mut in_progress = HashSet::new();
        assert_eq!(expand_text("LOOP", &defines, &mut in_progress), "LOOP");
    }

    #[test]
    fn arguments_balance_nested_brackets() {
        let (after, arguments) = parse_arguments("(a, [1, 2], {x; y})rest", 0).unwrap();

        assert_eq!(&"(a, [1, 2], {x; y})rest"[after..], "rest");
        assert_eq!(arguments, vec!["a".to_string(), "[1, 2]".to_string(), "{x; y}".to_string()]);
    }

    #[test]
    fn strings_shield_commas() {
        let (_, arguments) = parse_arguments("(\"a, b\", c)", 0).unwrap();

        assert_eq!(arguments, vec!["\"a, b\"".to_string(), "c".to_string()]);
    }
}
