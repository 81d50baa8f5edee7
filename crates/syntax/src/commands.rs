//! The built-in command table.
//!
//! The parser needs to know whether an identifier in operand or operator
//! position is a nullar, unary, or binary command; everything else is a
//! variable. The table covers the engine's scripting vocabulary — the subset
//! that matters for analysis plus the common general-purpose commands.

use foldhash::HashSet;
use foldhash::HashSetExt;

const NULLAR_COMMANDS: &[&str] = &[
    "nil",
    "missionnamespace",
    "uinamespace",
    "parsingnamespace",
    "profilenamespace",
    "allunits",
    "player",
    "time",
];

const UNARY_COMMANDS: &[&str] = &[
    "private",
    "params",
    "isnil",
    "for",
    "call",
    "spawn",
    "count",
    "comment",
    "hint",
    "format",
    "tostring",
    "toupper",
    "tolower",
    "sleep",
    "not",
    "typename",
    "typeof",
    "str",
    "floor",
    "ceil",
    "round",
    "abs",
    "selectrandom",
    "reverse",
    "deletevehicle",
    "switch",
    "if",
    "while",
    "waituntil",
    "try",
    "throw",
    "values",
    "keys",
    "createhashmap",
];

/// Binary commands in the generic middle tier. Symbolic operators and the
/// arithmetic/comparison keywords live in their own tiers and are matched
/// directly by the parser.
const BINARY_COMMANDS: &[&str] = &[
    "foreach",
    "select",
    "apply",
    "count",
    "findif",
    "find",
    "getvariable",
    "setvariable",
    "then",
    "exitwith",
    "do",
    "from",
    "to",
    "step",
    "catch",
    "default",
    "params",
    "call",
    "spawn",
    "in",
    "set",
    "pushback",
    "pushbackunique",
    "get",
    "getordefault",
    "isequaltype",
];

/// Classification of identifiers into command arities.
#[derive(Debug, Clone)]
pub struct CommandTable {
    nullar: HashSet<&'static str>,
    unary: HashSet<&'static str>,
    binary: HashSet<&'static str>,
}

impl CommandTable {
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            nullar: NULLAR_COMMANDS.iter().copied().collect(),
            unary: UNARY_COMMANDS.iter().copied().collect(),
            binary: BINARY_COMMANDS.iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn is_nullar(&self, ident: &str) -> bool {
        self.nullar.contains(ident.to_ascii_lowercase().as_str())
    }

    #[must_use]
    pub fn is_unary(&self, ident: &str) -> bool {
        self.unary.contains(ident.to_ascii_lowercase().as_str())
    }

    #[must_use]
    pub fn is_binary(&self, ident: &str) -> bool {
        self.binary.contains(ident.to_ascii_lowercase().as_str())
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_case_insensitive() {
        let table = CommandTable::builtin();

        assert!(table.is_unary("Private"));
        assert!(table.is_binary("forEach"));
        assert!(table.is_nullar("NIL"));
        assert!(!table.is_unary("_myVariable"));
    }

    #[test]
    fn count_is_both_unary_and_binary() {
        let table = CommandTable::builtin();

        assert!(table.is_unary("count"));
        assert!(table.is_binary("count"));
    }
}
