//! Classification tables for called names.
//!
//! Lowering treats three families of callees specially. Front-end operator
//! names (the `ast.`-prefixed set) and the synthesized field accessors
//! become `LANGUAGE_PRIMITIVE` boxes with no body network. Source-language
//! builtins become named boxes tagged with the source language. Everything
//! else resolves to a user definition or an import.

/// Primitives lowered inline even on an assignment right side: the
/// iteration protocol trio, whose ports the enclosing loop wiring consumes
/// directly.
pub fn is_inline(name: &str) -> bool {
    matches!(name, "iter" | "next" | "range")
}

/// Whether a called name denotes a primitive operation rather than a
/// user-defined or imported function.
pub fn is_primitive(name: &str) -> bool {
    name.starts_with("ast.") || is_inline(name) || matches!(name, "_get" | "_set")
}

/// Comparison operators, which predicates treat specially when a branch
/// body opens with one.
pub fn is_comparison(op: &str) -> bool {
    matches!(
        op,
        "ast.Eq" | "ast.NotEq" | "ast.Lt" | "ast.LtE" | "ast.Gt" | "ast.GtE"
    )
}

/// Number of output ports a primitive call produces. The iteration
/// primitive yields its element, the advanced iterator, and the stop flag;
/// every other primitive yields one value.
pub fn get_outputs(name: &str) -> usize {
    if name == "next" {
        3
    } else {
        1
    }
}

/// Whether a name is a source-language builtin. The table follows the
/// Python builtins the front-end leaves as bare calls.
pub fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "print"
            | "len"
            | "abs"
            | "min"
            | "max"
            | "round"
            | "sum"
            | "str"
            | "int"
            | "float"
            | "bool"
            | "list"
            | "tuple"
            | "dict"
            | "set"
            | "enumerate"
            | "zip"
            | "sorted"
            | "map"
            | "filter"
            | "type"
            | "isinstance"
    )
}
