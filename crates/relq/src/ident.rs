//! SQL identifier validation and quoting.
//!
//! Names declared in a schema (tables, fields, relation names, aliases) must be plain
//! identifiers matching `[A-Za-z_][A-Za-z0-9_]*` and must not contain the lookup
//! delimiter `__`. Every name relq synthesizes itself (`__v`, `__j1`, ...) starts with
//! `__`, so the two sets can never collide.
//!
//! When rendered, a name is emitted bare if it is a lowercase identifier that is not a
//! reserved keyword, and double-quoted otherwise.

/// The lookup path delimiter.
pub const DELIMITER: &str = "__";

/// PostgreSQL reserved keywords (sorted; searched with `binary_search`).
const RESERVED: &[&str] = &[
    "all",
    "analyse",
    "analyze",
    "and",
    "any",
    "array",
    "as",
    "asc",
    "asymmetric",
    "authorization",
    "binary",
    "both",
    "case",
    "cast",
    "check",
    "collate",
    "collation",
    "column",
    "concurrently",
    "constraint",
    "create",
    "cross",
    "current_catalog",
    "current_date",
    "current_role",
    "current_schema",
    "current_time",
    "current_timestamp",
    "current_user",
    "default",
    "deferrable",
    "desc",
    "distinct",
    "do",
    "else",
    "end",
    "except",
    "false",
    "fetch",
    "for",
    "foreign",
    "freeze",
    "from",
    "full",
    "grant",
    "group",
    "having",
    "ilike",
    "in",
    "initially",
    "inner",
    "intersect",
    "into",
    "is",
    "isnull",
    "join",
    "lateral",
    "leading",
    "left",
    "like",
    "limit",
    "localtime",
    "localtimestamp",
    "natural",
    "not",
    "notnull",
    "null",
    "offset",
    "on",
    "only",
    "or",
    "order",
    "outer",
    "overlaps",
    "placing",
    "primary",
    "references",
    "returning",
    "right",
    "select",
    "session_user",
    "similar",
    "some",
    "symmetric",
    "system_user",
    "table",
    "tablesample",
    "then",
    "to",
    "trailing",
    "true",
    "union",
    "unique",
    "user",
    "using",
    "variadic",
    "verbose",
    "when",
    "where",
    "window",
    "with",
];

/// Whether `name` is a PostgreSQL reserved keyword (case-insensitive).
pub fn is_reserved(name: &str) -> bool {
    RESERVED
        .binary_search(&name.to_ascii_lowercase().as_str())
        .is_ok()
}

fn is_plain(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '$' || c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Render a single identifier, quoting it when required.
pub fn quote(name: &str) -> String {
    if is_plain(name) && !is_reserved(name) {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for ch in name.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Render `qualifier.name`.
pub fn qualified(qualifier: &str, name: &str) -> String {
    format!("{}.{}", quote(qualifier), quote(name))
}

/// Check that `name` can be declared in a schema or used as an alias.
pub fn validate_name(kind: &str, name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(format!("{kind} name cannot be empty")),
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        Some(c) => return Err(format!("invalid {kind} name '{name}': bad start character '{c}'")),
    }
    if let Some(c) = chars.find(|c| !(*c == '_' || c.is_ascii_alphanumeric())) {
        return Err(format!("invalid {kind} name '{name}': bad character '{c}'"));
    }
    if name.contains(DELIMITER) {
        return Err(format!("invalid {kind} name '{name}': contains '{DELIMITER}'"));
    }
    Ok(())
}
