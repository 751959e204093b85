//! Identifier validation and quoting for generated T-SQL.
//!
//! Object, schema and database names cannot be bound as parameters, so every
//! statement this crate generates splices them in as bracket-quoted
//! identifiers. String values that end up inside DDL (file paths, guard
//! predicates, module bodies) are emitted as escaped `N'...'` literals.

use crate::error::{HarnessError, Result};

/// Maximum identifier length accepted by SQL Server (`sysname`).
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Databases the harness must never create or drop.
const SYSTEM_DATABASES: &[&str] = &["master", "model", "msdb", "tempdb"];

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers longer than `sysname`.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(HarnessError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(HarnessError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(HarnessError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote_ident("users"), "[users]");
/// assert_eq!(quote_ident("table]name"), "[table]]name]");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a `schema.name` pair. An empty schema yields just the quoted name
/// (assemblies are not schema-scoped).
pub fn qualify(schema: &str, name: &str) -> String {
    if schema.is_empty() {
        quote_ident(name)
    } else {
        format!("{}.{}", quote_ident(schema), quote_ident(name))
    }
}

/// Emit a Unicode string literal, doubling embedded single quotes.
pub fn string_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Validate a collation name before it is spliced into `COLLATE`.
pub fn validate_collation(collation: &str) -> Result<()> {
    if collation.is_empty()
        || !collation
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(HarnessError::Config(format!(
            "Invalid collation name: {:?}",
            collation
        )));
    }
    Ok(())
}

/// Validate a database name the harness is allowed to create and drop.
pub fn validate_target_database(name: &str) -> Result<()> {
    validate_identifier(name)?;
    if SYSTEM_DATABASES
        .iter()
        .any(|system| system.eq_ignore_ascii_case(name))
    {
        return Err(HarnessError::Config(format!(
            "Refusing to use system database '{}' as the target",
            name
        )));
    }
    Ok(())
}

/// Split a possibly bracket-quoted multi-part name on dots outside brackets.
///
/// `[dbo].[Order.Lines]` yields `["dbo", "Order.Lines"]`; `]]` inside a
/// bracketed part is unescaped to `]`.
pub fn split_multipart(name: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = name.trim().chars().peekable();
    let mut in_brackets = false;

    while let Some(c) = chars.next() {
        match c {
            '[' if !in_brackets && current.is_empty() => in_brackets = true,
            ']' if in_brackets => {
                if chars.peek() == Some(&']') {
                    chars.next();
                    current.push(']');
                } else {
                    in_brackets = false;
                }
            }
            '.' if !in_brackets => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if in_brackets {
        return Err(HarnessError::Config(format!(
            "Unterminated bracket in name: {:?}",
            name
        )));
    }
    parts.push(current);

    for part in &parts {
        validate_identifier(part)?;
    }
    Ok(parts)
}
