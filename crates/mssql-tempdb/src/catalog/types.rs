//! Catalog object identity: kinds, qualified names and URNs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::identifier::{qualify, split_multipart};

/// Schema used when a name carries no schema part.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// Kind of a catalog object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Table,
    View,
    StoredProcedure,
    UserDefinedFunction,
    SqlAssembly,
    /// A reference the catalog could not bind to an object.
    Unresolved,
    /// Any other schema-scoped object (triggers, synonyms, sequences, ...).
    Other,
}

impl ObjectKind {
    /// Map a `sys.objects.type` code.
    pub fn from_type_code(code: &str) -> Self {
        match code.trim() {
            "U" => ObjectKind::Table,
            "V" => ObjectKind::View,
            "P" | "PC" => ObjectKind::StoredProcedure,
            "FN" | "IF" | "TF" | "FS" | "FT" => ObjectKind::UserDefinedFunction,
            _ => ObjectKind::Other,
        }
    }

    /// `sys.objects.type` codes that resolve to this kind.
    pub fn type_codes(self) -> &'static [&'static str] {
        match self {
            ObjectKind::Table => &["U"],
            ObjectKind::View => &["V"],
            ObjectKind::StoredProcedure => &["P", "PC"],
            ObjectKind::UserDefinedFunction => &["FN", "IF", "TF", "FS", "FT"],
            ObjectKind::SqlAssembly | ObjectKind::Unresolved | ObjectKind::Other => &[],
        }
    }

    /// Type segment used in URNs.
    pub fn urn_type(self) -> &'static str {
        match self {
            ObjectKind::Table => "Table",
            ObjectKind::View => "View",
            ObjectKind::StoredProcedure => "StoredProcedure",
            ObjectKind::UserDefinedFunction => "UserDefinedFunction",
            ObjectKind::SqlAssembly => "SqlAssembly",
            ObjectKind::Unresolved => "UnresolvedEntity",
            ObjectKind::Other => "Object",
        }
    }

    /// Human readable name for log lines.
    pub fn display_name(self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::View => "view",
            ObjectKind::StoredProcedure => "stored procedure",
            ObjectKind::UserDefinedFunction => "function",
            ObjectKind::SqlAssembly => "assembly",
            ObjectKind::Unresolved => "unresolved entity",
            ObjectKind::Other => "object",
        }
    }
}

/// A `schema.name` pair. Assemblies carry an empty schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `Name`, `schema.Name` or `[schema].[Name]`. The schema defaults
    /// to `dbo`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = split_multipart(input)?;
        match parts.len() {
            1 => Ok(Self::new(DEFAULT_SCHEMA, parts.remove(0))),
            2 => {
                let name = parts.remove(1);
                Ok(Self::new(parts.remove(0), name))
            }
            _ => Err(HarnessError::Config(format!(
                "expected 'name' or 'schema.name', got {:?}",
                input
            ))),
        }
    }

    /// Name without a schema (assemblies).
    pub fn unscoped(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }

    /// Bracket-quoted `[schema].[name]`.
    pub fn quoted(&self) -> String {
        qualify(&self.schema, &self.name)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.schema, self.name)
        }
    }
}

/// A resolved catalog object: the unit of dependency traversal and scripting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub name: QualifiedName,
    /// Raw `sys.objects.type` code; empty for assemblies and unresolved
    /// references.
    pub type_code: String,
}

impl ObjectRef {
    /// Reference with the primary type code of `kind`.
    pub fn new(kind: ObjectKind, name: QualifiedName) -> Self {
        let type_code = kind.type_codes().first().copied().unwrap_or_default();
        Self {
            kind,
            name,
            type_code: type_code.to_string(),
        }
    }

    /// Reference typed from a `sys.objects.type` code.
    pub fn from_type_code(code: &str, name: QualifiedName) -> Self {
        Self {
            kind: ObjectKind::from_type_code(code),
            name,
            type_code: code.trim().to_string(),
        }
    }

    pub fn table(schema: &str, name: &str) -> Self {
        Self::new(ObjectKind::Table, QualifiedName::new(schema, name))
    }

    pub fn assembly(name: &str) -> Self {
        Self::new(ObjectKind::SqlAssembly, QualifiedName::unscoped(name))
    }

    pub fn unresolved(schema: &str, name: &str) -> Self {
        Self::new(ObjectKind::Unresolved, QualifiedName::new(schema, name))
    }

    pub fn is_unresolved(&self) -> bool {
        self.kind == ObjectKind::Unresolved
    }

    /// Catalog locator, e.g. `Table[@Schema='dbo' and @Name='Orders']`.
    pub fn urn(&self) -> String {
        let type_name = match (self.kind, self.type_code.as_str()) {
            (ObjectKind::Other, "TR") => "Trigger",
            (ObjectKind::Other, "SN") => "Synonym",
            (ObjectKind::Other, "SO") => "Sequence",
            (kind, _) => kind.urn_type(),
        };
        let name = urn_value(&self.name.name);
        if self.name.schema.is_empty() {
            format!("{}[@Name='{}']", type_name, name)
        } else {
            format!(
                "{}[@Schema='{}' and @Name='{}']",
                type_name,
                urn_value(&self.name.schema),
                name
            )
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.urn())
    }
}

fn urn_value(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_type_code() {
        assert_eq!(ObjectKind::from_type_code("U "), ObjectKind::Table);
        assert_eq!(ObjectKind::from_type_code("PC"), ObjectKind::StoredProcedure);
        assert_eq!(ObjectKind::from_type_code("IF"), ObjectKind::UserDefinedFunction);
        assert_eq!(ObjectKind::from_type_code("FS"), ObjectKind::UserDefinedFunction);
        assert_eq!(ObjectKind::from_type_code("TR"), ObjectKind::Other);
        assert_eq!(ObjectKind::from_type_code("AF"), ObjectKind::Other);
    }

    #[test]
    fn test_parse_defaults_schema() {
        let name = QualifiedName::parse("Orders").unwrap();
        assert_eq!(name, QualifiedName::new("dbo", "Orders"));
    }

    #[test]
    fn test_parse_schema_and_brackets() {
        assert_eq!(
            QualifiedName::parse("sales.Orders").unwrap(),
            QualifiedName::new("sales", "Orders")
        );
        assert_eq!(
            QualifiedName::parse("[sales].[Order Lines]").unwrap(),
            QualifiedName::new("sales", "Order Lines")
        );
    }

    #[test]
    fn test_parse_rejects_three_part_names() {
        assert!(QualifiedName::parse("db.dbo.Orders").is_err());
        assert!(QualifiedName::parse("").is_err());
    }

    #[test]
    fn test_urn_format() {
        assert_eq!(
            ObjectRef::table("dbo", "Orders").urn(),
            "Table[@Schema='dbo' and @Name='Orders']"
        );
        assert_eq!(ObjectRef::assembly("Calc").urn(), "SqlAssembly[@Name='Calc']");
        assert_eq!(
            ObjectRef::unresolved("dbo", "#tmp").urn(),
            "UnresolvedEntity[@Schema='dbo' and @Name='#tmp']"
        );
        assert_eq!(
            ObjectRef::from_type_code("TR", QualifiedName::new("dbo", "trg")).urn(),
            "Trigger[@Schema='dbo' and @Name='trg']"
        );
    }

    #[test]
    fn test_urn_escapes_quotes() {
        let view = ObjectRef::new(ObjectKind::View, QualifiedName::new("dbo", "O'Brien"));
        assert_eq!(view.urn(), "View[@Schema='dbo' and @Name='O''Brien']");
    }

    #[test]
    fn test_quoted_name() {
        assert_eq!(QualifiedName::new("dbo", "Orders").quoted(), "[dbo].[Orders]");
        assert_eq!(QualifiedName::unscoped("Calc").quoted(), "[Calc]");
    }
}
