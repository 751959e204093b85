//! Object definitions read from the source catalog for scripting.

use super::{ObjectRef, QualifiedName};

/// Table schema with everything needed to recreate it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableDefinition {
    pub name: QualifiedName,
    /// Columns in `column_id` order.
    pub columns: Vec<ColumnDefinition>,
    /// Primary key and unique constraints.
    pub keys: Vec<KeyConstraint>,
    /// Indexes that do not back a key constraint.
    pub indexes: Vec<IndexDefinition>,
    pub foreign_keys: Vec<ForeignKeyDefinition>,
    pub checks: Vec<CheckConstraint>,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,

    /// Base type name; alias types are resolved to their system type.
    pub data_type: String,

    /// `sys.columns.max_length` in bytes (-1 for MAX).
    pub max_length: i32,

    /// Numeric precision.
    pub precision: i32,

    /// Numeric or fractional-seconds scale.
    pub scale: i32,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Column collation for character types.
    pub collation: Option<String>,

    /// Identity seed and increment.
    pub identity: Option<IdentitySpec>,

    /// Computed column expression.
    pub computed: Option<ComputedSpec>,

    /// Named default constraint.
    pub default: Option<DefaultConstraint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentitySpec {
    pub seed: String,
    pub increment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedSpec {
    pub expression: String,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefaultConstraint {
    pub name: String,
    pub definition: String,
}

/// Primary key or unique constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyConstraint {
    pub name: String,
    pub is_primary_key: bool,
    pub is_clustered: bool,
    pub columns: Vec<IndexColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexColumn {
    pub name: String,
    pub descending: bool,
}

impl IndexColumn {
    pub fn asc(name: &str) -> Self {
        Self {
            name: name.to_string(),
            descending: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: String,
    pub is_unique: bool,
    pub is_clustered: bool,
    pub columns: Vec<IndexColumn>,
    pub included_columns: Vec<String>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: QualifiedName,
    pub referenced_columns: Vec<String>,
    /// `sys.foreign_keys.delete_referential_action_desc`, e.g. `CASCADE`.
    pub on_delete: String,
    pub on_update: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckConstraint {
    pub name: String,
    pub definition: String,
}

/// Definition of a view, procedure, function or other module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDefinition {
    pub object: ObjectRef,
    pub body: ModuleBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModuleBody {
    /// T-SQL text from `sys.sql_modules.definition`.
    Sql(String),
    /// CLR module bound to an assembly method.
    Clr(ClrModule),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClrModule {
    pub assembly: String,
    pub class: String,
    pub method: String,
    /// Parameters in declaration order.
    pub parameters: Vec<ModuleParameter>,
    /// Formatted return type for scalar functions.
    pub returns: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleParameter {
    /// Name including the leading `@`.
    pub name: String,
    /// Formatted type, e.g. `nvarchar(50)`.
    pub data_type: String,
    pub is_output: bool,
}

/// A CLR assembly and its primary file.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyDefinition {
    pub name: String,
    /// `SAFE`, `EXTERNAL_ACCESS` or `UNSAFE`.
    pub permission_set: String,
    pub content: Vec<u8>,
}

/// A sequence object from `sys.sequences`.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDefinition {
    pub name: QualifiedName,
    /// Formatted type, e.g. `bigint` or `decimal(18, 0)`.
    pub data_type: String,
    pub start_value: String,
    pub increment: String,
    pub minimum_value: String,
    pub maximum_value: String,
    pub is_cycling: bool,
    pub is_cached: bool,
    /// Explicit cache size; the server picks one when absent.
    pub cache_size: Option<i32>,
}

/// A synonym and the object it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct SynonymDefinition {
    pub name: QualifiedName,
    /// `sys.synonyms.base_object_name`, already bracket-quoted.
    pub base_object: String,
}

/// Render a SQL Server type declaration from `sys.columns` style metadata.
pub fn format_column_type(data_type: &str, max_length: i32, precision: i32, scale: i32) -> String {
    let lower = data_type.to_lowercase();
    match lower.as_str() {
        "decimal" | "numeric" => format!("{}({}, {})", lower, precision, scale),
        "datetime2" | "time" | "datetimeoffset" => format!("{}({})", lower, scale),
        "float" if precision > 0 && precision != 53 => format!("float({})", precision),
        "char" | "varchar" | "binary" | "varbinary" => {
            if max_length == -1 {
                format!("{}(max)", lower)
            } else {
                format!("{}({})", lower, max_length)
            }
        }
        // Lengths of unicode types are stored in bytes
        "nchar" | "nvarchar" => {
            if max_length == -1 {
                format!("{}(max)", lower)
            } else {
                format!("{}({})", lower, max_length / 2)
            }
        }
        _ => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_column_type() {
        assert_eq!(format_column_type("int", 4, 10, 0), "int");
        assert_eq!(format_column_type("nvarchar", 100, 0, 0), "nvarchar(50)");
        assert_eq!(format_column_type("nvarchar", -1, 0, 0), "nvarchar(max)");
        assert_eq!(format_column_type("varbinary", -1, 0, 0), "varbinary(max)");
        assert_eq!(format_column_type("char", 10, 0, 0), "char(10)");
        assert_eq!(format_column_type("DECIMAL", 9, 18, 2), "decimal(18, 2)");
        assert_eq!(format_column_type("datetime2", 8, 27, 7), "datetime2(7)");
        assert_eq!(format_column_type("time", 3, 8, 0), "time(0)");
        assert_eq!(format_column_type("float", 8, 53, 0), "float");
        assert_eq!(format_column_type("float", 4, 24, 0), "float(24)");
        assert_eq!(format_column_type("hierarchyid", 892, 0, 0), "hierarchyid");
    }
}
