//! T-SQL generation from catalog definitions.
//!
//! Every function here is pure: definitions in, statements out. Statements
//! are relative to the database they run in and never name it.

use crate::catalog::{
    format_column_type, AssemblyDefinition, ClrModule, ColumnDefinition, ForeignKeyDefinition,
    IndexColumn, IndexDefinition, KeyConstraint, ModuleBody, ModuleDefinition, ObjectKind,
    ObjectRef, QualifiedName, SequenceDefinition, SynonymDefinition, TableDefinition,
};
use crate::error::{HarnessError, Result};
use crate::identifier::{qualify, quote_ident, string_literal, validate_collation};

use super::ScriptingProfile;

/// CREATE statements for a table, followed by its indexes and foreign keys.
pub fn create_table(profile: &ScriptingProfile, table: &TableDefinition) -> Result<Vec<String>> {
    let name = table.name.quoted();
    let object = ObjectRef::new(ObjectKind::Table, table.name.clone());

    if table.columns.is_empty() {
        return Err(HarnessError::script_generation(
            object.urn(),
            "table has no columns",
        ));
    }

    let mut lines = Vec::with_capacity(table.columns.len() + table.keys.len() + table.checks.len());
    for column in &table.columns {
        lines.push(format!("    {}", column_definition(&object, column)?));
    }
    for key in &table.keys {
        lines.push(format!("    {}", key_constraint(key)));
    }
    for check in &table.checks {
        lines.push(format!(
            "    CONSTRAINT {} CHECK {}",
            quote_ident(&check.name),
            check.definition
        ));
    }

    let create = format!("CREATE TABLE {} (\n{}\n)", name, lines.join(",\n"));
    let mut statements = vec![if profile.include_if_not_exists {
        format!(
            "IF NOT EXISTS (SELECT * FROM sys.objects WHERE object_id = OBJECT_ID({}) AND type = N'U')\nBEGIN\n{}\nEND",
            string_literal(&name),
            create
        )
    } else {
        create
    }];

    if profile.include_indexes {
        for index in &table.indexes {
            statements.push(create_index(profile, &table.name, index));
        }
    }

    for fk in &table.foreign_keys {
        statements.push(create_foreign_key(profile, &table.name, fk));
    }

    Ok(statements)
}

fn column_definition(table: &ObjectRef, column: &ColumnDefinition) -> Result<String> {
    let name = quote_ident(&column.name);

    if let Some(computed) = &column.computed {
        let persisted = if computed.persisted { " PERSISTED" } else { "" };
        return Ok(format!("{} AS {}{}", name, computed.expression, persisted));
    }

    let mut sql = format!(
        "{} {}",
        name,
        format_column_type(&column.data_type, column.max_length, column.precision, column.scale)
    );

    if let Some(collation) = &column.collation {
        validate_collation(collation)
            .map_err(|e| HarnessError::script_generation(table.urn(), e.to_string()))?;
        sql.push_str(&format!(" COLLATE {}", collation));
    }

    if let Some(identity) = &column.identity {
        let numeric = |v: &str| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit() || c == '-');
        if !numeric(&identity.seed) || !numeric(&identity.increment) {
            return Err(HarnessError::script_generation(
                table.urn(),
                format!("invalid identity specification on column {}", column.name),
            ));
        }
        sql.push_str(&format!(" IDENTITY({},{})", identity.seed, identity.increment));
    }

    sql.push_str(if column.is_nullable { " NULL" } else { " NOT NULL" });

    if let Some(default) = &column.default {
        sql.push_str(&format!(
            " CONSTRAINT {} DEFAULT {}",
            quote_ident(&default.name),
            default.definition
        ));
    }

    Ok(sql)
}

fn key_constraint(key: &KeyConstraint) -> String {
    format!(
        "CONSTRAINT {} {} {} ({})",
        quote_ident(&key.name),
        if key.is_primary_key { "PRIMARY KEY" } else { "UNIQUE" },
        clustering(key.is_clustered),
        index_columns(&key.columns)
    )
}

fn clustering(is_clustered: bool) -> &'static str {
    if is_clustered {
        "CLUSTERED"
    } else {
        "NONCLUSTERED"
    }
}

fn index_columns(columns: &[IndexColumn]) -> String {
    columns
        .iter()
        .map(|c| {
            format!(
                "{} {}",
                quote_ident(&c.name),
                if c.descending { "DESC" } else { "ASC" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_index(profile: &ScriptingProfile, table: &QualifiedName, index: &IndexDefinition) -> String {
    let mut sql = format!(
        "CREATE {}{} INDEX {} ON {} ({})",
        if index.is_unique { "UNIQUE " } else { "" },
        clustering(index.is_clustered),
        quote_ident(&index.name),
        table.quoted(),
        index_columns(&index.columns)
    );
    if !index.included_columns.is_empty() {
        sql.push_str(&format!(" INCLUDE ({})", column_list(&index.included_columns)));
    }
    if let Some(filter) = &index.filter {
        sql.push_str(&format!(" WHERE {}", filter));
    }

    if profile.include_if_not_exists {
        format!(
            "IF NOT EXISTS (SELECT * FROM sys.indexes WHERE object_id = OBJECT_ID({}) AND name = {})\n{}",
            string_literal(&table.quoted()),
            string_literal(&index.name),
            sql
        )
    } else {
        sql
    }
}

fn create_foreign_key(
    profile: &ScriptingProfile,
    table: &QualifiedName,
    fk: &ForeignKeyDefinition,
) -> String {
    let mut sql = format!(
        "ALTER TABLE {} WITH CHECK ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        table.quoted(),
        quote_ident(&fk.name),
        column_list(&fk.columns),
        fk.referenced_table.quoted(),
        column_list(&fk.referenced_columns)
    );
    if let Some(action) = referential_action(&fk.on_delete) {
        sql.push_str(&format!(" ON DELETE {}", action));
    }
    if let Some(action) = referential_action(&fk.on_update) {
        sql.push_str(&format!(" ON UPDATE {}", action));
    }

    let mut conditions = Vec::new();
    if profile.include_if_not_exists {
        conditions.push(format!(
            "NOT EXISTS (SELECT * FROM sys.foreign_keys WHERE object_id = OBJECT_ID({}) AND parent_object_id = OBJECT_ID({}))",
            string_literal(&qualify(&table.schema, &fk.name)),
            string_literal(&table.quoted())
        ));
    }
    // Without dependency scripting the referenced table may not exist yet
    if !profile.include_dependencies {
        conditions.push(format!(
            "OBJECT_ID({}, N'U') IS NOT NULL",
            string_literal(&fk.referenced_table.quoted())
        ));
    }

    if conditions.is_empty() {
        sql
    } else {
        format!("IF {}\n{}", conditions.join("\n    AND "), sql)
    }
}

fn referential_action(desc: &str) -> Option<&'static str> {
    match desc.to_uppercase().as_str() {
        "CASCADE" => Some("CASCADE"),
        "SET_NULL" => Some("SET NULL"),
        "SET_DEFAULT" => Some("SET DEFAULT"),
        _ => None,
    }
}

/// CREATE statement for a view, procedure, function or other module.
pub fn create_module(profile: &ScriptingProfile, module: &ModuleDefinition) -> Result<Vec<String>> {
    let body = match &module.body {
        ModuleBody::Sql(definition) => {
            if definition.trim().is_empty() {
                return Err(HarnessError::script_generation(
                    module.object.urn(),
                    "module definition is empty or encrypted",
                ));
            }
            definition.clone()
        }
        ModuleBody::Clr(clr) => clr_module(&module.object, clr)?,
    };

    if !profile.include_if_not_exists {
        return Ok(vec![body]);
    }

    // CREATE VIEW/PROCEDURE/FUNCTION must start a batch, so it runs nested
    Ok(vec![format!(
        "IF NOT EXISTS (SELECT * FROM sys.objects WHERE object_id = OBJECT_ID({}))\nEXEC dbo.sp_executesql @statement = {}",
        string_literal(&module.object.name.quoted()),
        string_literal(&body)
    )])
}

fn clr_module(object: &ObjectRef, clr: &ClrModule) -> Result<String> {
    let external = format!(
        "EXTERNAL NAME {}.{}.{}",
        quote_ident(&clr.assembly),
        quote_ident(&clr.class),
        quote_ident(&clr.method)
    );
    let parameters: Vec<String> = clr
        .parameters
        .iter()
        .map(|p| {
            format!(
                "{} {}{}",
                p.name,
                p.data_type,
                if p.is_output { " OUTPUT" } else { "" }
            )
        })
        .collect();

    match object.type_code.as_str() {
        "PC" => {
            let params = if parameters.is_empty() {
                String::new()
            } else {
                format!("\n    {}", parameters.join(",\n    "))
            };
            Ok(format!(
                "CREATE PROCEDURE {}{}\nAS {}",
                object.name.quoted(),
                params,
                external
            ))
        }
        "FS" => {
            let returns = clr.returns.as_deref().ok_or_else(|| {
                HarnessError::script_generation(object.urn(), "CLR scalar function has no return type")
            })?;
            Ok(format!(
                "CREATE FUNCTION {}({})\nRETURNS {}\nAS {}",
                object.name.quoted(),
                parameters.join(", "),
                returns,
                external
            ))
        }
        "FT" => Err(HarnessError::script_generation(
            object.urn(),
            "CLR table-valued functions are not supported",
        )),
        other => Err(HarnessError::script_generation(
            object.urn(),
            format!("unsupported CLR module type '{}'", other),
        )),
    }
}

/// CREATE ASSEMBLY from the assembly's bits.
pub fn create_assembly(profile: &ScriptingProfile, assembly: &AssemblyDefinition) -> Result<Vec<String>> {
    if !profile.include_assemblies {
        return Ok(Vec::new());
    }

    let permission_set = assembly.permission_set.to_uppercase();
    if !matches!(permission_set.as_str(), "SAFE" | "EXTERNAL_ACCESS" | "UNSAFE") {
        return Err(HarnessError::script_generation(
            ObjectRef::assembly(&assembly.name).urn(),
            format!("unknown permission set '{}'", assembly.permission_set),
        ));
    }
    if assembly.content.is_empty() {
        return Err(HarnessError::script_generation(
            ObjectRef::assembly(&assembly.name).urn(),
            "assembly has no content",
        ));
    }

    let create = format!(
        "CREATE ASSEMBLY {} AUTHORIZATION [dbo] FROM 0x{} WITH PERMISSION_SET = {}",
        quote_ident(&assembly.name),
        hex::encode_upper(&assembly.content),
        permission_set
    );

    Ok(vec![if profile.include_if_not_exists {
        format!(
            "IF NOT EXISTS (SELECT * FROM sys.assemblies WHERE name = {})\n{}",
            string_literal(&assembly.name),
            create
        )
    } else {
        create
    }])
}

/// CREATE SEQUENCE with the source's type, bounds and options.
pub fn create_sequence(profile: &ScriptingProfile, sequence: &SequenceDefinition) -> Result<Vec<String>> {
    let object = ObjectRef::from_type_code("SO", sequence.name.clone());
    let bounds = [
        ("START WITH", &sequence.start_value),
        ("INCREMENT BY", &sequence.increment),
        ("MINVALUE", &sequence.minimum_value),
        ("MAXVALUE", &sequence.maximum_value),
    ];
    let mut create = format!("CREATE SEQUENCE {} AS {}", sequence.name.quoted(), sequence.data_type);
    for (keyword, value) in bounds {
        if !is_integer_literal(value) {
            return Err(HarnessError::script_generation(
                object.urn(),
                format!("invalid {} value '{}'", keyword, value),
            ));
        }
        create.push_str(&format!(" {} {}", keyword, value));
    }
    create.push_str(if sequence.is_cycling { " CYCLE" } else { " NO CYCLE" });
    match (sequence.is_cached, sequence.cache_size) {
        (false, _) => create.push_str(" NO CACHE"),
        (true, Some(size)) => create.push_str(&format!(" CACHE {}", size)),
        (true, None) => create.push_str(" CACHE"),
    }

    Ok(vec![if profile.include_if_not_exists {
        format!(
            "IF NOT EXISTS (SELECT * FROM sys.sequences WHERE object_id = OBJECT_ID({}))\n{}",
            string_literal(&sequence.name.quoted()),
            create
        )
    } else {
        create
    }])
}

fn is_integer_literal(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// CREATE SYNONYM pointing at the same base object as in the source.
pub fn create_synonym(profile: &ScriptingProfile, synonym: &SynonymDefinition) -> Result<Vec<String>> {
    if synonym.base_object.trim().is_empty() {
        return Err(HarnessError::script_generation(
            ObjectRef::from_type_code("SN", synonym.name.clone()).urn(),
            "synonym has no base object",
        ));
    }

    let create = format!(
        "CREATE SYNONYM {} FOR {}",
        synonym.name.quoted(),
        synonym.base_object
    );
    Ok(vec![if profile.include_if_not_exists {
        format!(
            "IF NOT EXISTS (SELECT * FROM sys.synonyms WHERE object_id = OBJECT_ID({}))\n{}",
            string_literal(&synonym.name.quoted()),
            create
        )
    } else {
        create
    }])
}

/// DROP statements for any object kind.
pub fn drop_object(profile: &ScriptingProfile, object: &ObjectRef) -> Result<Vec<String>> {
    let name = object.name.quoted();
    let guard = |sql: String| {
        if profile.include_if_not_exists {
            format!("IF OBJECT_ID({}) IS NOT NULL\n{}", string_literal(&name), sql)
        } else {
            sql
        }
    };

    let statements = match object.kind {
        ObjectKind::Unresolved => Vec::new(),
        ObjectKind::Table => {
            let mut statements = Vec::new();
            if profile.include_dependencies {
                statements.push(drop_referencing_foreign_keys(&object.name));
            }
            statements.push(guard(format!("DROP TABLE {}", name)));
            statements
        }
        ObjectKind::View => vec![guard(format!("DROP VIEW {}", name))],
        ObjectKind::StoredProcedure => vec![guard(format!("DROP PROCEDURE {}", name))],
        ObjectKind::UserDefinedFunction => vec![guard(format!("DROP FUNCTION {}", name))],
        ObjectKind::SqlAssembly => {
            if !profile.include_assemblies {
                return Ok(Vec::new());
            }
            let drop = format!("DROP ASSEMBLY {}", quote_ident(&object.name.name));
            vec![if profile.include_if_not_exists {
                format!(
                    "IF EXISTS (SELECT * FROM sys.assemblies WHERE name = {})\n{}",
                    string_literal(&object.name.name),
                    drop
                )
            } else {
                drop
            }]
        }
        ObjectKind::Other => {
            let keyword = match object.type_code.as_str() {
                "TR" | "TA" => "TRIGGER",
                "SN" => "SYNONYM",
                "SO" => "SEQUENCE",
                other => {
                    return Err(HarnessError::script_generation(
                        object.urn(),
                        format!("cannot drop object of type '{}'", other),
                    ))
                }
            };
            vec![guard(format!("DROP {} {}", keyword, name))]
        }
    };

    Ok(statements)
}

/// Batch removing foreign keys of other tables that reference `table`.
fn drop_referencing_foreign_keys(table: &QualifiedName) -> String {
    format!(
        "DECLARE @drop_fks nvarchar(max) = N'';
SELECT @drop_fks = @drop_fks + N'ALTER TABLE ' + QUOTENAME(OBJECT_SCHEMA_NAME(fk.parent_object_id)) + N'.' + QUOTENAME(OBJECT_NAME(fk.parent_object_id)) + N' DROP CONSTRAINT ' + QUOTENAME(fk.name) + N';'
FROM sys.foreign_keys fk
WHERE fk.referenced_object_id = OBJECT_ID({}) AND fk.parent_object_id <> fk.referenced_object_id;
IF @drop_fks <> N'' EXEC sys.sp_executesql @drop_fks",
        string_literal(&table.quoted())
    )
}

/// Data-only removal of a table's rows.
pub fn clear_table_data(profile: &ScriptingProfile, table: &QualifiedName) -> Vec<String> {
    if !(profile.script_data && profile.script_drops) {
        return Vec::new();
    }
    vec![format!("DELETE FROM {}", table.quoted())]
}
