//! Catalog queries over the `sys.*` views of the working database.
//!
//! Every query names the catalog views as `[db].sys.<view>` so it runs
//! against the working database whatever database the session is in.

use async_trait::async_trait;
use tiberius::Row;
use tracing::debug;

use super::{flag, int, opt_text, text, MssqlConnection};
use crate::catalog::{
    format_column_type, AssemblyDefinition, Catalog, CheckConstraint, ClrModule, ColumnDefinition,
    ComputedSpec, DefaultConstraint, Direction, ForeignKeyDefinition, IdentitySpec, IndexColumn,
    IndexDefinition, KeyConstraint, ModuleBody, ModuleDefinition, ModuleParameter, ObjectKind,
    ObjectRef, QualifiedName, SequenceDefinition, SynonymDefinition, TableDefinition,
};
use crate::error::{HarnessError, Result};
use crate::identifier::quote_ident;
use crate::source::DefinitionSource;

const RESOLVE_OBJECT: &str = r#"
    SELECT
        CAST(s.name AS nvarchar(128)),
        CAST(o.name AS nvarchar(128)),
        CAST(RTRIM(o.type) AS nvarchar(2))
    FROM {db}.sys.objects o
    JOIN {db}.sys.schemas s ON s.schema_id = o.schema_id
    WHERE s.name = @P1 AND o.name = @P2 AND o.is_ms_shipped = 0
"#;

const RESOLVE_ASSEMBLY: &str = r#"
    SELECT CAST(name AS nvarchar(128))
    FROM {db}.sys.assemblies
    WHERE name = @P1 AND is_user_defined = 1
"#;

/// Tables referenced by the foreign keys of @P1.
const REFERENCED_TABLES: &str = r#"
    SELECT DISTINCT
        CAST(rs.name AS nvarchar(128)),
        CAST(ro.name AS nvarchar(128))
    FROM {db}.sys.foreign_keys fk
    JOIN {db}.sys.objects ro ON ro.object_id = fk.referenced_object_id
    JOIN {db}.sys.schemas rs ON rs.schema_id = ro.schema_id
    WHERE fk.parent_object_id = OBJECT_ID(@P1)
      AND fk.referenced_object_id <> fk.parent_object_id
"#;

/// Tables whose foreign keys reference @P1.
const REFERENCING_TABLES: &str = r#"
    SELECT DISTINCT
        CAST(ps.name AS nvarchar(128)),
        CAST(po.name AS nvarchar(128))
    FROM {db}.sys.foreign_keys fk
    JOIN {db}.sys.objects po ON po.object_id = fk.parent_object_id
    JOIN {db}.sys.schemas ps ON ps.schema_id = po.schema_id
    WHERE fk.referenced_object_id = OBJECT_ID(@P1)
      AND fk.referenced_object_id <> fk.parent_object_id
"#;

/// Objects referenced by the body of module @P1. Rows with an empty type
/// could not be bound (missing or in another database).
const REFERENCED_ENTITIES: &str = r#"
    SELECT DISTINCT
        CAST(COALESCE(s.name, d.referenced_schema_name, N'') AS nvarchar(128)),
        CAST(COALESCE(o.name, d.referenced_entity_name) AS nvarchar(128)),
        CAST(ISNULL(RTRIM(o.type), N'') AS nvarchar(2))
    FROM {db}.sys.sql_expression_dependencies d
    LEFT JOIN {db}.sys.objects o
        ON o.object_id = d.referenced_id AND d.referenced_database_name IS NULL
    LEFT JOIN {db}.sys.schemas s ON s.schema_id = o.schema_id
    WHERE d.referencing_id = OBJECT_ID(@P1)
      AND d.referenced_class = 1
      AND ISNULL(d.referenced_id, 0) <> d.referencing_id
"#;

/// Modules whose bodies reference @P1.
const REFERENCING_ENTITIES: &str = r#"
    SELECT DISTINCT
        CAST(s.name AS nvarchar(128)),
        CAST(o.name AS nvarchar(128)),
        CAST(RTRIM(o.type) AS nvarchar(2))
    FROM {db}.sys.sql_expression_dependencies d
    JOIN {db}.sys.objects o ON o.object_id = d.referencing_id
    JOIN {db}.sys.schemas s ON s.schema_id = o.schema_id
    WHERE d.referenced_id = OBJECT_ID(@P1)
      AND d.referenced_class = 1
      AND d.referencing_id <> d.referenced_id
"#;

/// Assembly implementing CLR module @P1.
const MODULE_ASSEMBLY: &str = r#"
    SELECT CAST(a.name AS nvarchar(128))
    FROM {db}.sys.assembly_modules am
    JOIN {db}.sys.assemblies a ON a.assembly_id = am.assembly_id
    WHERE am.object_id = OBJECT_ID(@P1) AND a.is_user_defined = 1
"#;

/// User-defined assemblies whose CLR types are used by columns of table @P1.
const COLUMN_TYPE_ASSEMBLIES: &str = r#"
    SELECT DISTINCT CAST(a.name AS nvarchar(128))
    FROM {db}.sys.columns c
    JOIN {db}.sys.assembly_types t ON t.user_type_id = c.user_type_id
    JOIN {db}.sys.assemblies a ON a.assembly_id = t.assembly_id
    WHERE c.object_id = OBJECT_ID(@P1) AND a.is_user_defined = 1
"#;

/// Assemblies referenced by assembly @P1.
const REFERENCED_ASSEMBLIES: &str = r#"
    SELECT CAST(r.name AS nvarchar(128))
    FROM {db}.sys.assembly_references ar
    JOIN {db}.sys.assemblies a ON a.assembly_id = ar.assembly_id
    JOIN {db}.sys.assemblies r ON r.assembly_id = ar.referenced_assembly_id
    WHERE a.name = @P1 AND r.is_user_defined = 1
"#;

/// Assemblies that reference assembly @P1.
const REFERENCING_ASSEMBLIES: &str = r#"
    SELECT CAST(a.name AS nvarchar(128))
    FROM {db}.sys.assembly_references ar
    JOIN {db}.sys.assemblies a ON a.assembly_id = ar.assembly_id
    JOIN {db}.sys.assemblies r ON r.assembly_id = ar.referenced_assembly_id
    WHERE r.name = @P1 AND a.is_user_defined = 1
"#;

/// CLR modules and tables that use assembly @P1.
const ASSEMBLY_USERS: &str = r#"
    SELECT
        CAST(s.name AS nvarchar(128)),
        CAST(o.name AS nvarchar(128)),
        CAST(RTRIM(o.type) AS nvarchar(2))
    FROM {db}.sys.assembly_modules am
    JOIN {db}.sys.assemblies a ON a.assembly_id = am.assembly_id
    JOIN {db}.sys.objects o ON o.object_id = am.object_id
    JOIN {db}.sys.schemas s ON s.schema_id = o.schema_id
    WHERE a.name = @P1
    UNION
    SELECT
        CAST(s.name AS nvarchar(128)),
        CAST(o.name AS nvarchar(128)),
        CAST(RTRIM(o.type) AS nvarchar(2))
    FROM {db}.sys.assembly_types t
    JOIN {db}.sys.assemblies a ON a.assembly_id = t.assembly_id
    JOIN {db}.sys.columns c ON c.user_type_id = t.user_type_id
    JOIN {db}.sys.objects o ON o.object_id = c.object_id AND o.type = 'U'
    JOIN {db}.sys.schemas s ON s.schema_id = o.schema_id
    WHERE a.name = @P1
"#;

const DATABASE_COLLATION: &str = r#"
    SELECT CAST(DATABASEPROPERTYEX(@P1, 'Collation') AS nvarchar(128))
"#;

const TABLE_COLUMNS: &str = r#"
    SELECT
        CAST(c.name AS nvarchar(128)),
        CAST(CASE WHEN ut.is_assembly_type = 1 THEN ut.name ELSE ISNULL(st.name, ut.name) END AS nvarchar(128)),
        CAST(c.max_length AS INT),
        CAST(c.precision AS INT),
        CAST(c.scale AS INT),
        CAST(c.is_nullable AS INT),
        CAST(c.collation_name AS nvarchar(128)),
        CAST(c.is_identity AS INT),
        CAST(ic.seed_value AS nvarchar(40)),
        CAST(ic.increment_value AS nvarchar(40)),
        CAST(cc.definition AS nvarchar(max)),
        CAST(ISNULL(cc.is_persisted, 0) AS INT),
        CAST(dc.name AS nvarchar(128)),
        CAST(dc.definition AS nvarchar(max))
    FROM {db}.sys.columns c
    JOIN {db}.sys.types ut ON ut.user_type_id = c.user_type_id
    LEFT JOIN {db}.sys.types st ON st.user_type_id = c.system_type_id
    LEFT JOIN {db}.sys.identity_columns ic
        ON ic.object_id = c.object_id AND ic.column_id = c.column_id
    LEFT JOIN {db}.sys.computed_columns cc
        ON cc.object_id = c.object_id AND cc.column_id = c.column_id
    LEFT JOIN {db}.sys.default_constraints dc
        ON dc.parent_object_id = c.object_id AND dc.parent_column_id = c.column_id
    WHERE c.object_id = OBJECT_ID(@P1)
    ORDER BY c.column_id
"#;

const TABLE_KEYS: &str = r#"
    SELECT
        CAST(kc.name AS nvarchar(128)),
        CAST(CASE WHEN kc.type = 'PK' THEN 1 ELSE 0 END AS INT),
        CAST(CASE WHEN i.type = 1 THEN 1 ELSE 0 END AS INT),
        CAST(c.name AS nvarchar(128)),
        CAST(ic.is_descending_key AS INT)
    FROM {db}.sys.key_constraints kc
    JOIN {db}.sys.indexes i
        ON i.object_id = kc.parent_object_id AND i.index_id = kc.unique_index_id
    JOIN {db}.sys.index_columns ic
        ON ic.object_id = i.object_id AND ic.index_id = i.index_id AND ic.is_included_column = 0
    JOIN {db}.sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
    WHERE kc.parent_object_id = OBJECT_ID(@P1)
    ORDER BY CASE WHEN kc.type = 'PK' THEN 0 ELSE 1 END, kc.name, ic.key_ordinal
"#;

const TABLE_INDEXES: &str = r#"
    SELECT
        CAST(i.name AS nvarchar(128)),
        CAST(i.is_unique AS INT),
        CAST(CASE WHEN i.type = 1 THEN 1 ELSE 0 END AS INT),
        CAST(i.filter_definition AS nvarchar(max)),
        CAST(c.name AS nvarchar(128)),
        CAST(ic.is_descending_key AS INT),
        CAST(ic.is_included_column AS INT)
    FROM {db}.sys.indexes i
    JOIN {db}.sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    JOIN {db}.sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
    WHERE i.object_id = OBJECT_ID(@P1)
      AND i.is_primary_key = 0
      AND i.is_unique_constraint = 0
      AND i.is_hypothetical = 0
      AND i.type IN (1, 2)
    ORDER BY i.name, ic.is_included_column, ic.key_ordinal, ic.index_column_id
"#;

const TABLE_FOREIGN_KEYS: &str = r#"
    SELECT
        CAST(fk.name AS nvarchar(128)),
        CAST(rs.name AS nvarchar(128)),
        CAST(ro.name AS nvarchar(128)),
        CAST(pc.name AS nvarchar(128)),
        CAST(rc.name AS nvarchar(128)),
        CAST(fk.delete_referential_action_desc AS nvarchar(60)),
        CAST(fk.update_referential_action_desc AS nvarchar(60))
    FROM {db}.sys.foreign_keys fk
    JOIN {db}.sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
    JOIN {db}.sys.columns pc
        ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
    JOIN {db}.sys.columns rc
        ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
    JOIN {db}.sys.objects ro ON ro.object_id = fk.referenced_object_id
    JOIN {db}.sys.schemas rs ON rs.schema_id = ro.schema_id
    WHERE fk.parent_object_id = OBJECT_ID(@P1)
    ORDER BY fk.name, fkc.constraint_column_id
"#;

const TABLE_CHECKS: &str = r#"
    SELECT
        CAST(name AS nvarchar(128)),
        CAST(definition AS nvarchar(max))
    FROM {db}.sys.check_constraints
    WHERE parent_object_id = OBJECT_ID(@P1)
    ORDER BY name
"#;

const SQL_MODULE: &str = r#"
    SELECT CAST(definition AS nvarchar(max))
    FROM {db}.sys.sql_modules
    WHERE object_id = OBJECT_ID(@P1)
"#;

const CLR_MODULE: &str = r#"
    SELECT
        CAST(a.name AS nvarchar(128)),
        CAST(am.assembly_class AS nvarchar(128)),
        CAST(am.assembly_method AS nvarchar(128))
    FROM {db}.sys.assembly_modules am
    JOIN {db}.sys.assemblies a ON a.assembly_id = am.assembly_id
    WHERE am.object_id = OBJECT_ID(@P1)
"#;

const MODULE_PARAMETERS: &str = r#"
    SELECT
        CAST(p.name AS nvarchar(128)),
        CAST(t.name AS nvarchar(128)),
        CAST(p.max_length AS INT),
        CAST(p.precision AS INT),
        CAST(p.scale AS INT),
        CAST(p.is_output AS INT),
        CAST(p.parameter_id AS INT)
    FROM {db}.sys.parameters p
    JOIN {db}.sys.types t ON t.user_type_id = p.user_type_id
    WHERE p.object_id = OBJECT_ID(@P1)
    ORDER BY p.parameter_id
"#;

const SEQUENCE: &str = r#"
    SELECT
        CAST(t.name AS nvarchar(128)),
        CAST(sq.precision AS INT),
        CAST(sq.scale AS INT),
        CAST(sq.start_value AS nvarchar(40)),
        CAST(sq.increment AS nvarchar(40)),
        CAST(sq.minimum_value AS nvarchar(40)),
        CAST(sq.maximum_value AS nvarchar(40)),
        CAST(sq.is_cycling AS INT),
        CAST(sq.is_cached AS INT),
        CAST(sq.cache_size AS INT)
    FROM {db}.sys.sequences sq
    JOIN {db}.sys.types t ON t.user_type_id = sq.system_type_id
    WHERE sq.object_id = OBJECT_ID(@P1)
"#;

const SYNONYM: &str = r#"
    SELECT CAST(base_object_name AS nvarchar(1035))
    FROM {db}.sys.synonyms
    WHERE object_id = OBJECT_ID(@P1)
"#;

const ASSEMBLY_CONTENT: &str = r#"
    SELECT
        CAST(a.name AS nvarchar(128)),
        CAST(a.permission_set_desc AS nvarchar(60)),
        af.content
    FROM {db}.sys.assemblies a
    JOIN {db}.sys.assembly_files af ON af.assembly_id = a.assembly_id AND af.file_id = 1
    WHERE a.name = @P1
"#;

impl MssqlConnection {
    /// Substitute the quoted working database for `{db}`.
    pub(super) fn scoped(&self, sql: &str) -> String {
        sql.replace("{db}", &quote_ident(&self.database))
    }

    /// Three-part name of an object for `OBJECT_ID`.
    pub(super) fn object_path(&self, name: &QualifiedName) -> String {
        format!("{}.{}", quote_ident(&self.database), name.quoted())
    }

    pub(super) async fn catalog_rows(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>> {
        let sql = self.scoped(sql);
        self.query_rows(&sql, params).await
    }

    /// Schema-scoped objects from rows of `(schema, name, type)`.
    async fn objects(&mut self, sql: &str, param: &str) -> Result<Vec<ObjectRef>> {
        let rows = self.catalog_rows(sql, &[param]).await?;
        let mut objects = Vec::with_capacity(rows.len());
        for row in &rows {
            let name = QualifiedName::new(text(row, 0)?, text(row, 1)?);
            let code = text(row, 2)?;
            if code.is_empty() {
                objects.push(ObjectRef::unresolved(&name.schema, &name.name));
            } else {
                objects.push(ObjectRef::from_type_code(&code, name));
            }
        }
        Ok(objects)
    }

    /// Tables from rows of `(schema, name)`.
    async fn tables(&mut self, sql: &str, param: &str) -> Result<Vec<ObjectRef>> {
        let rows = self.catalog_rows(sql, &[param]).await?;
        rows.iter()
            .map(|row| Ok(ObjectRef::table(&text(row, 0)?, &text(row, 1)?)))
            .collect()
    }

    /// Assemblies from rows of `(name)`.
    async fn assemblies(&mut self, sql: &str, param: &str) -> Result<Vec<ObjectRef>> {
        let rows = self.catalog_rows(sql, &[param]).await?;
        rows.iter()
            .map(|row| Ok(ObjectRef::assembly(&text(row, 0)?)))
            .collect()
    }

    async fn source_dependencies(&mut self, object: &ObjectRef) -> Result<Vec<ObjectRef>> {
        match object.kind {
            ObjectKind::Unresolved => Ok(Vec::new()),
            ObjectKind::SqlAssembly => self.assemblies(REFERENCED_ASSEMBLIES, &object.name.name).await,
            ObjectKind::Table => {
                let path = self.object_path(&object.name);
                let mut deps = self.tables(REFERENCED_TABLES, &path).await?;
                deps.extend(self.assemblies(COLUMN_TYPE_ASSEMBLIES, &path).await?);
                Ok(deps)
            }
            _ => {
                let path = self.object_path(&object.name);
                let mut deps = self.objects(REFERENCED_ENTITIES, &path).await?;
                deps.extend(self.assemblies(MODULE_ASSEMBLY, &path).await?);
                Ok(deps)
            }
        }
    }

    async fn target_dependencies(&mut self, object: &ObjectRef) -> Result<Vec<ObjectRef>> {
        match object.kind {
            ObjectKind::Unresolved => Ok(Vec::new()),
            ObjectKind::SqlAssembly => {
                let mut deps = self.objects(ASSEMBLY_USERS, &object.name.name).await?;
                deps.extend(self.assemblies(REFERENCING_ASSEMBLIES, &object.name.name).await?);
                Ok(deps)
            }
            ObjectKind::Table => {
                let path = self.object_path(&object.name);
                let mut deps = self.tables(REFERENCING_TABLES, &path).await?;
                deps.extend(self.objects(REFERENCING_ENTITIES, &path).await?);
                Ok(deps)
            }
            _ => {
                let path = self.object_path(&object.name);
                self.objects(REFERENCING_ENTITIES, &path).await
            }
        }
    }

    async fn load_columns(&mut self, path: &str) -> Result<Vec<ColumnDefinition>> {
        let rows = self.catalog_rows(TABLE_COLUMNS, &[path]).await?;
        let mut columns = Vec::with_capacity(rows.len());

        for row in &rows {
            let identity = if flag(row, 7)? {
                Some(IdentitySpec {
                    seed: opt_text(row, 8)?.unwrap_or_else(|| "1".to_string()),
                    increment: opt_text(row, 9)?.unwrap_or_else(|| "1".to_string()),
                })
            } else {
                None
            };
            let computed = match opt_text(row, 10)? {
                Some(expression) => Some(ComputedSpec {
                    expression,
                    persisted: flag(row, 11)?,
                }),
                None => None,
            };
            let default = match (opt_text(row, 12)?, opt_text(row, 13)?) {
                (Some(name), Some(definition)) => Some(DefaultConstraint { name, definition }),
                _ => None,
            };

            columns.push(ColumnDefinition {
                name: text(row, 0)?,
                data_type: text(row, 1)?,
                max_length: int(row, 2)?,
                precision: int(row, 3)?,
                scale: int(row, 4)?,
                is_nullable: flag(row, 5)?,
                collation: opt_text(row, 6)?,
                identity,
                computed,
                default,
            });
        }

        Ok(columns)
    }

    async fn load_keys(&mut self, path: &str) -> Result<Vec<KeyConstraint>> {
        let rows = self.catalog_rows(TABLE_KEYS, &[path]).await?;
        let mut keys: Vec<KeyConstraint> = Vec::new();

        for row in &rows {
            let name = text(row, 0)?;
            let column = IndexColumn {
                name: text(row, 3)?,
                descending: flag(row, 4)?,
            };
            match keys.last_mut() {
                Some(key) if key.name == name => key.columns.push(column),
                _ => keys.push(KeyConstraint {
                    name,
                    is_primary_key: flag(row, 1)?,
                    is_clustered: flag(row, 2)?,
                    columns: vec![column],
                }),
            }
        }

        Ok(keys)
    }

    async fn load_indexes(&mut self, path: &str) -> Result<Vec<IndexDefinition>> {
        let rows = self.catalog_rows(TABLE_INDEXES, &[path]).await?;
        let mut indexes: Vec<IndexDefinition> = Vec::new();

        for row in &rows {
            let name = text(row, 0)?;
            if indexes.last().map(|i| i.name != name).unwrap_or(true) {
                indexes.push(IndexDefinition {
                    name,
                    is_unique: flag(row, 1)?,
                    is_clustered: flag(row, 2)?,
                    columns: Vec::new(),
                    included_columns: Vec::new(),
                    filter: opt_text(row, 3)?,
                });
            }
            let Some(index) = indexes.last_mut() else {
                continue;
            };

            let column = text(row, 4)?;
            if flag(row, 6)? {
                index.included_columns.push(column);
            } else {
                index.columns.push(IndexColumn {
                    name: column,
                    descending: flag(row, 5)?,
                });
            }
        }

        Ok(indexes)
    }

    async fn load_foreign_keys(&mut self, path: &str) -> Result<Vec<ForeignKeyDefinition>> {
        let rows = self.catalog_rows(TABLE_FOREIGN_KEYS, &[path]).await?;
        let mut foreign_keys: Vec<ForeignKeyDefinition> = Vec::new();

        for row in &rows {
            let name = text(row, 0)?;
            let column = text(row, 3)?;
            let referenced_column = text(row, 4)?;
            match foreign_keys.last_mut() {
                Some(fk) if fk.name == name => {
                    fk.columns.push(column);
                    fk.referenced_columns.push(referenced_column);
                }
                _ => foreign_keys.push(ForeignKeyDefinition {
                    name,
                    columns: vec![column],
                    referenced_table: QualifiedName::new(text(row, 1)?, text(row, 2)?),
                    referenced_columns: vec![referenced_column],
                    on_delete: text(row, 5)?,
                    on_update: text(row, 6)?,
                }),
            }
        }

        Ok(foreign_keys)
    }

    async fn load_checks(&mut self, path: &str) -> Result<Vec<CheckConstraint>> {
        let rows = self.catalog_rows(TABLE_CHECKS, &[path]).await?;
        rows.iter()
            .map(|row| {
                Ok(CheckConstraint {
                    name: text(row, 0)?,
                    definition: text(row, 1)?,
                })
            })
            .collect()
    }

    async fn load_clr_module(&mut self, path: &str) -> Result<Option<ClrModule>> {
        let rows = self.catalog_rows(CLR_MODULE, &[path]).await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let (assembly, class, method) = (text(row, 0)?, text(row, 1)?, text(row, 2)?);

        let mut parameters = Vec::new();
        let mut returns = None;
        for row in &self.catalog_rows(MODULE_PARAMETERS, &[path]).await? {
            let data_type = format_column_type(&text(row, 1)?, int(row, 2)?, int(row, 3)?, int(row, 4)?);
            if int(row, 6)? == 0 {
                returns = Some(data_type);
            } else {
                parameters.push(ModuleParameter {
                    name: text(row, 0)?,
                    data_type,
                    is_output: flag(row, 5)?,
                });
            }
        }

        Ok(Some(ClrModule {
            assembly,
            class,
            method,
            parameters,
            returns,
        }))
    }
}

#[async_trait]
impl Catalog for MssqlConnection {
    fn database(&self) -> &str {
        &self.database
    }

    async fn resolve(&mut self, kind: ObjectKind, name: &QualifiedName) -> Result<Option<ObjectRef>> {
        match kind {
            ObjectKind::Unresolved => Ok(None),
            ObjectKind::SqlAssembly => {
                let rows = self.catalog_rows(RESOLVE_ASSEMBLY, &[name.name.as_str()]).await?;
                match rows.first() {
                    Some(row) => Ok(Some(ObjectRef::assembly(&text(row, 0)?))),
                    None => Ok(None),
                }
            }
            _ => {
                let rows = self
                    .catalog_rows(RESOLVE_OBJECT, &[name.schema.as_str(), name.name.as_str()])
                    .await?;
                for row in &rows {
                    let code = text(row, 2)?;
                    let found = ObjectRef::from_type_code(
                        &code,
                        QualifiedName::new(text(row, 0)?, text(row, 1)?),
                    );
                    if found.kind == kind {
                        return Ok(Some(found));
                    }
                }
                debug!("No {} named {} in {}", kind.display_name(), name, self.database);
                Ok(None)
            }
        }
    }

    async fn dependencies(
        &mut self,
        object: &ObjectRef,
        direction: Direction,
    ) -> Result<Vec<ObjectRef>> {
        match direction {
            Direction::Source => self.source_dependencies(object).await,
            Direction::Target => self.target_dependencies(object).await,
        }
    }
}

#[async_trait]
impl DefinitionSource for MssqlConnection {
    async fn collation(&mut self) -> Result<String> {
        let database = self.database.clone();
        let rows = self.query_rows(DATABASE_COLLATION, &[database.as_str()]).await?;
        match rows.first().map(|row| opt_text(row, 0)).transpose()?.flatten() {
            Some(collation) if !collation.is_empty() => Ok(collation),
            _ => Err(HarnessError::ObjectNotFound(format!(
                "collation of database {}",
                database
            ))),
        }
    }

    async fn table_definition(&mut self, table: &ObjectRef) -> Result<TableDefinition> {
        let path = self.object_path(&table.name);

        let columns = self.load_columns(&path).await?;
        if columns.is_empty() {
            return Err(HarnessError::ObjectNotFound(table.urn()));
        }

        Ok(TableDefinition {
            name: table.name.clone(),
            columns,
            keys: self.load_keys(&path).await?,
            indexes: self.load_indexes(&path).await?,
            foreign_keys: self.load_foreign_keys(&path).await?,
            checks: self.load_checks(&path).await?,
        })
    }

    async fn module_definition(&mut self, module: &ObjectRef) -> Result<ModuleDefinition> {
        let path = self.object_path(&module.name);

        let rows = self.catalog_rows(SQL_MODULE, &[path.as_str()]).await?;
        if let Some(row) = rows.first() {
            return match opt_text(row, 0)? {
                Some(definition) => Ok(ModuleDefinition {
                    object: module.clone(),
                    body: ModuleBody::Sql(definition),
                }),
                None => Err(HarnessError::script_generation(
                    module.urn(),
                    "module definition is encrypted",
                )),
            };
        }

        match self.load_clr_module(&path).await? {
            Some(clr) => Ok(ModuleDefinition {
                object: module.clone(),
                body: ModuleBody::Clr(clr),
            }),
            None => Err(HarnessError::ObjectNotFound(module.urn())),
        }
    }

    async fn assembly_definition(&mut self, assembly: &ObjectRef) -> Result<AssemblyDefinition> {
        let rows = self
            .catalog_rows(ASSEMBLY_CONTENT, &[assembly.name.name.as_str()])
            .await?;
        let Some(row) = rows.first() else {
            return Err(HarnessError::ObjectNotFound(assembly.urn()));
        };

        Ok(AssemblyDefinition {
            name: text(row, 0)?,
            permission_set: permission_set(&text(row, 1)?).to_string(),
            content: row
                .try_get::<&[u8], _>(2)?
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
        })
    }

    async fn sequence_definition(&mut self, sequence: &ObjectRef) -> Result<SequenceDefinition> {
        let path = self.object_path(&sequence.name);
        let rows = self.catalog_rows(SEQUENCE, &[path.as_str()]).await?;
        let Some(row) = rows.first() else {
            return Err(HarnessError::ObjectNotFound(sequence.urn()));
        };

        Ok(SequenceDefinition {
            name: sequence.name.clone(),
            data_type: format_column_type(&text(row, 0)?, 0, int(row, 1)?, int(row, 2)?),
            start_value: text(row, 3)?,
            increment: text(row, 4)?,
            minimum_value: text(row, 5)?,
            maximum_value: text(row, 6)?,
            is_cycling: flag(row, 7)?,
            is_cached: flag(row, 8)?,
            cache_size: row.try_get::<i32, _>(9)?,
        })
    }

    async fn synonym_definition(&mut self, synonym: &ObjectRef) -> Result<SynonymDefinition> {
        let path = self.object_path(&synonym.name);
        let rows = self.catalog_rows(SYNONYM, &[path.as_str()]).await?;
        match rows.first().map(|row| opt_text(row, 0)).transpose()?.flatten() {
            Some(base_object) => Ok(SynonymDefinition {
                name: synonym.name.clone(),
                base_object,
            }),
            None => Err(HarnessError::ObjectNotFound(synonym.urn())),
        }
    }
}

/// Map `sys.assemblies.permission_set_desc` to `CREATE ASSEMBLY` syntax.
fn permission_set(desc: &str) -> &str {
    match desc {
        "SAFE_ACCESS" => "SAFE",
        "EXTERNAL_ACCESS" => "EXTERNAL_ACCESS",
        "UNSAFE_ACCESS" => "UNSAFE",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_set_mapping() {
        assert_eq!(permission_set("SAFE_ACCESS"), "SAFE");
        assert_eq!(permission_set("EXTERNAL_ACCESS"), "EXTERNAL_ACCESS");
        assert_eq!(permission_set("UNSAFE_ACCESS"), "UNSAFE");
        assert_eq!(permission_set("SOMETHING_ELSE"), "SOMETHING_ELSE");
    }

    #[test]
    fn test_catalog_queries_are_database_scoped() {
        for sql in [
            RESOLVE_OBJECT,
            RESOLVE_ASSEMBLY,
            REFERENCED_TABLES,
            REFERENCING_TABLES,
            REFERENCED_ENTITIES,
            REFERENCING_ENTITIES,
            MODULE_ASSEMBLY,
            ASSEMBLY_USERS,
            TABLE_COLUMNS,
            TABLE_KEYS,
            TABLE_INDEXES,
            TABLE_FOREIGN_KEYS,
            TABLE_CHECKS,
            SQL_MODULE,
            CLR_MODULE,
            MODULE_PARAMETERS,
            SEQUENCE,
            SYNONYM,
            ASSEMBLY_CONTENT,
        ] {
            assert!(!sql.contains(" sys."), "unscoped catalog view in {sql}");
            assert!(sql.contains("{db}.sys."));
        }
    }
}
