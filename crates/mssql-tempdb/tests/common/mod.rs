//! In-memory source and target databases for session tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use mssql_tempdb::catalog::{
    AssemblyDefinition, ClrModule, ColumnDefinition, ComputedSpec, ForeignKeyDefinition,
    IdentitySpec, ModuleBody, ModuleDefinition, SequenceDefinition, SynonymDefinition,
    TableDefinition,
};
use mssql_tempdb::source::{DefinitionSource, RowSource, SampleReader, SampleRequest};
use mssql_tempdb::target::{BulkLoad, BulkLoadRequest, TargetColumn, TargetDatabase, TargetServer};
use mssql_tempdb::value::Row;
use mssql_tempdb::{
    Catalog, ConnectionSettings, Direction, HarnessError, ObjectKind, ObjectRef, QualifiedName,
    Result, SessionSettings, SqlValue, TempDb,
};

pub const SOURCE_DB: &str = "Sales";
pub const TARGET_DB: &str = "Sales_Test";
pub const COLLATION: &str = "Latin1_General_CI_AS";

pub fn settings() -> SessionSettings {
    let endpoint = |database: &str| ConnectionSettings {
        server_instance: "localhost".into(),
        database_name: database.into(),
        user_name: "harness".into(),
        password: "secret".into(),
        data_file_path: PathBuf::from(format!("/var/opt/mssql/data/{}.mdf", database)),
        log_file_path: PathBuf::from(format!("/var/opt/mssql/data/{}_log.ldf", database)),
        temp_file_path: PathBuf::from("/tmp/harness.sql"),
        encrypt: false,
        trust_server_cert: true,
    };
    SessionSettings {
        source: endpoint(SOURCE_DB),
        target: endpoint(TARGET_DB),
    }
}

pub fn session(source: FakeSource, target: FakeTarget) -> TempDb<FakeSource, FakeTarget> {
    TempDb::new(settings(), source, target)
}

pub fn view(name: &str) -> ObjectRef {
    ObjectRef::new(ObjectKind::View, QualifiedName::new("dbo", name))
}

pub fn procedure(name: &str) -> ObjectRef {
    ObjectRef::new(ObjectKind::StoredProcedure, QualifiedName::new("dbo", name))
}

pub fn function(name: &str) -> ObjectRef {
    ObjectRef::new(ObjectKind::UserDefinedFunction, QualifiedName::new("dbo", name))
}

pub fn int_column(name: &str) -> ColumnDefinition {
    ColumnDefinition {
        name: name.into(),
        data_type: "int".into(),
        max_length: 4,
        precision: 10,
        is_nullable: false,
        ..ColumnDefinition::default()
    }
}

pub fn identity_column(name: &str) -> ColumnDefinition {
    ColumnDefinition {
        identity: Some(IdentitySpec {
            seed: "1".into(),
            increment: "1".into(),
        }),
        ..int_column(name)
    }
}

pub fn computed_column(name: &str, expression: &str) -> ColumnDefinition {
    ColumnDefinition {
        computed: Some(ComputedSpec {
            expression: expression.into(),
            persisted: false,
        }),
        ..int_column(name)
    }
}

pub fn table_definition(name: &str, columns: Vec<ColumnDefinition>) -> TableDefinition {
    TableDefinition {
        name: QualifiedName::new("dbo", name),
        columns,
        ..TableDefinition::default()
    }
}

pub fn foreign_key(name: &str, column: &str, referenced: &str) -> ForeignKeyDefinition {
    ForeignKeyDefinition {
        name: name.into(),
        columns: vec![column.into()],
        referenced_table: QualifiedName::new("dbo", referenced),
        referenced_columns: vec![column.into()],
        on_delete: "NO_ACTION".into(),
        on_update: "NO_ACTION".into(),
    }
}

/// `count` integer rows of `width` columns, numbered from 1.
pub fn int_rows(count: i32, width: usize) -> Vec<Row> {
    (1..=count).map(|i| vec![SqlValue::I32(i); width]).collect()
}

// =============================================================================
// Source
// =============================================================================

/// Source database holding definitions, dependency edges and table rows.
#[derive(Default)]
pub struct FakeSource {
    objects: Vec<ObjectRef>,
    edges: HashMap<String, Vec<ObjectRef>>,
    tables: HashMap<String, TableDefinition>,
    modules: HashMap<String, ModuleBody>,
    assemblies: HashMap<String, AssemblyDefinition>,
    sequences: HashMap<String, SequenceDefinition>,
    synonyms: HashMap<String, SynonymDefinition>,
    rows: HashMap<String, Vec<Row>>,
    /// Sample requests in the order they were opened.
    pub samples: Vec<SampleRequest>,
    /// Readers closed so far.
    pub closed_readers: usize,
    /// Catalog calls that fail for this object name.
    pub fail_dependencies_of: Option<String>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, definition: TableDefinition, rows: Vec<Row>) -> Self {
        let object = ObjectRef::new(ObjectKind::Table, definition.name.clone());
        for fk in &definition.foreign_keys {
            let referenced = ObjectRef::new(ObjectKind::Table, fk.referenced_table.clone());
            self.edges.entry(object.urn()).or_default().push(referenced);
        }
        self.rows.insert(object.urn(), rows);
        self.tables.insert(object.urn(), definition);
        self.objects.push(object);
        self
    }

    pub fn with_module(mut self, object: ObjectRef, body: &str) -> Self {
        self.modules.insert(object.urn(), ModuleBody::Sql(body.into()));
        self.objects.push(object);
        self
    }

    /// CLR module; `object` should carry a CLR type code (`PC`, `FS`).
    pub fn with_clr_module(mut self, object: ObjectRef, clr: ClrModule) -> Self {
        self.modules.insert(object.urn(), ModuleBody::Clr(clr));
        self.objects.push(object);
        self
    }

    pub fn with_assembly(mut self, definition: AssemblyDefinition) -> Self {
        self.assemblies
            .insert(ObjectRef::assembly(&definition.name).urn(), definition);
        self
    }

    pub fn with_sequence(mut self, definition: SequenceDefinition) -> Self {
        let object = ObjectRef::from_type_code("SO", definition.name.clone());
        self.sequences.insert(object.urn(), definition);
        self
    }

    pub fn with_synonym(mut self, definition: SynonymDefinition) -> Self {
        let object = ObjectRef::from_type_code("SN", definition.name.clone());
        self.synonyms.insert(object.urn(), definition);
        self
    }

    /// `from` depends on `to`.
    pub fn with_dependency(mut self, from: &ObjectRef, to: ObjectRef) -> Self {
        self.edges.entry(from.urn()).or_default().push(to);
        self
    }
}

#[async_trait]
impl Catalog for FakeSource {
    fn database(&self) -> &str {
        SOURCE_DB
    }

    async fn resolve(&mut self, kind: ObjectKind, name: &QualifiedName) -> Result<Option<ObjectRef>> {
        Ok(self
            .objects
            .iter()
            .find(|o| o.kind == kind && &o.name == name)
            .cloned())
    }

    async fn dependencies(&mut self, object: &ObjectRef, direction: Direction) -> Result<Vec<ObjectRef>> {
        assert_eq!(direction, Direction::Source);
        if self.fail_dependencies_of.as_deref() == Some(object.name.name.as_str()) {
            return Err(HarnessError::Config("catalog view unavailable".into()));
        }
        Ok(self.edges.get(&object.urn()).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl DefinitionSource for FakeSource {
    async fn collation(&mut self) -> Result<String> {
        Ok(COLLATION.into())
    }

    async fn table_definition(&mut self, table: &ObjectRef) -> Result<TableDefinition> {
        self.tables
            .get(&table.urn())
            .cloned()
            .ok_or_else(|| HarnessError::ObjectNotFound(table.urn()))
    }

    async fn module_definition(&mut self, module: &ObjectRef) -> Result<ModuleDefinition> {
        let body = self
            .modules
            .get(&module.urn())
            .cloned()
            .ok_or_else(|| HarnessError::ObjectNotFound(module.urn()))?;
        Ok(ModuleDefinition {
            object: module.clone(),
            body,
        })
    }

    async fn assembly_definition(&mut self, assembly: &ObjectRef) -> Result<AssemblyDefinition> {
        self.assemblies
            .get(&assembly.urn())
            .cloned()
            .ok_or_else(|| HarnessError::ObjectNotFound(assembly.urn()))
    }

    async fn sequence_definition(&mut self, sequence: &ObjectRef) -> Result<SequenceDefinition> {
        self.sequences
            .get(&sequence.urn())
            .cloned()
            .ok_or_else(|| HarnessError::ObjectNotFound(sequence.urn()))
    }

    async fn synonym_definition(&mut self, synonym: &ObjectRef) -> Result<SynonymDefinition> {
        self.synonyms
            .get(&synonym.urn())
            .cloned()
            .ok_or_else(|| HarnessError::ObjectNotFound(synonym.urn()))
    }
}

#[async_trait]
impl RowSource for FakeSource {
    async fn open_sample<'a>(
        &'a mut self,
        request: &SampleRequest,
    ) -> Result<Box<dyn SampleReader + 'a>> {
        let urn = ObjectRef::new(ObjectKind::Table, request.table.clone()).urn();
        let rows = self.rows.get(&urn).cloned().unwrap_or_default();
        self.samples.push(request.clone());
        Ok(Box::new(FakeReader {
            rows: rows.into_iter(),
            closed: &mut self.closed_readers,
        }))
    }
}

/// Reader that ignores the request limit so the copier's own cap is what
/// stops it.
struct FakeReader<'a> {
    rows: std::vec::IntoIter<Row>,
    closed: &'a mut usize,
}

#[async_trait]
impl SampleReader for FakeReader<'_> {
    async fn next_chunk(&mut self, max_rows: usize) -> Result<Vec<Row>> {
        Ok(self.rows.by_ref().take(max_rows).collect())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        *self.closed += 1;
        Ok(())
    }
}

// =============================================================================
// Target
// =============================================================================

/// Target server and database that records everything executed against it.
#[derive(Default)]
pub struct FakeTarget {
    /// Databases present on the server.
    pub databases: HashSet<String>,
    /// Statements run at server scope.
    pub server_statements: Vec<String>,
    /// Statements run inside the target database.
    pub statements: Vec<String>,
    objects: Vec<ObjectRef>,
    dependents: HashMap<String, Vec<ObjectRef>>,
    columns: HashMap<QualifiedName, Vec<TargetColumn>>,
    /// Committed rows per table.
    pub loaded: HashMap<QualifiedName, Vec<Row>>,
    /// Number of completed bulk loads per table.
    pub load_count: HashMap<QualifiedName, usize>,
    /// Tables whose bulk load was aborted.
    pub aborted: Vec<QualifiedName>,
    /// Bulk loads into this table fail on the first send.
    pub fail_load_of: Option<QualifiedName>,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target whose tables mirror the source definitions.
    pub fn mirroring(definitions: &[TableDefinition]) -> Self {
        let mut target = Self::new();
        for definition in definitions {
            target.columns.insert(
                definition.name.clone(),
                definition
                    .columns
                    .iter()
                    .map(|c| TargetColumn {
                        name: c.name.clone(),
                        data_type: c.data_type.clone(),
                        is_computed: c.computed.is_some(),
                        is_identity: c.identity.is_some(),
                        is_clr_type: false,
                    })
                    .collect(),
            );
        }
        target
    }

    pub fn with_database(mut self, name: &str) -> Self {
        self.databases.insert(name.into());
        self
    }

    pub fn with_object(mut self, object: ObjectRef) -> Self {
        self.objects.push(object);
        self
    }

    /// `dependent` depends on `object`.
    pub fn with_dependent(mut self, object: &ObjectRef, dependent: ObjectRef) -> Self {
        self.dependents.entry(object.urn()).or_default().push(dependent);
        self
    }

    /// Statements naming `object`, in execution order.
    pub fn statements_for(&self, object: &str) -> Vec<&str> {
        self.statements
            .iter()
            .filter(|s| s.contains(object))
            .map(String::as_str)
            .collect()
    }

    fn database_named(statement: &str, prefix: &str) -> Option<String> {
        let rest = statement.strip_prefix(prefix)?;
        let name = rest.strip_prefix('[')?;
        let end = name.find(']')?;
        Some(name[..end].to_string())
    }
}

#[async_trait]
impl Catalog for FakeTarget {
    fn database(&self) -> &str {
        TARGET_DB
    }

    async fn resolve(&mut self, kind: ObjectKind, name: &QualifiedName) -> Result<Option<ObjectRef>> {
        Ok(self
            .objects
            .iter()
            .find(|o| o.kind == kind && &o.name == name)
            .cloned())
    }

    async fn dependencies(&mut self, object: &ObjectRef, direction: Direction) -> Result<Vec<ObjectRef>> {
        assert_eq!(direction, Direction::Target);
        Ok(self.dependents.get(&object.urn()).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl TargetDatabase for FakeTarget {
    async fn execute(&mut self, statement: &str) -> Result<()> {
        self.statements.push(statement.to_string());
        Ok(())
    }

    async fn table_columns(&mut self, table: &QualifiedName) -> Result<Vec<TargetColumn>> {
        self.columns
            .get(table)
            .cloned()
            .ok_or_else(|| HarnessError::ObjectNotFound(table.to_string()))
    }

    async fn begin_bulk_load<'a>(
        &'a mut self,
        request: &BulkLoadRequest,
    ) -> Result<Box<dyn BulkLoad + 'a>> {
        let fail = self.fail_load_of.as_ref() == Some(&request.table);
        Ok(Box::new(FakeLoad {
            target: self,
            table: request.table.clone(),
            rows: Vec::new(),
            fail,
        }))
    }
}

#[async_trait]
impl TargetServer for FakeTarget {
    async fn database_exists(&mut self, name: &str) -> Result<bool> {
        Ok(self.databases.contains(name))
    }

    async fn execute_server(&mut self, statement: &str) -> Result<()> {
        if let Some(name) = Self::database_named(statement, "CREATE DATABASE ") {
            self.databases.insert(name);
        } else if let Some(name) = Self::database_named(statement, "DROP DATABASE ") {
            self.databases.remove(&name);
        }
        self.server_statements.push(statement.to_string());
        Ok(())
    }
}

struct FakeLoad<'a> {
    target: &'a mut FakeTarget,
    table: QualifiedName,
    rows: Vec<Row>,
    fail: bool,
}

#[async_trait]
impl BulkLoad for FakeLoad<'_> {
    async fn send(&mut self, rows: Vec<Row>) -> Result<u64> {
        if self.fail {
            return Err(HarnessError::data_copy(
                self.table.to_string(),
                "String or binary data would be truncated",
            ));
        }
        let count = rows.len() as u64;
        self.rows.extend(rows);
        Ok(count)
    }

    async fn finish(self: Box<Self>) -> Result<u64> {
        let FakeLoad {
            target, table, rows, ..
        } = *self;
        let count = rows.len() as u64;
        *target.load_count.entry(table.clone()).or_default() += 1;
        target.loaded.insert(table, rows);
        Ok(count)
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        let FakeLoad { target, table, .. } = *self;
        target.aborted.push(table);
        Ok(())
    }
}
