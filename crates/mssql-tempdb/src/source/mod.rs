//! Source-side capabilities: object definitions and bounded row samples.

use async_trait::async_trait;

use crate::catalog::{
    AssemblyDefinition, Catalog, ModuleDefinition, ObjectRef, QualifiedName, SequenceDefinition,
    SynonymDefinition, TableDefinition,
};
use crate::error::Result;
use crate::value::Row;

/// One column of a sample read.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleColumn {
    /// Column name.
    pub name: String,
    /// Base type name, used to pick a projection cast and a NULL type.
    pub data_type: String,
    /// CLR user-defined type (hierarchyid, geometry, ...).
    pub is_clr_type: bool,
}

/// Options for reading a capped, unordered sample of a table.
#[derive(Debug, Clone)]
pub struct SampleRequest {
    pub table: QualifiedName,
    /// Columns to read, in insert order.
    pub columns: Vec<SampleColumn>,
    /// Maximum number of rows (`TOP (n)`).
    pub limit: usize,
}

/// Schema definitions needed to recreate objects elsewhere.
#[async_trait]
pub trait DefinitionSource: Catalog {
    /// Default collation of the database.
    async fn collation(&mut self) -> Result<String>;

    /// Columns, keys, indexes, foreign keys and checks of a table.
    async fn table_definition(&mut self, table: &ObjectRef) -> Result<TableDefinition>;

    /// T-SQL or CLR definition of a view, procedure, function or other module.
    async fn module_definition(&mut self, module: &ObjectRef) -> Result<ModuleDefinition>;

    /// Assembly metadata and primary file bits.
    async fn assembly_definition(&mut self, assembly: &ObjectRef) -> Result<AssemblyDefinition>;

    /// Type, bounds and options of a sequence.
    async fn sequence_definition(&mut self, sequence: &ObjectRef) -> Result<SequenceDefinition>;

    /// Base object of a synonym.
    async fn synonym_definition(&mut self, synonym: &ObjectRef) -> Result<SynonymDefinition>;
}

/// Streaming reads of sample rows.
#[async_trait]
pub trait RowSource: Send {
    /// Start a `TOP (limit)` read. The reader borrows the connection until it
    /// is closed.
    async fn open_sample<'a>(
        &'a mut self,
        request: &SampleRequest,
    ) -> Result<Box<dyn SampleReader + 'a>>;
}

/// An open sample read.
#[async_trait]
pub trait SampleReader: Send {
    /// Up to `max_rows` further rows; an empty vector once exhausted.
    async fn next_chunk(&mut self, max_rows: usize) -> Result<Vec<Row>>;

    /// Release the read. Must be called on every exit path.
    async fn close(self: Box<Self>) -> Result<()>;
}
