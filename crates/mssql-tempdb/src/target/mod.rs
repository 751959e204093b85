//! Target-side capabilities: statement execution and bulk loading into the
//! throwaway database, plus the server-level calls the lifecycle needs.

use async_trait::async_trait;

use crate::catalog::{Catalog, QualifiedName};
use crate::error::Result;
use crate::value::Row;

/// Column metadata of a target table.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetColumn {
    pub name: String,
    /// Base type name (`sys.types`), alias types resolved.
    pub data_type: String,
    pub is_computed: bool,
    pub is_identity: bool,
    /// CLR user-defined type.
    pub is_clr_type: bool,
}

/// Options for a bulk load into one table.
#[derive(Debug, Clone)]
pub struct BulkLoadRequest {
    pub table: QualifiedName,
    /// Destination columns, in the order values arrive.
    pub columns: Vec<String>,
    /// Insert explicit identity values.
    pub keep_identity: bool,
    /// Hold a table lock for the duration of the load.
    pub table_lock: bool,
}

/// The database objects are scripted into.
#[async_trait]
pub trait TargetDatabase: Catalog {
    /// Execute one generated statement inside the target database.
    async fn execute(&mut self, statement: &str) -> Result<()>;

    /// Columns of a target table in `column_id` order.
    async fn table_columns(&mut self, table: &QualifiedName) -> Result<Vec<TargetColumn>>;

    /// Start a bulk load. The load borrows the connection until it is
    /// finished or aborted.
    async fn begin_bulk_load<'a>(
        &'a mut self,
        request: &BulkLoadRequest,
    ) -> Result<Box<dyn BulkLoad + 'a>>;
}

/// An in-progress bulk load.
#[async_trait]
pub trait BulkLoad: Send {
    /// Write rows; returns the number written.
    async fn send(&mut self, rows: Vec<Row>) -> Result<u64>;

    /// Commit the load; returns the total number of rows written.
    async fn finish(self: Box<Self>) -> Result<u64>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> Result<()>;
}

/// Server-level operations on the target instance.
#[async_trait]
pub trait TargetServer: Send {
    /// Whether a database with this name exists on the server.
    async fn database_exists(&mut self, name: &str) -> Result<bool>;

    /// Execute a statement outside any user database.
    async fn execute_server(&mut self, statement: &str) -> Result<()>;
}
