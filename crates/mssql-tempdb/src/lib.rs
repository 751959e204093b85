//! # mssql-tempdb
//!
//! Throwaway SQL Server databases for integration tests.
//!
//! This library provisions a fresh target database and clones objects from a
//! source database into it, together with everything they depend on:
//!
//! - **Lifecycle**: drop and recreate the target with the source collation
//! - **Dependency walking** over the catalog, ordered for creation or drop
//! - **Scripting** with fixed per-kind profiles and existence guards
//! - **Sample data**: at most 1000 rows per table, each table loaded once
//!   per session
//! - **Deletes** that drop dependents before what they depend on
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_tempdb::{Config, TempDb};
//!
//! #[tokio::main]
//! async fn main() -> mssql_tempdb::Result<()> {
//!     let config = Config::load("tempdb.yaml")?;
//!     let mut db = TempDb::from_config(&config).await?;
//!     db.create().await?;
//!     if let Err(e) = db.copy_stored_procedure("dbo.CalcTotal").await {
//!         eprintln!("{e}");
//!     }
//!     println!("Copied {} tables", db.copied_tables().len());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod copy;
pub mod drivers;
pub mod error;
pub mod identifier;
pub mod lifecycle;
pub mod logging;
pub mod script;
pub mod session;
pub mod source;
pub mod target;
pub mod value;
pub mod walker;

// Re-exports for convenient access
pub use catalog::{Catalog, Direction, ObjectKind, ObjectRef, QualifiedName};
pub use config::{Config, ConnectionSettings, CopyPlan, DbConfig, SessionSettings};
pub use copy::{CopiedTableSet, DataCopier, COPY_TIMEOUT, ROW_LIMIT};
pub use drivers::{enable_clr, MssqlConnection};
pub use error::{HarnessError, Result};
pub use logging::{line_dispatch, LogLineLayer, LogSink};
pub use script::ScriptingProfile;
pub use session::{FailedObject, Operation, OperationError, PlanReport, TempDb};
pub use value::{SqlNullType, SqlValue};
pub use walker::{DependencyNode, DependencyWalker};
