//! Database driver implementations.
//!
//! - [`mssql`]: SQL Server over tiberius, implementing the catalog, source
//!   and target traits on a single [`MssqlConnection`]

pub mod mssql;

pub use mssql::{enable_clr, MssqlConnection, ServerAddress};
