//! Error types for the test database harness.

use thiserror::Error;

/// Main error type for harness operations.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Configuration error (invalid YAML, missing fields, unsafe names).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server unreachable or login rejected.
    #[error("Connection to {server} failed: {source}")]
    Connection {
        server: String,
        #[source]
        source: tiberius::error::Error,
    },

    /// Unclassified database error.
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// Catalog or dependency graph query failed for a root object.
    #[error("Dependency discovery failed for {object}: {message}")]
    DependencyDiscovery { object: String, message: String },

    /// An object could not be turned into executable statements.
    #[error("Script generation failed for {object}: {message}")]
    ScriptGeneration { object: String, message: String },

    /// The target rejected a generated statement.
    #[error("Statement execution failed: {message}\n  Statement: {statement}")]
    StatementExecution { statement: String, message: String },

    /// Reading, writing or timing out during a table data copy.
    #[error("Data copy failed for table {table}: {message}")]
    DataCopy { table: String, message: String },

    /// Creating or dropping the target database failed.
    #[error("Lifecycle operation failed for database {database}: {message}")]
    Lifecycle { database: String, message: String },

    /// A requested object does not exist in the catalog.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// A read or load step exceeded its timeout.
    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Create a DependencyDiscovery error for a root object.
    pub fn dependency_discovery(object: impl Into<String>, message: impl ToString) -> Self {
        HarnessError::DependencyDiscovery {
            object: object.into(),
            message: message.to_string(),
        }
    }

    /// Create a ScriptGeneration error.
    pub fn script_generation(object: impl Into<String>, message: impl Into<String>) -> Self {
        HarnessError::ScriptGeneration {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Create a StatementExecution error, keeping the rejected statement.
    pub fn statement(statement: impl Into<String>, message: impl ToString) -> Self {
        HarnessError::StatementExecution {
            statement: statement.into(),
            message: message.to_string(),
        }
    }

    /// Create a DataCopy error.
    pub fn data_copy(table: impl Into<String>, message: impl ToString) -> Self {
        HarnessError::DataCopy {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Lifecycle error.
    pub fn lifecycle(database: impl Into<String>, message: impl ToString) -> Self {
        HarnessError::Lifecycle {
            database: database.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code used by the command line driver.
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::Config(_) | HarnessError::Yaml(_) => 2,
            HarnessError::Connection { .. } => 3,
            HarnessError::Lifecycle { .. } => 4,
            HarnessError::Io(_) => 5,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(HarnessError::Config("x".into()).exit_code(), 2);
        assert_eq!(HarnessError::lifecycle("Set_Test", "boom").exit_code(), 4);
        assert_eq!(HarnessError::data_copy("dbo.Orders", "boom").exit_code(), 1);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(HarnessError::Io(io).exit_code(), 5);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "tempdb.yaml missing");
        let err = HarnessError::Io(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: tempdb.yaml missing"));
    }

    #[test]
    fn test_statement_error_keeps_statement() {
        let err = HarnessError::statement("DROP TABLE [dbo].[T]", "permission denied");
        let text = err.to_string();
        assert!(text.contains("permission denied"));
        assert!(text.contains("DROP TABLE [dbo].[T]"));
    }
}
