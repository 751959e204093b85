//! Configuration type definitions.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database the objects are copied from.
    pub source: DbConfig,

    /// Throwaway database that is created, populated and dropped.
    pub target: DbConfig,

    /// Objects copied by `run`.
    #[serde(default)]
    pub plan: CopyPlan,
}

/// One database endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Server name, `host,port`, `host\instance` or `(local)\instance`.
    #[serde(default = "default_server_instance")]
    pub server_instance: String,

    /// Database name.
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// SQL Server login.
    #[serde(default)]
    pub user_name: String,

    /// Password for `user_name`.
    #[serde(default)]
    pub password: String,

    /// Primary data file (default: `<exe dir>/<database>.mdf`).
    #[serde(default)]
    pub data_file_path: Option<PathBuf>,

    /// Log file (default: `<exe dir>/<database>_log.ldf`).
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,

    /// Scratch script file (default: `<exe dir>/<uuid>.sql`).
    #[serde(default)]
    pub temp_file_path: Option<PathBuf>,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("server_instance", &self.server_instance)
            .field("database_name", &self.database_name)
            .field("user_name", &self.user_name)
            .field("password", &"[REDACTED]")
            .field("data_file_path", &self.data_file_path)
            .field("log_file_path", &self.log_file_path)
            .field("temp_file_path", &self.temp_file_path)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            server_instance: default_server_instance(),
            database_name: default_database_name(),
            user_name: String::new(),
            password: String::new(),
            data_file_path: None,
            log_file_path: None,
            temp_file_path: None,
            encrypt: true,
            trust_server_cert: false,
        }
    }
}

impl DbConfig {
    /// Fill in the file paths and freeze the settings.
    ///
    /// Unset or blank paths default into `runtime_dir`.
    pub fn resolve(&self, runtime_dir: &Path) -> ConnectionSettings {
        let or_default = |path: &Option<PathBuf>, file_name: String| -> PathBuf {
            match path {
                Some(p) if !p.as_os_str().is_empty() => p.clone(),
                _ => runtime_dir.join(file_name),
            }
        };

        ConnectionSettings {
            server_instance: self.server_instance.clone(),
            database_name: self.database_name.clone(),
            user_name: self.user_name.clone(),
            password: self.password.clone(),
            data_file_path: or_default(
                &self.data_file_path,
                format!("{}.mdf", self.database_name),
            ),
            log_file_path: or_default(
                &self.log_file_path,
                format!("{}_log.ldf", self.database_name),
            ),
            temp_file_path: or_default(&self.temp_file_path, format!("{}.sql", Uuid::new_v4())),
            encrypt: self.encrypt,
            trust_server_cert: self.trust_server_cert,
        }
    }
}

/// Objects to copy in a `run`, by kind. Names are `Name` or `schema.Name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyPlan {
    #[serde(default)]
    pub tables: Vec<String>,

    #[serde(default)]
    pub views: Vec<String>,

    #[serde(default)]
    pub procedures: Vec<String>,

    #[serde(default)]
    pub functions: Vec<String>,
}

impl CopyPlan {
    /// Total number of requested objects.
    pub fn len(&self) -> usize {
        self.tables.len() + self.views.len() + self.procedures.len() + self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolved, immutable settings for one endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub server_instance: String,
    pub database_name: String,
    pub user_name: String,
    pub password: String,
    pub data_file_path: PathBuf,
    pub log_file_path: PathBuf,
    pub temp_file_path: PathBuf,
    pub encrypt: bool,
    pub trust_server_cert: bool,
}

impl ConnectionSettings {
    /// ADO-style connection string logging into `database`.
    pub fn connection_string(&self, database: &str) -> String {
        self.format_connection_string(database, &self.password)
    }

    /// Connection string with the password redacted, for logs.
    pub fn identity(&self, database: &str) -> String {
        self.format_connection_string(database, "[REDACTED]")
    }

    fn format_connection_string(&self, database: &str, password: &str) -> String {
        format!(
            "Server={};Database={};User Id={};Password={};Encrypt={};TrustServerCertificate={}",
            self.server_instance,
            database,
            self.user_name,
            password,
            self.encrypt,
            self.trust_server_cert
        )
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("server_instance", &self.server_instance)
            .field("database_name", &self.database_name)
            .field("user_name", &self.user_name)
            .field("password", &"[REDACTED]")
            .field("data_file_path", &self.data_file_path)
            .field("log_file_path", &self.log_file_path)
            .field("temp_file_path", &self.temp_file_path)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Settings for both endpoints of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub source: ConnectionSettings,
    pub target: ConnectionSettings,
}

fn default_server_instance() -> String {
    r"(local)\Test".to_string()
}

fn default_database_name() -> String {
    "Set_Test".to_string()
}

fn default_true() -> bool {
    true
}
