//! Microsoft SQL Server driver.
//!
//! This module provides the tiberius-backed implementations:
//!
//! - [`MssqlConnection`]: one TDS session bound to a working database
//! - catalog: [`Catalog`](crate::catalog::Catalog) and
//!   [`DefinitionSource`](crate::source::DefinitionSource) over `sys.*` views
//! - reader: [`RowSource`](crate::source::RowSource) sample reads
//! - writer: [`TargetDatabase`](crate::target::TargetDatabase),
//!   [`TargetServer`](crate::target::TargetServer) and bulk loads

mod catalog;
mod reader;
mod writer;

pub use reader::MssqlSampleReader;
pub use writer::MssqlBulkLoad;

use std::fmt;

use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query, Row, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::ConnectionSettings;
use crate::error::{HarnessError, Result};
use crate::lifecycle::ENABLE_CLR_SQL;

/// Database every server-level statement runs in.
pub const MASTER_DATABASE: &str = "master";

const APPLICATION_NAME: &str = "mssql-tempdb";

/// Parsed `server_instance` value.
///
/// Accepts `host`, `host,port`, `host\instance` and an optional `tcp:`
/// prefix. `(local)` and `.` mean the local machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: Option<u16>,
    pub instance: Option<String>,
}

impl ServerAddress {
    pub fn parse(server: &str) -> Result<Self> {
        let trimmed = server.trim();
        let without_prefix = match trimmed.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("tcp:") => &trimmed[4..],
            _ => trimmed,
        };

        let (host_part, port) = match without_prefix.split_once(',') {
            Some((host, port)) => {
                let port = port.trim().parse::<u16>().map_err(|_| {
                    HarnessError::Config(format!("invalid port in server name {:?}", server))
                })?;
                (host, Some(port))
            }
            None => (without_prefix, None),
        };

        let (host, instance) = match host_part.split_once('\\') {
            Some((host, instance)) if !instance.trim().is_empty() => {
                (host.trim(), Some(instance.trim().to_string()))
            }
            Some((host, _)) => (host.trim(), None),
            None => (host_part.trim(), None),
        };

        if host.is_empty() {
            return Err(HarnessError::Config(format!(
                "server name {:?} has no host",
                server
            )));
        }

        let host = match host.to_ascii_lowercase().as_str() {
            "(local)" | "." | "localhost" => "localhost".to_string(),
            _ => host.to_string(),
        };

        Ok(Self {
            host,
            port,
            instance,
        })
    }

    /// Whether the port has to be looked up through the SQL Browser service.
    pub fn needs_browser(&self) -> bool {
        self.instance.is_some() && self.port.is_none()
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host)?;
        if let Some(instance) = &self.instance {
            write!(f, "\\{}", instance)?;
        }
        if let Some(port) = self.port {
            write!(f, ",{}", port)?;
        }
        Ok(())
    }
}

/// A single SQL Server session.
///
/// The session logs into `login_database` but statements issued through the
/// catalog, reader and writer address `database` explicitly, so a target
/// connection can stay in `master` while the working database is dropped and
/// recreated underneath it.
pub struct MssqlConnection {
    client: Client<Compat<TcpStream>>,
    database: String,
    server: String,
}

impl MssqlConnection {
    /// Open a session for reading the source database.
    pub async fn source(settings: &ConnectionSettings) -> Result<Self> {
        Self::open(settings, &settings.database_name, &settings.database_name).await
    }

    /// Open a session for the target; it logs into `master`.
    pub async fn target(settings: &ConnectionSettings) -> Result<Self> {
        Self::open(settings, MASTER_DATABASE, &settings.database_name).await
    }

    pub async fn open(
        settings: &ConnectionSettings,
        login_database: &str,
        working_database: &str,
    ) -> Result<Self> {
        let address = ServerAddress::parse(&settings.server_instance)?;
        let server = settings.server_instance.clone();

        info!(" - {}", settings.identity(login_database));
        let config = build_config(settings, &address, login_database);
        let client = connect(config, &address)
            .await
            .map_err(|source| HarnessError::Connection {
                server: server.clone(),
                source,
            })?;
        debug!("Connected to {} as {}", address, settings.user_name);

        Ok(Self {
            client,
            database: working_database.to_string(),
            server,
        })
    }

    /// Working database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Server name as configured.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Round trip to check the session is alive.
    pub async fn ping(&mut self) -> Result<()> {
        self.client.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    pub(crate) fn client(&mut self) -> &mut Client<Compat<TcpStream>> {
        &mut self.client
    }

    /// Run a query with string parameters bound to `@P1..@Pn` and collect
    /// the first result set.
    pub(crate) async fn query_rows(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>> {
        let mut query = Query::new(sql);
        for param in params {
            query.bind(*param);
        }
        let rows = query
            .query(&mut self.client)
            .await?
            .into_first_result()
            .await?;
        Ok(rows)
    }

    /// Run a parameterless batch and discard any results.
    pub(crate) async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}

impl fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("server", &self.server)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Turn on CLR integration using an ADO-style connection string.
pub async fn enable_clr(connection_string: &str) -> Result<()> {
    let server = ado_value(connection_string, "server")
        .ok_or_else(|| HarnessError::Config("connection string has no Server".into()))?;
    let address = ServerAddress::parse(server)?;
    let mut config = Config::from_ado_string(connection_string)?;
    config.application_name(APPLICATION_NAME);

    let mut client = connect(config, &address)
        .await
        .map_err(|source| HarnessError::Connection {
            server: server.to_string(),
            source,
        })?;

    info!("Enabling CLR integration");
    client.simple_query(ENABLE_CLR_SQL).await?.into_results().await?;
    client.close().await?;
    Ok(())
}

/// Value of `key` in an ADO connection string, matched case-insensitively.
fn ado_value<'a>(connection_string: &'a str, key: &str) -> Option<&'a str> {
    connection_string
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
}

fn build_config(settings: &ConnectionSettings, address: &ServerAddress, database: &str) -> Config {
    let mut config = Config::new();
    config.host(&address.host);
    if let Some(port) = address.port {
        config.port(port);
    }
    if let Some(instance) = &address.instance {
        config.instance_name(instance);
    }
    config.database(database);
    config.application_name(APPLICATION_NAME);
    config.authentication(AuthMethod::sql_server(&settings.user_name, &settings.password));

    if settings.encrypt {
        if settings.trust_server_cert {
            config.trust_cert();
        }
        config.encryption(EncryptionLevel::Required);
    } else {
        config.encryption(EncryptionLevel::NotSupported);
    }

    config
}

async fn connect(
    config: Config,
    address: &ServerAddress,
) -> tiberius::Result<Client<Compat<TcpStream>>> {
    let tcp = open_tcp(&config, address.needs_browser()).await?;
    Client::connect(config, tcp.compat_write()).await
}

async fn open_tcp(config: &Config, via_browser: bool) -> tiberius::Result<TcpStream> {
    let tcp = if via_browser {
        TcpStream::connect_named(config).await?
    } else {
        TcpStream::connect(config.get_addr()).await?
    };
    tcp.set_nodelay(true).ok();
    Ok(tcp)
}

/// Read a text column, treating NULL as empty.
pub(crate) fn text(row: &Row, idx: usize) -> Result<String> {
    Ok(row
        .try_get::<&str, _>(idx)?
        .map(str::to_string)
        .unwrap_or_default())
}

/// Read a nullable text column.
pub(crate) fn opt_text(row: &Row, idx: usize) -> Result<Option<String>> {
    Ok(row.try_get::<&str, _>(idx)?.map(str::to_string))
}

/// Read an `INT` column (callers `CAST` to `INT`), treating NULL as zero.
pub(crate) fn int(row: &Row, idx: usize) -> Result<i32> {
    Ok(row.try_get::<i32, _>(idx)?.unwrap_or(0))
}

/// Read an `INT` flag column as a bool.
pub(crate) fn flag(row: &Row, idx: usize) -> Result<bool> {
    Ok(int(row, idx)? != 0)
}
