//! Create and drop the target database.

use tracing::{debug, info};

use crate::config::ConnectionSettings;
use crate::error::{HarnessError, Result};
use crate::identifier::{quote_ident, string_literal, validate_collation, validate_target_database};
use crate::source::DefinitionSource;
use crate::target::TargetServer;

/// Statements that turn on CLR integration for the instance.
pub const ENABLE_CLR_SQL: &str = "exec sp_configure 'show advanced options', 1; RECONFIGURE; \
                                  exec sp_configure 'clr enabled', 1; RECONFIGURE;";

/// `ALTER DATABASE ... SET SINGLE_USER WITH ROLLBACK IMMEDIATE`.
pub fn single_user_sql(database: &str) -> String {
    format!(
        "ALTER DATABASE {} SET SINGLE_USER WITH ROLLBACK IMMEDIATE",
        quote_ident(database)
    )
}

pub fn drop_database_sql(database: &str) -> String {
    format!("DROP DATABASE {}", quote_ident(database))
}

/// `CREATE DATABASE` with one primary data file and one log file, both
/// growing by 10%.
pub fn create_database_sql(settings: &ConnectionSettings, collation: &str) -> Result<String> {
    validate_target_database(&settings.database_name)?;
    validate_collation(collation)?;

    let name = &settings.database_name;
    Ok(format!(
        "CREATE DATABASE {db}\nON PRIMARY (NAME = {data_name}, FILENAME = {data_file}, FILEGROWTH = 10%)\nLOG ON (NAME = {log_name}, FILENAME = {log_file}, FILEGROWTH = 10%)\nCOLLATE {collation}",
        db = quote_ident(name),
        data_name = quote_ident(name),
        data_file = string_literal(&settings.data_file_path.to_string_lossy()),
        log_name = quote_ident(&format!("{}_log", name)),
        log_file = string_literal(&settings.log_file_path.to_string_lossy()),
        collation = collation,
    ))
}

pub fn trustworthy_sql(database: &str) -> String {
    format!("ALTER DATABASE {} SET TRUSTWORTHY ON", quote_ident(database))
}

/// Drop the target database if it exists.
///
/// The database is forced into single-user mode first so open sessions
/// cannot block the drop. Does nothing when the database is absent.
pub async fn delete<T>(server: &mut T, settings: &ConnectionSettings) -> Result<()>
where
    T: TargetServer + ?Sized,
{
    let name = &settings.database_name;
    validate_target_database(name)?;

    let exists = server
        .database_exists(name)
        .await
        .map_err(|e| HarnessError::lifecycle(name.as_str(), e))?;
    if !exists {
        debug!("Database {} does not exist, nothing to delete", name);
        return Ok(());
    }

    info!("Placing {} into single user mode", name);
    server
        .execute_server(&single_user_sql(name))
        .await
        .map_err(|e| HarnessError::lifecycle(name.as_str(), e))?;

    info!("Killing Database {}", name);
    server
        .execute_server(&drop_database_sql(name))
        .await
        .map_err(|e| HarnessError::lifecycle(name.as_str(), e))?;

    Ok(())
}

/// Recreate the target database with the source database's collation.
pub async fn create<S, T>(source: &mut S, server: &mut T, settings: &ConnectionSettings) -> Result<()>
where
    S: DefinitionSource + ?Sized,
    T: TargetServer + ?Sized,
{
    delete(server, settings).await?;

    let name = &settings.database_name;
    let collation = source
        .collation()
        .await
        .map_err(|e| HarnessError::lifecycle(name.as_str(), e))?;
    let create_sql = create_database_sql(settings, &collation)?;

    info!("Creating target database {}", name);
    debug!("{}", create_sql);
    server
        .execute_server(&create_sql)
        .await
        .map_err(|e| HarnessError::lifecycle(name.as_str(), e))?;
    server
        .execute_server(&trustworthy_sql(name))
        .await
        .map_err(|e| HarnessError::lifecycle(name.as_str(), e))?;

    Ok(())
}

/// Enable CLR integration on the target instance.
pub async fn enable_clr<T>(server: &mut T) -> Result<()>
where
    T: TargetServer + ?Sized,
{
    info!("Enabling CLR integration");
    server.execute_server(ENABLE_CLR_SQL).await
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            server_instance: r"(local)\Test".into(),
            database_name: "Set_Test".into(),
            user_name: "harness".into(),
            password: "secret".into(),
            data_file_path: PathBuf::from(r"C:\harness\Set_Test.mdf"),
            log_file_path: PathBuf::from(r"C:\harness\O'Neil\Set_Test_log.ldf"),
            temp_file_path: PathBuf::from(r"C:\harness\tmp.sql"),
            encrypt: true,
            trust_server_cert: false,
        }
    }

    #[test]
    fn test_single_user_sql() {
        assert_eq!(
            single_user_sql("Set_Test"),
            "ALTER DATABASE [Set_Test] SET SINGLE_USER WITH ROLLBACK IMMEDIATE"
        );
    }

    #[test]
    fn test_create_database_sql() {
        let sql = create_database_sql(&settings(), "Latin1_General_CI_AI").unwrap();
        assert!(sql.starts_with("CREATE DATABASE [Set_Test]\n"));
        assert!(sql.contains(
            r"ON PRIMARY (NAME = [Set_Test], FILENAME = N'C:\harness\Set_Test.mdf', FILEGROWTH = 10%)"
        ));
        assert!(sql.contains(
            r"LOG ON (NAME = [Set_Test_log], FILENAME = N'C:\harness\O''Neil\Set_Test_log.ldf', FILEGROWTH = 10%)"
        ));
        assert!(sql.ends_with("COLLATE Latin1_General_CI_AI"));
    }

    #[test]
    fn test_create_database_sql_rejects_bad_collation() {
        assert!(create_database_sql(&settings(), "Latin1 --").is_err());
    }

    #[test]
    fn test_create_database_sql_rejects_system_database() {
        let mut settings = settings();
        settings.database_name = "msdb".into();
        assert!(create_database_sql(&settings, "Latin1_General_CI_AI").is_err());
    }

    #[test]
    fn test_trustworthy_sql() {
        assert_eq!(trustworthy_sql("Set_Test"), "ALTER DATABASE [Set_Test] SET TRUSTWORTHY ON");
    }
}
