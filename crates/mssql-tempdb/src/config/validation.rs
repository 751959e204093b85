//! Configuration validation.

use super::{Config, DbConfig};
use crate::catalog::QualifiedName;
use crate::error::{HarnessError, Result};
use crate::identifier::{validate_identifier, validate_target_database};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_endpoint("source", &config.source)?;
    validate_endpoint("target", &config.target)?;

    validate_target_database(&config.target.database_name)
        .map_err(|e| HarnessError::Config(format!("target.database_name: {}", e)))?;

    // The target is dropped on every create, so it must never be the source
    if config
        .source
        .server_instance
        .eq_ignore_ascii_case(&config.target.server_instance)
        && config
            .source
            .database_name
            .eq_ignore_ascii_case(&config.target.database_name)
    {
        return Err(HarnessError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    let plan = &config.plan;
    for (section, names) in [
        ("tables", &plan.tables),
        ("views", &plan.views),
        ("procedures", &plan.procedures),
        ("functions", &plan.functions),
    ] {
        for name in names {
            QualifiedName::parse(name)
                .map_err(|e| HarnessError::Config(format!("plan.{}: {}", section, e)))?;
        }
    }

    Ok(())
}

fn validate_endpoint(section: &str, db: &DbConfig) -> Result<()> {
    if db.server_instance.trim().is_empty() {
        return Err(HarnessError::Config(format!(
            "{}.server_instance is required",
            section
        )));
    }
    if db.database_name.is_empty() {
        return Err(HarnessError::Config(format!(
            "{}.database_name is required",
            section
        )));
    }
    validate_identifier(&db.database_name)
        .map_err(|e| HarnessError::Config(format!("{}.database_name: {}", section, e)))?;
    if db.user_name.is_empty() {
        return Err(HarnessError::Config(format!(
            "{}.user_name is required",
            section
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CopyPlan;

    fn valid_config() -> Config {
        Config {
            source: DbConfig {
                database_name: "Sales".to_string(),
                user_name: "harness".to_string(),
                password: "password".to_string(),
                ..DbConfig::default()
            },
            target: DbConfig {
                user_name: "harness".to_string(),
                password: "password".to_string(),
                ..DbConfig::default()
            },
            plan: CopyPlan::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_user() {
        let mut config = valid_config();
        config.source.user_name = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source.user_name"));
    }

    #[test]
    fn test_missing_target_server() {
        let mut config = valid_config();
        config.target.server_instance = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_system_database_target_rejected() {
        let mut config = valid_config();
        config.target.database_name = "master".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("system database"));
    }

    #[test]
    fn test_same_source_and_target_rejected() {
        let mut config = valid_config();
        config.target.database_name = "sales".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("cannot be the same"));
    }

    #[test]
    fn test_same_name_on_other_server_allowed() {
        let mut config = valid_config();
        config.target.database_name = "Sales".to_string();
        config.target.server_instance = "testbox".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_malformed_plan_name_rejected() {
        let mut config = valid_config();
        config.plan.views = vec!["a.b.c.d".to_string()];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("plan.views"));
    }

    #[test]
    fn test_db_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
