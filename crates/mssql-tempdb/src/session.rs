//! The `TempDb` session: one source and one target connection driving the
//! lifecycle, copy and delete operations.

use std::fmt;
use std::future::Future;

use serde::Serialize;
use thiserror::Error;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, Dispatch};

use crate::catalog::{Catalog, Direction, ObjectKind, ObjectRef, QualifiedName};
use crate::config::{Config, CopyPlan, SessionSettings};
use crate::copy::{CopiedTableSet, DataCopier};
use crate::drivers::MssqlConnection;
use crate::error::{HarnessError, Result};
use crate::lifecycle;
use crate::script;
use crate::source::{DefinitionSource, RowSource};
use crate::target::{TargetDatabase, TargetServer};
use crate::walker::DependencyWalker;

/// Per-object operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Copy,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Copy => write!(f, "copy"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// A copy or delete of one requested object failed.
///
/// The session stays usable; the failure has already been logged.
#[derive(Debug, Error)]
#[error("Failed to {operation} {object}: {source}")]
pub struct OperationError {
    pub operation: Operation,
    /// URN of the requested object, or the raw name if it did not parse.
    pub object: String,
    #[source]
    pub source: HarnessError,
}

impl OperationError {
    /// Connection and lifecycle failures end the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.source,
            HarnessError::Connection { .. } | HarnessError::Lifecycle { .. }
        )
    }
}

/// One failed object in a [`PlanReport`].
#[derive(Debug, Clone, Serialize)]
pub struct FailedObject {
    pub object: String,
    pub error: String,
}

/// Outcome of [`TempDb::execute_plan`].
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub operation: Operation,
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedObject>,
    /// Tables whose data was copied during the session, in copy order.
    pub copied_tables: Vec<String>,
}

impl PlanReport {
    fn new(operation: Operation) -> Self {
        Self {
            operation,
            succeeded: Vec::new(),
            failed: Vec::new(),
            copied_tables: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Serialize the report to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A throwaway target database and the source it is populated from.
///
/// Both connections are opened once and reused by every operation. Tables
/// whose data has been copied are remembered for the life of the session,
/// so a table shared by several requested objects is loaded only once.
pub struct TempDb<S = MssqlConnection, T = MssqlConnection> {
    settings: SessionSettings,
    source: S,
    target: T,
    copier: DataCopier,
    dispatch: Option<Dispatch>,
}

impl TempDb<MssqlConnection, MssqlConnection> {
    /// Open the source and target connections.
    pub async fn connect(settings: SessionSettings) -> Result<Self> {
        info!("Creating source connection");
        let source = MssqlConnection::source(&settings.source).await?;

        info!("Creating target connection");
        let target = MssqlConnection::target(&settings.target).await?;

        Ok(Self::new(settings, source, target))
    }

    /// Resolve a loaded configuration and connect.
    pub async fn from_config(config: &Config) -> Result<Self> {
        info!("Getting configuration details");
        let settings = config.resolve()?;
        Self::connect(settings).await
    }

    /// Round trip on both connections.
    pub async fn ping(&mut self) -> Result<()> {
        self.source.ping().await?;
        self.target.ping().await
    }
}

impl<S, T> TempDb<S, T>
where
    S: DefinitionSource + RowSource,
    T: TargetDatabase + TargetServer,
{
    /// Build a session over already-open endpoints.
    pub fn new(settings: SessionSettings, source: S, target: T) -> Self {
        Self {
            settings,
            source,
            target,
            copier: DataCopier::new(),
            dispatch: None,
        }
    }

    /// Route every event the session emits to `dispatch`.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn copied_tables(&self) -> &CopiedTableSet {
        self.copier.copied()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Drop and recreate the target database.
    pub async fn create(&mut self) -> Result<()> {
        let dispatch = self.dispatch.clone();
        scoped(
            dispatch,
            lifecycle::create(&mut self.source, &mut self.target, &self.settings.target),
        )
        .await
    }

    /// Drop the target database if it exists.
    pub async fn delete(&mut self) -> Result<()> {
        let dispatch = self.dispatch.clone();
        scoped(dispatch, lifecycle::delete(&mut self.target, &self.settings.target)).await
    }

    /// Enable CLR integration on the target instance.
    pub async fn enable_clr(&mut self) -> Result<()> {
        let dispatch = self.dispatch.clone();
        scoped(dispatch, lifecycle::enable_clr(&mut self.target)).await
    }

    pub async fn copy_table(&mut self, name: &str) -> std::result::Result<(), OperationError> {
        self.copy_object(ObjectKind::Table, name).await
    }

    pub async fn copy_view(&mut self, name: &str) -> std::result::Result<(), OperationError> {
        self.copy_object(ObjectKind::View, name).await
    }

    pub async fn copy_stored_procedure(
        &mut self,
        name: &str,
    ) -> std::result::Result<(), OperationError> {
        self.copy_object(ObjectKind::StoredProcedure, name).await
    }

    pub async fn copy_function(&mut self, name: &str) -> std::result::Result<(), OperationError> {
        self.copy_object(ObjectKind::UserDefinedFunction, name).await
    }

    pub async fn delete_table(&mut self, name: &str) -> std::result::Result<(), OperationError> {
        self.delete_object(ObjectKind::Table, name).await
    }

    pub async fn delete_view(&mut self, name: &str) -> std::result::Result<(), OperationError> {
        self.delete_object(ObjectKind::View, name).await
    }

    pub async fn delete_stored_procedure(
        &mut self,
        name: &str,
    ) -> std::result::Result<(), OperationError> {
        self.delete_object(ObjectKind::StoredProcedure, name).await
    }

    pub async fn delete_function(&mut self, name: &str) -> std::result::Result<(), OperationError> {
        self.delete_object(ObjectKind::UserDefinedFunction, name).await
    }

    /// Copy (or delete) every object in `plan`.
    ///
    /// Copies run tables, views, procedures, then functions; deletes run in
    /// the reverse order. Per-object failures are collected in the report.
    /// Connection and lifecycle failures stop the run and are returned.
    pub async fn execute_plan(&mut self, operation: Operation, plan: &CopyPlan) -> Result<PlanReport> {
        let mut groups = vec![
            (ObjectKind::Table, &plan.tables),
            (ObjectKind::View, &plan.views),
            (ObjectKind::StoredProcedure, &plan.procedures),
            (ObjectKind::UserDefinedFunction, &plan.functions),
        ];
        if operation == Operation::Delete {
            groups.reverse();
        }

        let mut report = PlanReport::new(operation);
        for (kind, names) in groups {
            for name in names {
                let outcome = match operation {
                    Operation::Copy => self.copy_object(kind, name).await,
                    Operation::Delete => self.delete_object(kind, name).await,
                };
                match outcome {
                    Ok(()) => report.succeeded.push(request_id(kind, name)),
                    Err(e) if e.is_fatal() => return Err(e.source),
                    Err(e) => report.failed.push(FailedObject {
                        object: e.object,
                        error: e.source.to_string(),
                    }),
                }
            }
        }

        report.copied_tables = self.copier.copied().iter().map(String::from).collect();
        Ok(report)
    }

    async fn copy_object(
        &mut self,
        kind: ObjectKind,
        name: &str,
    ) -> std::result::Result<(), OperationError> {
        let dispatch = self.dispatch.clone();
        scoped(dispatch, async {
            info!("Copying {} {}", kind.display_name(), name);
            self.try_copy(kind, name).await.map_err(|source| {
                let object = request_id(kind, name);
                error!("Failed to copy {}", object);
                OperationError {
                    operation: Operation::Copy,
                    object,
                    source,
                }
            })
        })
        .await
    }

    async fn delete_object(
        &mut self,
        kind: ObjectKind,
        name: &str,
    ) -> std::result::Result<(), OperationError> {
        let dispatch = self.dispatch.clone();
        scoped(dispatch, async {
            info!("Deleting {} {}", kind.display_name(), name);
            self.try_delete(kind, name).await.map_err(|source| {
                let object = request_id(kind, name);
                error!("Failed to delete {}", object);
                OperationError {
                    operation: Operation::Delete,
                    object,
                    source,
                }
            })
        })
        .await
    }

    async fn try_copy(&mut self, kind: ObjectKind, name: &str) -> Result<()> {
        let qualified = QualifiedName::parse(name)?;
        let root = self
            .source
            .resolve(kind, &qualified)
            .await?
            .ok_or_else(|| HarnessError::ObjectNotFound(ObjectRef::new(kind, qualified).urn()))?;

        let nodes = DependencyWalker::discover(&mut self.source, &root, Direction::Source).await?;
        script::apply_copy(&nodes, &mut self.source, &mut self.target, &mut self.copier).await
    }

    async fn try_delete(&mut self, kind: ObjectKind, name: &str) -> Result<()> {
        let qualified = QualifiedName::parse(name)?;
        let Some(root) = self.target.resolve(kind, &qualified).await? else {
            info!(
                " - {} is not present in {}, nothing to delete",
                ObjectRef::new(kind, qualified).urn(),
                self.target.database()
            );
            return Ok(());
        };

        let nodes = DependencyWalker::discover(&mut self.target, &root, Direction::Target).await?;
        script::apply_drop(&nodes, &mut self.target).await
    }
}

/// URN of a requested object, or the raw name when it does not parse.
fn request_id(kind: ObjectKind, name: &str) -> String {
    match QualifiedName::parse(name) {
        Ok(qualified) => ObjectRef::new(kind, qualified).urn(),
        Err(_) => name.to_string(),
    }
}

/// Run `fut` with events routed to `dispatch` when one is set.
async fn scoped<F>(dispatch: Option<Dispatch>, fut: F) -> F::Output
where
    F: Future,
{
    match dispatch {
        Some(dispatch) => fut.with_subscriber(dispatch).await,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id() {
        assert_eq!(
            request_id(ObjectKind::Table, "Orders"),
            "Table[@Schema='dbo' and @Name='Orders']"
        );
        assert_eq!(
            request_id(ObjectKind::StoredProcedure, "sales.CalcTotal"),
            "StoredProcedure[@Schema='sales' and @Name='CalcTotal']"
        );
        assert_eq!(request_id(ObjectKind::View, "a.b.c"), "a.b.c");
    }

    #[test]
    fn test_operation_error_fatality() {
        let fatal = OperationError {
            operation: Operation::Copy,
            object: "x".into(),
            source: HarnessError::lifecycle("Set_Test", "boom"),
        };
        assert!(fatal.is_fatal());

        let local = OperationError {
            operation: Operation::Delete,
            object: "x".into(),
            source: HarnessError::ObjectNotFound("x".into()),
        };
        assert!(!local.is_fatal());
        assert_eq!(local.to_string(), "Failed to delete x: Object not found: x");
    }

    #[test]
    fn test_plan_report_json() {
        let mut report = PlanReport::new(Operation::Copy);
        report.succeeded.push("Table[@Schema='dbo' and @Name='Orders']".into());
        let json = report.to_json().unwrap();
        assert!(json.contains("\"operation\": \"copy\""));
        assert!(report.is_success());
    }
}
