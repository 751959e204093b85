//! Statement execution and bulk loads on the target.

use async_trait::async_trait;
use tiberius::ToSql;
use tracing::{debug, warn};

use super::{flag, text, MssqlConnection};
use crate::catalog::QualifiedName;
use crate::error::{HarnessError, Result};
use crate::identifier::quote_ident;
use crate::target::{BulkLoad, BulkLoadRequest, TargetColumn, TargetDatabase, TargetServer};
use crate::value::{Row, SqlNullType, SqlValue};

/// SQL Server's limit on parameters per RPC request.
const RPC_PARAMETER_LIMIT: usize = 2100;

/// Values one `INSERT` may bind. `sp_executesql` spends two RPC parameters
/// on the statement text and the parameter declaration list.
const MAX_PARAMETERS: usize = RPC_PARAMETER_LIMIT - 2;

/// SQL Server's limit on rows in one `VALUES` list.
const MAX_VALUES_ROWS: usize = 1000;

const TARGET_COLUMNS: &str = r#"
    SELECT
        CAST(c.name AS nvarchar(128)),
        CAST(CASE WHEN ut.is_assembly_type = 1 THEN ut.name ELSE ISNULL(st.name, ut.name) END AS nvarchar(128)),
        CAST(c.is_computed AS INT),
        CAST(c.is_identity AS INT),
        CAST(ut.is_assembly_type AS INT)
    FROM {db}.sys.columns c
    JOIN {db}.sys.types ut ON ut.user_type_id = c.user_type_id
    LEFT JOIN {db}.sys.types st ON st.user_type_id = c.system_type_id
    WHERE c.object_id = OBJECT_ID(@P1)
    ORDER BY c.column_id
"#;

const DATABASE_EXISTS: &str = "SELECT CAST(CASE WHEN DB_ID(@P1) IS NULL THEN 0 ELSE 1 END AS INT)";

#[async_trait]
impl TargetDatabase for MssqlConnection {
    async fn execute(&mut self, statement: &str) -> Result<()> {
        let sql = format!("EXEC {}.sys.sp_executesql @P1", quote_ident(&self.database));
        self.client()
            .execute(sql.as_str(), &[&statement])
            .await
            .map_err(|e| HarnessError::statement(statement, e))?;
        Ok(())
    }

    async fn table_columns(&mut self, table: &QualifiedName) -> Result<Vec<TargetColumn>> {
        let path = self.object_path(table);
        let rows = self.catalog_rows(TARGET_COLUMNS, &[path.as_str()]).await?;
        if rows.is_empty() {
            return Err(HarnessError::ObjectNotFound(format!(
                "{}.{}",
                self.database, table
            )));
        }

        rows.iter()
            .map(|row| {
                Ok(TargetColumn {
                    name: text(row, 0)?,
                    data_type: text(row, 1)?,
                    is_computed: flag(row, 2)?,
                    is_identity: flag(row, 3)?,
                    is_clr_type: flag(row, 4)?,
                })
            })
            .collect()
    }

    async fn begin_bulk_load<'a>(
        &'a mut self,
        request: &BulkLoadRequest,
    ) -> Result<Box<dyn BulkLoad + 'a>> {
        let table = format!("{}.{}", quote_ident(&self.database), request.table.quoted());
        if request.columns.is_empty() {
            return Err(HarnessError::data_copy(table, "Cannot insert with zero columns"));
        }

        let mut load = MssqlBulkLoad {
            conn: self,
            table,
            columns: request.columns.clone(),
            keep_identity: request.keep_identity,
            table_lock: request.table_lock,
            written: 0,
        };

        if let Err(e) = load.start().await {
            load.rollback().await;
            return Err(e);
        }
        Ok(Box::new(load))
    }
}

#[async_trait]
impl TargetServer for MssqlConnection {
    async fn database_exists(&mut self, name: &str) -> Result<bool> {
        let rows = self.query_rows(DATABASE_EXISTS, &[name]).await?;
        match rows.first() {
            Some(row) => flag(row, 0),
            None => Ok(false),
        }
    }

    async fn execute_server(&mut self, statement: &str) -> Result<()> {
        self.execute_batch(statement)
            .await
            .map_err(|e| HarnessError::statement(statement, e))
    }
}

/// A transactional multi-row `INSERT` load.
///
/// Constraints are disabled and identity insert enabled for the duration of
/// the transaction; both are restored on commit and on rollback.
pub struct MssqlBulkLoad<'a> {
    conn: &'a mut MssqlConnection,
    table: String,
    columns: Vec<String>,
    keep_identity: bool,
    table_lock: bool,
    written: u64,
}

impl MssqlBulkLoad<'_> {
    async fn start(&mut self) -> Result<()> {
        self.batch("BEGIN TRANSACTION").await?;
        self.batch(&format!("ALTER TABLE {} NOCHECK CONSTRAINT ALL", self.table))
            .await?;
        if self.keep_identity {
            self.batch(&format!("SET IDENTITY_INSERT {} ON", self.table))
                .await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.keep_identity {
            self.batch(&format!("SET IDENTITY_INSERT {} OFF", self.table))
                .await?;
        }
        self.batch(&format!(
            "ALTER TABLE {} WITH NOCHECK CHECK CONSTRAINT ALL",
            self.table
        ))
        .await?;
        self.batch("COMMIT TRANSACTION").await
    }

    /// Roll back and restore identity insert, logging rather than failing.
    async fn rollback(&mut self) {
        if let Err(e) = self.try_rollback().await {
            warn!("Failed to roll back load into {}: {}", self.table, e);
        }
    }

    async fn try_rollback(&mut self) -> Result<()> {
        self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await?;
        if self.keep_identity {
            self.batch(&format!("SET IDENTITY_INSERT {} OFF", self.table))
                .await?;
        }
        Ok(())
    }

    async fn batch(&mut self, sql: &str) -> Result<()> {
        debug!("{}", sql);
        self.conn
            .execute_batch(sql)
            .await
            .map_err(|e| HarnessError::data_copy(self.table.as_str(), e))
    }

    async fn insert(&mut self, rows: &[Row]) -> Result<u64> {
        let cols_per_row = self.columns.len();
        let max_rows_per_batch = rows_per_statement(cols_per_row);
        let col_str = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let hint = if self.table_lock { " WITH (TABLOCK)" } else { "" };

        let mut inserted = 0u64;
        for batch in rows.chunks(max_rows_per_batch) {
            if let Some(bad) = batch.iter().find(|row| row.len() != cols_per_row) {
                return Err(HarnessError::data_copy(
                    self.table.as_str(),
                    format!("row has {} values, expected {}", bad.len(), cols_per_row),
                ));
            }

            let sql = format!(
                "INSERT INTO {}{} ({}) VALUES {}",
                self.table,
                hint,
                col_str,
                values_placeholders(batch.len(), cols_per_row)
            );

            let params: Vec<Box<dyn ToSql>> = batch
                .iter()
                .flat_map(|row| row.iter().map(sql_value_to_sql_param))
                .collect();
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

            self.conn
                .client()
                .execute(sql.as_str(), &param_refs)
                .await
                .map_err(|e| {
                    HarnessError::data_copy(self.table.as_str(), format!("batched INSERT: {}", e))
                })?;

            inserted += batch.len() as u64;
        }

        Ok(inserted)
    }
}

#[async_trait]
impl BulkLoad for MssqlBulkLoad<'_> {
    async fn send(&mut self, rows: Vec<Row>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let inserted = self.insert(&rows).await?;
        self.written += inserted;
        Ok(inserted)
    }

    async fn finish(mut self: Box<Self>) -> Result<u64> {
        if let Err(e) = self.commit().await {
            self.rollback().await;
            return Err(e);
        }
        Ok(self.written)
    }

    async fn abort(mut self: Box<Self>) -> Result<()> {
        self.try_rollback().await
    }
}

/// Rows per multi-row `INSERT` for a table `cols` columns wide.
fn rows_per_statement(cols: usize) -> usize {
    (MAX_PARAMETERS / cols.max(1)).clamp(1, MAX_VALUES_ROWS)
}

/// `(@P1, @P2), (@P3, @P4)` for `rows` rows of `cols` columns.
fn values_placeholders(rows: usize, cols: usize) -> String {
    let mut param_idx = 1;
    let mut groups = Vec::with_capacity(rows);
    for _ in 0..rows {
        let placeholders: Vec<String> = (0..cols)
            .map(|_| {
                let p = format!("@P{}", param_idx);
                param_idx += 1;
                p
            })
            .collect();
        groups.push(format!("({})", placeholders.join(", ")));
    }
    groups.join(", ")
}

/// Bind a value with its SQL type; NULLs keep the column's type.
fn sql_value_to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null(null_type) => typed_null(*null_type),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::U8(v) => Box::new(*v),
        SqlValue::I16(i) => Box::new(*i),
        SqlValue::I32(i) => Box::new(*i),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::F32(f) => Box::new(*f),
        SqlValue::F64(f) => Box::new(*f),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeOffset(dto) => Box::new(*dto),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(*t),
    }
}

fn typed_null(null_type: SqlNullType) -> Box<dyn ToSql> {
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    match null_type {
        SqlNullType::Bool => Box::new(Option::<bool>::None),
        SqlNullType::U8 => Box::new(Option::<u8>::None),
        SqlNullType::I16 => Box::new(Option::<i16>::None),
        SqlNullType::I32 => Box::new(Option::<i32>::None),
        SqlNullType::I64 => Box::new(Option::<i64>::None),
        SqlNullType::F32 => Box::new(Option::<f32>::None),
        SqlNullType::F64 => Box::new(Option::<f64>::None),
        SqlNullType::String => Box::new(Option::<String>::None),
        SqlNullType::Bytes => Box::new(Option::<Vec<u8>>::None),
        SqlNullType::Uuid => Box::new(Option::<Uuid>::None),
        SqlNullType::Decimal => Box::new(Option::<Decimal>::None),
        SqlNullType::DateTime => Box::new(Option::<NaiveDateTime>::None),
        SqlNullType::DateTimeOffset => Box::new(Option::<DateTime<FixedOffset>>::None),
        SqlNullType::Date => Box::new(Option::<NaiveDate>::None),
        SqlNullType::Time => Box::new(Option::<NaiveTime>::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_placeholders() {
        assert_eq!(values_placeholders(2, 3), "(@P1, @P2, @P3), (@P4, @P5, @P6)");
        assert_eq!(values_placeholders(1, 1), "(@P1)");
    }

    #[test]
    fn test_rows_per_statement_stays_under_parameter_limit() {
        // The statement text and declaration list ride along as two more
        // RPC parameters.
        for cols in 1..=MAX_PARAMETERS {
            let rows = rows_per_statement(cols);
            assert!(rows <= MAX_VALUES_ROWS);
            assert!(
                rows * cols + 2 <= RPC_PARAMETER_LIMIT,
                "{cols} columns x {rows} rows exceeds the RPC parameter limit"
            );
        }
    }

    #[test]
    fn test_rows_per_statement_for_widths_dividing_the_limit() {
        assert_eq!(rows_per_statement(21), 99);
        assert_eq!(rows_per_statement(70), 29);
        assert_eq!(rows_per_statement(1), MAX_VALUES_ROWS);
        assert_eq!(rows_per_statement(5000), 1);
    }
}
