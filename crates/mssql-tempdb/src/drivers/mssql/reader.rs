//! Sample reads from the source database.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tiberius::numeric::Numeric;
use tiberius::Row;
use tracing::debug;
use uuid::Uuid;

use super::MssqlConnection;
use crate::error::{HarnessError, Result};
use crate::identifier::quote_ident;
use crate::source::{RowSource, SampleColumn, SampleReader, SampleRequest};
use crate::value::{Row as SampleRow, SqlNullType, SqlValue};

/// Build the `SELECT TOP (n)` for a sample read.
///
/// `xml` and `sql_variant` are read as `nvarchar(max)` and CLR types as
/// `varbinary(max)`; the target converts them back on insert.
pub fn sample_query(database: &str, request: &SampleRequest) -> Result<String> {
    if request.columns.is_empty() {
        return Err(HarnessError::data_copy(
            request.table.to_string(),
            "no columns to read",
        ));
    }

    let projection: Vec<String> = request.columns.iter().map(project_column).collect();
    Ok(format!(
        "SELECT TOP ({}) {} FROM {}.{}",
        request.limit,
        projection.join(", "),
        quote_ident(database),
        request.table.quoted()
    ))
}

fn project_column(column: &SampleColumn) -> String {
    let name = quote_ident(&column.name);
    if column.is_clr_type {
        return format!("CAST({name} AS varbinary(max)) AS {name}");
    }
    match column.data_type.to_lowercase().as_str() {
        "xml" | "sql_variant" => format!("CAST({name} AS nvarchar(max)) AS {name}"),
        _ => name,
    }
}

#[async_trait]
impl RowSource for MssqlConnection {
    async fn open_sample<'a>(
        &'a mut self,
        request: &SampleRequest,
    ) -> Result<Box<dyn SampleReader + 'a>> {
        let sql = sample_query(&self.database, request)?;
        debug!("{}", sql);

        let stream = self.client().simple_query(sql).await?;
        Ok(Box::new(MssqlSampleReader {
            rows: stream.into_row_stream(),
            columns: request.columns.clone(),
        }))
    }
}

/// An open `TOP (n)` read over a borrowed source session.
pub struct MssqlSampleReader<'a> {
    rows: BoxStream<'a, tiberius::Result<Row>>,
    columns: Vec<SampleColumn>,
}

#[async_trait]
impl<'a> SampleReader for MssqlSampleReader<'a> {
    async fn next_chunk(&mut self, max_rows: usize) -> Result<Vec<SampleRow>> {
        let mut chunk = Vec::with_capacity(max_rows);
        while chunk.len() < max_rows {
            let Some(row) = self.rows.try_next().await? else {
                break;
            };
            let mut values = Vec::with_capacity(self.columns.len());
            for (idx, column) in self.columns.iter().enumerate() {
                values.push(convert_value(&row, idx, column)?);
            }
            chunk.push(values);
        }
        Ok(chunk)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        // Dropping the stream leaves unread tokens on the wire; the client
        // drains them before its next request.
        drop(self);
        Ok(())
    }
}

/// Convert one column of a sampled row to an owned [`SqlValue`].
fn convert_value(row: &Row, idx: usize, column: &SampleColumn) -> Result<SqlValue> {
    let data_type = column.data_type.to_lowercase();
    let null_type = if column.is_clr_type {
        SqlNullType::Bytes
    } else {
        SqlNullType::for_data_type(&data_type)
    };

    let value = if column.is_clr_type {
        row.try_get::<&[u8], _>(idx)?.map(|b| SqlValue::Bytes(b.to_vec()))
    } else {
        match data_type.as_str() {
            "bit" => row.try_get::<bool, _>(idx)?.map(SqlValue::Bool),
            "tinyint" => row.try_get::<u8, _>(idx)?.map(SqlValue::U8),
            "smallint" => row.try_get::<i16, _>(idx)?.map(SqlValue::I16),
            "int" => row.try_get::<i32, _>(idx)?.map(SqlValue::I32),
            "bigint" => row.try_get::<i64, _>(idx)?.map(SqlValue::I64),
            "real" => row.try_get::<f32, _>(idx)?.map(SqlValue::F32),
            "float" => row.try_get::<f64, _>(idx)?.map(SqlValue::F64),
            "decimal" | "numeric" => row
                .try_get::<Numeric, _>(idx)?
                .map(|n| numeric_value(n.value(), n.scale())),
            "money" | "smallmoney" => match row.try_get::<Decimal, _>(idx) {
                Ok(v) => v.map(SqlValue::Decimal),
                Err(_) => row.try_get::<f64, _>(idx)?.map(SqlValue::F64),
            },
            "uniqueidentifier" => row.try_get::<Uuid, _>(idx)?.map(SqlValue::Uuid),
            "date" => row.try_get::<NaiveDate, _>(idx)?.map(SqlValue::Date),
            "time" => row.try_get::<NaiveTime, _>(idx)?.map(SqlValue::Time),
            "datetime" | "datetime2" | "smalldatetime" => {
                row.try_get::<NaiveDateTime, _>(idx)?.map(SqlValue::DateTime)
            }
            "datetimeoffset" => row
                .try_get::<DateTime<FixedOffset>, _>(idx)?
                .map(SqlValue::DateTimeOffset),
            "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => {
                row.try_get::<&[u8], _>(idx)?.map(|b| SqlValue::Bytes(b.to_vec()))
            }
            _ => row
                .try_get::<&str, _>(idx)?
                .map(|s| SqlValue::Text(s.to_string())),
        }
    };

    Ok(value.unwrap_or(SqlValue::Null(null_type)))
}

/// Convert a raw `decimal`/`numeric` value.
///
/// `Decimal` holds 28 significant digits; anything wider (up to
/// `numeric(38, s)`) is carried as text and converted back by the server on
/// insert.
fn numeric_value(value: i128, scale: u8) -> SqlValue {
    match Decimal::try_from_i128_with_scale(value, u32::from(scale)) {
        Ok(decimal) => SqlValue::Decimal(decimal),
        Err(_) => SqlValue::Text(scaled_text(value, scale)),
    }
}

fn scaled_text(value: i128, scale: u8) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let digits = value.unsigned_abs().to_string();
    let scale = usize::from(scale);
    if scale == 0 {
        return format!("{sign}{digits}");
    }
    let digits = format!("{:0>width$}", digits, width = scale + 1);
    let (whole, fraction) = digits.split_at(digits.len() - scale);
    format!("{sign}{whole}.{fraction}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::QualifiedName;

    fn column(name: &str, data_type: &str) -> SampleColumn {
        SampleColumn {
            name: name.into(),
            data_type: data_type.into(),
            is_clr_type: false,
        }
    }

    #[test]
    fn test_sample_query() {
        let request = SampleRequest {
            table: QualifiedName::new("dbo", "Orders"),
            columns: vec![
                column("OrderId", "int"),
                column("Notes", "xml"),
                SampleColumn {
                    is_clr_type: true,
                    ..column("Node", "hierarchyid")
                },
            ],
            limit: 1000,
        };

        assert_eq!(
            sample_query("Sales", &request).unwrap(),
            "SELECT TOP (1000) [OrderId], CAST([Notes] AS nvarchar(max)) AS [Notes], \
             CAST([Node] AS varbinary(max)) AS [Node] FROM [Sales].[dbo].[Orders]"
        );
    }

    #[test]
    fn test_numeric_value_within_decimal_range() {
        assert_eq!(
            numeric_value(12345, 2),
            SqlValue::Decimal(Decimal::new(12345, 2))
        );
        assert_eq!(numeric_value(-5, 0), SqlValue::Decimal(Decimal::from(-5)));
    }

    #[test]
    fn test_numeric_value_wider_than_decimal_falls_back_to_text() {
        // numeric(38, 0) holding 10^30
        assert_eq!(
            numeric_value(10i128.pow(30), 0),
            SqlValue::Text(format!("1{}", "0".repeat(30)))
        );
        // numeric(38, 10) at its maximum
        let max = 10i128.pow(38) - 1;
        assert_eq!(
            numeric_value(-max, 10),
            SqlValue::Text(format!("-{}.{}", "9".repeat(28), "9".repeat(10)))
        );
    }

    #[test]
    fn test_scaled_text_pads_small_fractions() {
        assert_eq!(scaled_text(5, 3), "0.005");
        assert_eq!(scaled_text(-120, 2), "-1.20");
        assert_eq!(scaled_text(0, 0), "0");
    }

    #[test]
    fn test_sample_query_requires_columns() {
        let request = SampleRequest {
            table: QualifiedName::new("dbo", "Orders"),
            columns: Vec::new(),
            limit: 1000,
        };
        assert!(sample_query("Sales", &request).is_err());
    }
}
