//! Owned SQL values moved from the source sample into the target table.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Type hint for NULL values so parameters bind with the column's type.
///
/// An untyped NULL parameter is sent as `nvarchar`, which SQL Server refuses
/// to convert implicitly into `varbinary` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

impl SqlNullType {
    /// Null type for a SQL Server base type name (`sys.types.name`).
    pub fn for_data_type(data_type: &str) -> Self {
        match data_type.to_lowercase().as_str() {
            "bit" => SqlNullType::Bool,
            "tinyint" => SqlNullType::U8,
            "smallint" => SqlNullType::I16,
            "int" => SqlNullType::I32,
            "bigint" => SqlNullType::I64,
            "real" => SqlNullType::F32,
            "float" => SqlNullType::F64,
            "decimal" | "numeric" | "money" | "smallmoney" => SqlNullType::Decimal,
            "uniqueidentifier" => SqlNullType::Uuid,
            "binary" | "varbinary" | "image" | "timestamp" | "rowversion" | "hierarchyid"
            | "geometry" | "geography" => SqlNullType::Bytes,
            "date" => SqlNullType::Date,
            "time" => SqlNullType::Time,
            "datetime" | "datetime2" | "smalldatetime" => SqlNullType::DateTime,
            "datetimeoffset" => SqlNullType::DateTimeOffset,
            _ => SqlNullType::String,
        }
    }
}

/// A single column value of a sampled row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with type hint.
    Null(SqlNullType),
    Bool(bool),
    /// tinyint.
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Decimal(Decimal),
    /// Timestamp without timezone (datetime, datetime2, smalldatetime).
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
}

/// One sampled row, in column-mapping order.
pub type Row = Vec<SqlValue>;
