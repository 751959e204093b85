//! Capped sample copy of table data from source to target.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, ObjectRef};
use crate::error::{HarnessError, Result};
use crate::script::{generator, ScriptingProfile};
use crate::source::{RowSource, SampleColumn, SampleReader, SampleRequest};
use crate::target::{BulkLoad, BulkLoadRequest, TargetColumn, TargetDatabase};

/// Maximum rows copied per table.
pub const ROW_LIMIT: usize = 1000;

/// Timeout for each read and load step of a copy.
pub const COPY_TIMEOUT: Duration = Duration::from_secs(900);

/// Rows moved per read/send round trip.
pub const LOAD_CHUNK_ROWS: usize = 100;

/// Tables whose data has been copied in the current session, by URN.
#[derive(Debug, Default, Clone)]
pub struct CopiedTableSet {
    urns: HashSet<String>,
    order: Vec<String>,
}

impl CopiedTableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, table: &ObjectRef) -> bool {
        self.urns.contains(&table.urn())
    }

    /// Record a copied table. Returns false if it was already present.
    pub fn insert(&mut self, table: &ObjectRef) -> bool {
        let urn = table.urn();
        if self.urns.insert(urn.clone()) {
            self.order.push(urn);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// URNs in the order their copies completed.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// One copied column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub source_column: String,
    pub target_column: String,
    pub data_type: String,
    pub is_identity: bool,
    pub is_clr_type: bool,
}

/// Map every insertable target column to the same-named source column.
///
/// Computed columns and `timestamp`/`rowversion` columns are generated by
/// the server and are never part of the mapping.
pub fn build_column_mappings(columns: &[TargetColumn]) -> Vec<ColumnMapping> {
    columns
        .iter()
        .filter(|c| !c.is_computed)
        .filter(|c| {
            let t = c.data_type.to_lowercase();
            t != "timestamp" && t != "rowversion"
        })
        .map(|c| ColumnMapping {
            source_column: c.name.clone(),
            target_column: c.name.clone(),
            data_type: c.data_type.clone(),
            is_identity: c.is_identity,
            is_clr_type: c.is_clr_type,
        })
        .collect()
}

/// Copies table samples and remembers which tables are done.
#[derive(Debug, Default)]
pub struct DataCopier {
    copied: CopiedTableSet,
}

impl DataCopier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn copied(&self) -> &CopiedTableSet {
        &self.copied
    }

    pub fn is_copied(&self, table: &ObjectRef) -> bool {
        self.copied.contains(table)
    }

    /// Replace the target table's rows with up to [`ROW_LIMIT`] source rows.
    ///
    /// The table is registered as copied only after the load commits. The
    /// source read is closed on every path, including a failed load.
    pub async fn copy_table<S, T>(
        &mut self,
        source: &mut S,
        target: &mut T,
        table: &ObjectRef,
    ) -> Result<u64>
    where
        S: RowSource + Catalog + ?Sized,
        T: TargetDatabase + ?Sized,
    {
        clear_table(target, table).await?;

        let source_name = format!("{}.{}", source.database(), table.name);
        let target_name = format!("{}.{}", target.database(), table.name);
        info!("Copying data from {} to {}", source_name, target_name);

        info!("Obtaining column mappings for {}", target_name);
        let columns = target.table_columns(&table.name).await?;
        let mappings = build_column_mappings(&columns);
        for mapping in &mappings {
            debug!(" - Adding column mapping for {}", mapping.target_column);
        }
        if mappings.is_empty() {
            return Err(HarnessError::data_copy(
                target_name,
                "table has no insertable columns",
            ));
        }

        let sample = SampleRequest {
            table: table.name.clone(),
            columns: mappings
                .iter()
                .map(|m| SampleColumn {
                    name: m.source_column.clone(),
                    data_type: m.data_type.clone(),
                    is_clr_type: m.is_clr_type,
                })
                .collect(),
            limit: ROW_LIMIT,
        };
        let load_request = BulkLoadRequest {
            table: table.name.clone(),
            columns: mappings.iter().map(|m| m.target_column.clone()).collect(),
            keep_identity: mappings.iter().any(|m| m.is_identity),
            table_lock: true,
        };

        info!(" - Reading data from {}", source_name);
        let mut reader = within(&source_name, "opening sample read", source.open_sample(&sample))
            .await
            .map_err(|e| as_copy_error(&target_name, e))?;

        info!(" - Writing data to {}", target_name);
        let outcome = match within(&target_name, "starting bulk load", target.begin_bulk_load(&load_request)).await {
            Ok(mut load) => match pump(&mut *reader, &mut *load, &source_name, &target_name).await {
                Ok(_) => within(&target_name, "committing bulk load", load.finish()).await,
                Err(e) => {
                    if let Err(abort_err) = load.abort().await {
                        warn!("Failed to abort bulk load into {}: {}", target_name, abort_err);
                    }
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };

        if let Err(e) = reader.close().await {
            warn!("Failed to close reader on {}: {}", source_name, e);
        }

        let rows = outcome.map_err(|e| as_copy_error(&target_name, e))?;
        self.copied.insert(table);
        info!(" - Copied {} rows into {}", rows, target_name);
        Ok(rows)
    }
}

/// Remove existing rows ahead of a load.
async fn clear_table<T>(target: &mut T, table: &ObjectRef) -> Result<()>
where
    T: TargetDatabase + ?Sized,
{
    info!("Clearing table {}", table.urn());
    for statement in generator::clear_table_data(&ScriptingProfile::CLEAR_DATA, &table.name) {
        info!(" - Executing script on {}", target.database());
        debug!("{}", statement);
        target.execute(&statement).await?;
    }
    Ok(())
}

async fn pump<'r, 'l>(
    reader: &mut (dyn SampleReader + 'r),
    load: &mut (dyn BulkLoad + 'l),
    source_name: &str,
    target_name: &str,
) -> Result<u64> {
    let mut read = 0usize;
    let mut written = 0u64;

    while read < ROW_LIMIT {
        let max_rows = LOAD_CHUNK_ROWS.min(ROW_LIMIT - read);
        let mut rows = within(source_name, "reading rows", reader.next_chunk(max_rows)).await?;
        if rows.is_empty() {
            break;
        }
        rows.truncate(max_rows);
        read += rows.len();
        written += within(target_name, "writing rows", load.send(rows)).await?;
    }

    Ok(written)
}

async fn within<F, R>(object: &str, operation: &str, fut: F) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    match tokio::time::timeout(COPY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(HarnessError::Timeout {
            operation: format!("{} on {}", operation, object),
            seconds: COPY_TIMEOUT.as_secs(),
        }),
    }
}

fn as_copy_error(table: &str, err: HarnessError) -> HarnessError {
    match err {
        e @ HarnessError::DataCopy { .. } => e,
        other => HarnessError::data_copy(table, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: &str) -> TargetColumn {
        TargetColumn {
            name: name.into(),
            data_type: data_type.into(),
            is_computed: false,
            is_identity: false,
            is_clr_type: false,
        }
    }

    #[test]
    fn test_mapping_excludes_computed_columns() {
        let columns = vec![
            TargetColumn {
                is_identity: true,
                ..column("OrderId", "int")
            },
            column("Qty", "int"),
            column("Price", "money"),
            TargetColumn {
                is_computed: true,
                ..column("Total", "money")
            },
        ];

        let mappings = build_column_mappings(&columns);
        let names: Vec<&str> = mappings.iter().map(|m| m.target_column.as_str()).collect();
        assert_eq!(names, vec!["OrderId", "Qty", "Price"]);
        assert!(mappings[0].is_identity);
        assert!(mappings.iter().all(|m| m.source_column == m.target_column));
    }

    #[test]
    fn test_mapping_excludes_rowversion() {
        let columns = vec![column("Id", "int"), column("Version", "timestamp")];
        let mappings = build_column_mappings(&columns);
        assert_eq!(mappings.len(), 1);
    }

    #[test]
    fn test_copied_table_set_is_idempotent() {
        let mut set = CopiedTableSet::new();
        let orders = ObjectRef::table("dbo", "Orders");
        assert!(set.insert(&orders));
        assert!(!set.insert(&orders));
        assert!(set.contains(&orders));
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec!["Table[@Schema='dbo' and @Name='Orders']"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_times_out() {
        let err = within("dbo.Orders", "reading rows", async {
            tokio::time::sleep(COPY_TIMEOUT + Duration::from_secs(1)).await;
            Ok::<_, HarnessError>(())
        })
        .await
        .unwrap_err();

        match err {
            HarnessError::Timeout { seconds, operation } => {
                assert_eq!(seconds, 900);
                assert_eq!(operation, "reading rows on dbo.Orders");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
