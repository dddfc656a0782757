//! Source queries: consistent snapshots and table metadata.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use delta_core::{SourceRow, Value};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Row};
use tracing::{debug, info};

use crate::event::convert_value;
use crate::replication::{server_version, version_at_least};
use crate::ConnectionOptions;

/// A column as listed by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub ordinal_position: u64,
    pub data_type: String,
    pub is_primary_key: bool,
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Open a consistent snapshot and read the binlog position it matches.
    async fn begin_snapshot(&self) -> Result<Box<dyn Snapshot>>;

    /// Columns of a table in ordinal order.
    async fn table_columns(&self, database: &str, table: &str) -> Result<Vec<ColumnInfo>>;
}

/// Rows as of one binlog position.
#[async_trait]
pub trait Snapshot: Send {
    fn file(&self) -> &str;

    fn position(&self) -> u64;

    async fn table_exists(&mut self, database: &str, table: &str) -> Result<bool>;

    /// Stream `columns` of every row passing `filter` to `on_row`.
    async fn export(
        &mut self,
        database: &str,
        table: &str,
        columns: &[String],
        filter: Option<&str>,
        on_row: &mut (dyn FnMut(SourceRow) -> Result<()> + Send),
    ) -> Result<()>;

    /// End the snapshot transaction.
    async fn finish(self: Box<Self>) -> Result<()>;
}

/// [`SourceClient`] over real MySQL connections.
pub struct MySQLClient {
    replication_client: ConnectionOptions,
    select: ConnectionOptions,
}

impl MySQLClient {
    pub fn new(replication_client: ConnectionOptions, select: ConnectionOptions) -> Self {
        Self {
            replication_client,
            select,
        }
    }
}

#[async_trait]
impl SourceClient for MySQLClient {
    async fn begin_snapshot(&self) -> Result<Box<dyn Snapshot>> {
        let mut lock_conn = self.replication_client.connect().await?;
        lock_conn
            .query_drop("FLUSH TABLES WITH READ LOCK")
            .await
            .context("Failed to lock tables")?;
        let (file, position) = read_binlog_status(&mut lock_conn).await?;
        info!("Locked tables: {file}:{position}");

        let mut conn = self.select.connect().await?;
        let version = server_version(&mut conn).await?;
        let start_transaction = if version_at_least(&version, (5, 6)) {
            "START TRANSACTION WITH CONSISTENT SNAPSHOT, READ ONLY"
        } else {
            "START TRANSACTION WITH CONSISTENT SNAPSHOT"
        };
        conn.query_drop(start_transaction).await?;

        lock_conn.query_drop("UNLOCK TABLES").await?;
        lock_conn.disconnect().await?;
        debug!("Unlocked tables");

        Ok(Box::new(MySQLSnapshot {
            conn,
            file,
            position,
        }))
    }

    async fn table_columns(&self, database: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        let mut conn = self.select.connect().await?;
        let rows: Vec<Row> = conn
            .exec(
                "SELECT column_name, ordinal_position, data_type, column_key \
                 FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ?",
                (database, table),
            )
            .await?;
        conn.disconnect().await?;
        let mut columns = rows
            .iter()
            .map(|row| {
                let column_key: String = row_get(row, 3)?;
                Ok(ColumnInfo {
                    name: row_get(row, 0)?,
                    ordinal_position: row_get(row, 1)?,
                    data_type: row_get(row, 2)?,
                    is_primary_key: column_key == "PRI",
                })
            })
            .collect::<Result<Vec<_>>>()?;
        columns.sort_by_key(|column| column.ordinal_position);
        Ok(columns)
    }
}

async fn read_binlog_status(conn: &mut Conn) -> Result<(String, u64)> {
    // MySQL 8.4 removed SHOW MASTER STATUS
    let status: Option<Row> = match conn.query_first("SHOW MASTER STATUS").await {
        Ok(status) => status,
        Err(_) => conn.query_first("SHOW BINARY LOG STATUS").await?,
    };
    // File, Position, Binlog_Do_DB, ...
    let status = status.ok_or_else(|| anyhow!("Binary logging is disabled on the source"))?;
    let file: String = row_get(&status, 0)?;
    let position: u64 = row_get(&status, 1)?;
    Ok((file, position))
}

fn row_get<T: mysql_async::prelude::FromValue>(row: &Row, index: usize) -> Result<T> {
    row.get_opt(index)
        .ok_or_else(|| anyhow!("Missing column {index}"))?
        .map_err(|e| anyhow!("Invalid column {index}: {e}"))
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub(crate) fn select_query(
    database: &str,
    table: &str,
    columns: &[String],
    filter: Option<&str>,
) -> String {
    let columns = if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut query = format!(
        "SELECT {columns} FROM {}.{}",
        quote_identifier(database),
        quote_identifier(table)
    );
    if let Some(filter) = filter {
        query.push_str(" WHERE ");
        query.push_str(filter);
    }
    query
}

struct MySQLSnapshot {
    conn: Conn,
    file: String,
    position: u64,
}

#[async_trait]
impl Snapshot for MySQLSnapshot {
    fn file(&self) -> &str {
        &self.file
    }

    fn position(&self) -> u64 {
        self.position
    }

    async fn table_exists(&mut self, database: &str, table: &str) -> Result<bool> {
        let n_tables: Option<u64> = self
            .conn
            .exec_first(
                "SELECT COUNT(*) AS n_tables FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?",
                (database, table),
            )
            .await?;
        Ok(n_tables.unwrap_or(0) > 0)
    }

    async fn export(
        &mut self,
        database: &str,
        table: &str,
        columns: &[String],
        filter: Option<&str>,
        on_row: &mut (dyn FnMut(SourceRow) -> Result<()> + Send),
    ) -> Result<()> {
        let query = select_query(database, table, columns, filter);
        debug!("Selecting: {query}");
        let mut result = self
            .conn
            .query_iter(query.as_str())
            .await
            .with_context(|| format!("Failed to run: {query}"))?;
        let mut names: Option<Vec<String>> = None;
        while let Some(row) = result.next().await? {
            let names = names.get_or_insert_with(|| {
                row.columns_ref()
                    .iter()
                    .map(|column| column.name_str().into_owned())
                    .collect()
            });
            let source_row = names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = row.as_ref(i).map(convert_value).unwrap_or(Value::Null);
                    (name.clone(), value)
                })
                .collect();
            on_row(source_row)?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<()> {
        self.conn.query_drop("ROLLBACK").await?;
        self.conn.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_query() {
        assert_eq!(
            select_query(
                "importer",
                "shoes",
                &["id".to_string(), "name".to_string()],
                Some("id > 10")
            ),
            "SELECT `id`, `name` FROM `importer`.`shoes` WHERE id > 10"
        );
        assert_eq!(
            select_query("importer", "shoes", &[], None),
            "SELECT * FROM `importer`.`shoes`"
        );
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("a`b"), "`a``b`");
    }
}
