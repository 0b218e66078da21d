//! LanceDB connection and table helpers.
//!
//! Provides the database open function, existence checks and full-table
//! reads into `kgq_core::Table` for artifact loading.

use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};

use kgq_core::error::{Error, Result};
use kgq_core::Table;

pub(crate) fn store_err(e: impl std::fmt::Display) -> Error {
    Error::store_connection(e.to_string())
}

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri)
        .execute()
        .await
        .map_err(|e| Error::store_connection(format!("cannot connect to '{}': {}", uri, e)))
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await.map_err(store_err)?;
    Ok(names.iter().any(|n| n == name))
}

/// Reads every row of `name`; `None` when the table does not exist.
pub async fn read_table(conn: &Connection, name: &str) -> Result<Option<Table>> {
    if !table_exists(conn, name).await? {
        return Ok(None);
    }
    let t = conn.open_table(name).execute().await.map_err(store_err)?;
    let stream = t.query().execute().await.map_err(store_err)?;
    let batches: Table = stream.try_collect().await.map_err(store_err)?;
    Ok(Some(batches))
}
