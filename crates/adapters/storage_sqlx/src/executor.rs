//! Backend dispatch: run a rendered statement on a `SQLite` or `MySQL`
//! connection, binding and decoding backend-neutral [`Value`]s.

use sqlx::mysql::MySqlConnection;
use sqlx::query::Query;
use sqlx::sqlite::SqliteConnection;
use sqlx::{ColumnIndex, Database, Decode, Encode, Row, Type};

use polystore_domain::entity::{ColumnMeta, ColumnType, Value};

use crate::error::StorageError;

/// Result of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub rows_affected: u64,
    pub last_insert_id: i64,
}

/// A borrowed connection, pooled or inside a transaction.
pub(crate) enum Conn<'c> {
    Sqlite(&'c mut SqliteConnection),
    MySql(&'c mut MySqlConnection),
}

impl Conn<'_> {
    pub(crate) async fn execute(
        &mut self,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<Outcome, StorageError> {
        tracing::trace!(sql, "execute");
        match self {
            Self::Sqlite(conn) => {
                let result = bind_all(sqlx::query(sql), values)
                    .execute(&mut **conn)
                    .await?;
                Ok(Outcome {
                    rows_affected: result.rows_affected(),
                    last_insert_id: result.last_insert_rowid(),
                })
            }
            Self::MySql(conn) => {
                let result = bind_all(sqlx::query(sql), values)
                    .execute(&mut **conn)
                    .await?;
                let id = result.last_insert_id();
                Ok(Outcome {
                    rows_affected: result.rows_affected(),
                    last_insert_id: i64::try_from(id)
                        .map_err(|_| StorageError::GeneratedKey(id))?,
                })
            }
        }
    }

    pub(crate) async fn fetch_rows(
        &mut self,
        sql: &str,
        values: Vec<Value>,
        columns: &[ColumnMeta],
    ) -> Result<Vec<Vec<Value>>, StorageError> {
        tracing::trace!(sql, "fetch");
        match self {
            Self::Sqlite(conn) => {
                let rows = bind_all(sqlx::query(sql), values)
                    .fetch_all(&mut **conn)
                    .await?;
                rows.iter()
                    .map(|row| decode_row(row, columns))
                    .collect::<Result<_, _>>()
                    .map_err(StorageError::from)
            }
            Self::MySql(conn) => {
                let rows = bind_all(sqlx::query(sql), values)
                    .fetch_all(&mut **conn)
                    .await?;
                rows.iter()
                    .map(|row| decode_row(row, columns))
                    .collect::<Result<_, _>>()
                    .map_err(StorageError::from)
            }
        }
    }

    /// Run a `SELECT COUNT(*)`-shaped statement.
    pub(crate) async fn fetch_count(
        &mut self,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<u64, StorageError> {
        tracing::trace!(sql, "count");
        let count: i64 = match self {
            Self::Sqlite(conn) => {
                bind_all(sqlx::query(sql), values)
                    .fetch_one(&mut **conn)
                    .await?
                    .try_get(0_usize)?
            }
            Self::MySql(conn) => {
                bind_all(sqlx::query(sql), values)
                    .fetch_one(&mut **conn)
                    .await?
                    .try_get(0_usize)?
            }
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn bind_all<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    values: Vec<Value>,
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    i64: Encode<'q, DB> + Type<DB>,
    Option<i64>: Encode<'q, DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
{
    for value in values {
        query = match value {
            Value::Null => query.bind(None::<i64>),
            Value::Integer(value) => query.bind(value),
            Value::Real(value) => query.bind(value),
            Value::Text(value) => query.bind(value),
        };
    }
    query
}

fn decode_row<R>(row: &R, columns: &[ColumnMeta]) -> Result<Vec<Value>, sqlx::Error>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
{
    columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            Ok(match column.ty {
                ColumnType::Integer => row
                    .try_get::<Option<i64>, _>(index)?
                    .map_or(Value::Null, Value::Integer),
                ColumnType::Real => row
                    .try_get::<Option<f64>, _>(index)?
                    .map_or(Value::Null, Value::Real),
                ColumnType::Text => row
                    .try_get::<Option<String>, _>(index)?
                    .map_or(Value::Null, Value::Text),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasourceConfig;
    use crate::datasource::Datasource;

    const COLUMNS: [ColumnMeta; 2] = [
        ColumnMeta::required("id", ColumnType::Integer),
        ColumnMeta::nullable("note", ColumnType::Text),
    ];

    #[tokio::test]
    async fn should_bind_and_decode_null_values() {
        let ds = Datasource::build("library", &DatasourceConfig::from_url("sqlite::memory:"))
            .await
            .unwrap();
        let mut pooled = ds.acquire().await.unwrap();
        let mut conn = pooled.conn();
        conn.execute(
            "CREATE TABLE shelf (id INTEGER PRIMARY KEY, note TEXT)",
            Vec::new(),
        )
        .await
        .unwrap();

        let outcome = conn
            .execute(
                "INSERT INTO shelf (id, note) VALUES (?, ?)",
                vec![Value::Integer(1), Value::Null],
            )
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected, 1);

        let rows = conn
            .fetch_rows("SELECT id, note FROM shelf", Vec::new(), &COLUMNS)
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(1), Value::Null]]);
    }
}
