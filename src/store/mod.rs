//! SQLite materialization of a feed.
//!
//! Every table mirrors a [`GtfsTable`] schema, with a generated `id` and a
//! `feed_info_id` foreign key to the feed the row came from.

mod queries;

pub use queries::{FeedInfoRecord, ShapePoint};

use rusqlite::{Connection, OpenFlags, params_from_iter};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::models::{GtfsTable, TableSchema, TypedRow, Value};

static NULL_VALUE: Value = Value::Null;

/// A scoped connection to one store file.
pub struct FeedStore {
    conn: Connection,
}

impl FeedStore {
    /// Opens (creating if needed) a store file and ensures the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(&schema_ddl())?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// One more than the number of feeds already in this store.
    pub fn next_feed_info_id(&self) -> Result<i64> {
        Ok(self.row_count(GtfsTable::FeedInfo)? + 1)
    }

    pub fn insert_feed_info(&mut self, id: i64, row: &TypedRow) -> Result<()> {
        let schema = GtfsTable::FeedInfo.schema();
        let id = Value::Integer(id);
        let values = std::iter::once(&id).chain(column_values(schema, row));
        self.conn.execute(&insert_sql(schema, "id"), params_from_iter(values))?;
        Ok(())
    }

    /// Inserts `rows` into `table` as one transaction, `batch_size` rows at a time.
    ///
    /// The first error rolls the whole table back.
    pub fn insert_rows<I>(
        &mut self,
        table: GtfsTable,
        feed_info_id: i64,
        rows: I,
        batch_size: usize,
    ) -> Result<usize>
    where
        I: IntoIterator<Item = Result<TypedRow>>,
    {
        let schema = table.schema();
        let batch_size = batch_size.max(1);
        let owner = Value::Integer(feed_info_id);
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&insert_sql(schema, "feed_info_id"))?;
            let mut batch = Vec::with_capacity(batch_size);
            for row in rows {
                batch.push(row?);
                if batch.len() == batch_size {
                    inserted += write_batch(&mut stmt, schema, &owner, &mut batch)?;
                    debug!(table = %table, inserted, "Wrote batch");
                }
            }
            inserted += write_batch(&mut stmt, schema, &owner, &mut batch)?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn row_count(&self, table: GtfsTable) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        Ok(self.conn.query_row(&sql, [], |r| r.get(0))?)
    }

    /// Removes every row of `table`. Rows are never deleted individually.
    pub fn delete_all(&mut self, table: GtfsTable) -> Result<usize> {
        let sql = format!("DELETE FROM {}", table.name());
        Ok(self.conn.execute(&sql, [])?)
    }

    /// Rebuilds the file, returning freed pages to the filesystem.
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM")?;
        Ok(())
    }
}

fn column_values<'a>(
    schema: &'static TableSchema,
    row: &'a TypedRow,
) -> impl Iterator<Item = &'a Value> + 'a {
    schema
        .columns
        .iter()
        .map(move |column| row.get(column.name).unwrap_or(&NULL_VALUE))
}

fn write_batch(
    stmt: &mut rusqlite::Statement<'_>,
    schema: &'static TableSchema,
    owner: &Value,
    batch: &mut Vec<TypedRow>,
) -> Result<usize> {
    let mut written = 0;
    for row in batch.drain(..) {
        let values = std::iter::once(owner).chain(column_values(schema, &row));
        written += stmt.execute(params_from_iter(values))?;
    }
    Ok(written)
}

fn insert_sql(schema: &TableSchema, key_column: &str) -> String {
    let columns: Vec<&str> = std::iter::once(key_column)
        .chain(schema.columns.iter().map(|c| c.name))
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.name,
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn schema_ddl() -> String {
    let mut ddl = String::new();
    for table in GtfsTable::INGEST_ORDER {
        let schema = table.schema();
        let mut columns = Vec::new();
        if table == GtfsTable::FeedInfo {
            columns.push("id INTEGER PRIMARY KEY".to_string());
        } else {
            columns.push("id INTEGER PRIMARY KEY AUTOINCREMENT".to_string());
            columns.push("feed_info_id INTEGER NOT NULL REFERENCES feed_info(id)".to_string());
        }
        columns.extend(
            schema
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.sql_type().ddl())),
        );
        ddl.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n);\n",
            schema.name,
            columns.join(",\n  ")
        ));

        if table != GtfsTable::FeedInfo {
            ddl.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_feed_info_id ON {0}(feed_info_id);\n",
                schema.name
            ));
        }
        for column in schema.columns.iter().filter(|c| c.indexed) {
            ddl.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_{1} ON {0}({1});\n",
                schema.name, column.name
            ));
        }
    }
    ddl
}
