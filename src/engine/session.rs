//! Engine sessions
//!
//! A session is an independent connection to the shared database. Sessions
//! are cheap to open, owned by whoever opened them, and closed on drop.

use duckdb::arrow::datatypes::SchemaRef;
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::Connection;
use std::fmt;

/// One live execution context against the engine
pub struct Session {
    id: u64,
    conn: Connection,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

impl Session {
    pub(crate) fn new(id: u64, conn: Connection) -> Self {
        Self { id, conn }
    }

    /// Session identifier, unique within one engine instance
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Execute one or more statements that return no rows
    pub fn execute_batch(&self, sql: &str) -> duckdb::Result<()> {
        self.conn.execute_batch(sql)
    }

    /// Run a query and collect its result as Arrow record batches
    pub fn query_arrow(&self, sql: &str) -> duckdb::Result<(SchemaRef, Vec<RecordBatch>)> {
        let mut stmt = self.conn.prepare(sql)?;
        let arrow = stmt.query_arrow([])?;
        let schema = arrow.get_schema();
        let batches: Vec<RecordBatch> = arrow.collect();
        Ok((schema, batches))
    }

    /// Run a query returning a single integer in its first row and column
    pub fn query_i64(&self, sql: &str) -> duckdb::Result<i64> {
        self.conn.query_row(sql, [], |row| row.get(0))
    }
}
