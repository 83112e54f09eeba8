//! Shared fixtures for unit tests

use bytes::Bytes;
use std::path::Path;

/// Build the SELECT producing cost rows for `(service, cost)` pairs.
pub(crate) fn cost_rows_sql(rows: &[(&str, &str)]) -> String {
    let values: Vec<String> = rows
        .iter()
        .enumerate()
        .map(|(i, (service, cost))| {
            let day = i % 28 + 1;
            format!(
                "('{service}', TIMESTAMP '2025-01-{day:02} 00:00:00', \
                 TIMESTAMP '2025-01-{day:02} 23:59:59', CAST('{cost}' AS DECIMAL(18,4)), \
                 'USD', 'line item {i}')"
            )
        })
        .collect();

    format!(
        "SELECT * FROM (VALUES {}) AS t(AWS_SERVICE, LINE_ITEM_USAGE_START_DATE, \
         LINE_ITEM_USAGE_END_DATE, UNBLENDED_COST, CURRENCY, DESCRIPTION)",
        values.join(", ")
    )
}

/// Write a Parquet cost export into `dir` and return its bytes.
pub(crate) fn write_cost_fixture(dir: &Path, rows: &[(&str, &str)]) -> Bytes {
    let path = dir.join("fixture.parquet");
    let conn = duckdb::Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!(
        "COPY ({}) TO '{}' (FORMAT PARQUET)",
        cost_rows_sql(rows),
        path.display()
    ))
    .unwrap();
    Bytes::from(std::fs::read(&path).unwrap())
}
