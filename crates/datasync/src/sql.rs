//! Glue between the public value model and the SQL execution surface.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;

use datasync_error::{DatasyncError, Result};
use datasync_types::ColumnValue;

/// Map an engine error into the workspace error type.
pub(crate) fn map_sql(e: rusqlite::Error) -> DatasyncError {
    DatasyncError::Sql {
        detail: e.to_string(),
    }
}

/// Whether a statement mutates the database and must hold the write permit.
///
/// DDL counts: dropping a table mutates the image as surely as deleting
/// rows does.
pub(crate) fn is_write_statement(sql: &str) -> bool {
    let upper = sql.trim_start().to_uppercase();
    [
        "INSERT", "UPDATE", "DELETE", "REPLACE", "CREATE", "DROP", "ALTER",
    ]
    .iter()
    .any(|kw| upper.starts_with(kw))
}

/// Convert a bound parameter into the engine's owned value type.
pub(crate) fn to_sql_value(value: &ColumnValue) -> SqlValue {
    match value {
        ColumnValue::Null => SqlValue::Null,
        ColumnValue::Integer(i) => SqlValue::Integer(*i),
        ColumnValue::Real(r) => SqlValue::Real(*r),
        ColumnValue::Text(t) => SqlValue::Text(t.clone()),
        ColumnValue::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

/// Convert an engine cell back into the public value model.
pub(crate) fn from_value_ref(value: ValueRef<'_>) -> ColumnValue {
    match value {
        ValueRef::Null => ColumnValue::Null,
        ValueRef::Integer(i) => ColumnValue::Integer(i),
        ValueRef::Real(r) => ColumnValue::Real(r),
        ValueRef::Text(t) => ColumnValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => ColumnValue::Blob(b.to_vec()),
    }
}

/// Run a pragma statement, draining any rows it returns.
///
/// Pragmas are inconsistent about producing rows (`journal_mode` answers,
/// `cache_size` assignment does not), so plain `execute` would error on some
/// of them.
pub(crate) fn run_pragma(conn: &Connection, sql: &str) -> Result<()> {
    let mut stmt = conn.prepare(sql).map_err(map_sql)?;
    let mut rows = stmt.query([]).map_err(map_sql)?;
    while rows.next().map_err(map_sql)?.is_some() {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_mutating_statements() {
        assert!(is_write_statement("INSERT INTO t VALUES (1)"));
        assert!(is_write_statement("  update t set v = 2"));
        assert!(is_write_statement("Delete From t"));
        assert!(is_write_statement("REPLACE INTO t VALUES (1)"));
        assert!(is_write_statement("CREATE TABLE t (id INTEGER)"));
        assert!(is_write_statement("DROP TABLE t"));
        assert!(is_write_statement("ALTER TABLE t ADD COLUMN v"));
    }

    #[test]
    fn classifies_read_statements() {
        assert!(!is_write_statement("SELECT * FROM t"));
        assert!(!is_write_statement("  select count(*) from t"));
        assert!(!is_write_statement("PRAGMA user_version"));
        assert!(!is_write_statement("EXPLAIN QUERY PLAN SELECT 1"));
    }

    #[test]
    fn value_conversion_roundtrip() {
        let values = vec![
            ColumnValue::Null,
            ColumnValue::Integer(42),
            ColumnValue::Real(-1.5),
            ColumnValue::Text("caf\u{00e9}".to_owned()),
            ColumnValue::Blob(vec![1, 2, 3]),
        ];
        for v in values {
            let sql = to_sql_value(&v);
            let back = from_value_ref(ValueRef::from(&sql));
            assert_eq!(v, back);
        }
    }
}
