// Integration test utilities
//
// In-memory and on-disk SQLite fixtures for the observation table

#![allow(dead_code)] // Not every test binary uses every helper

use jive::SqliteExecutor;
use std::path::{Path, PathBuf};

/// One observation: (test, arm, mediator, outcome)
pub type Observation = (&'static str, i64, f64, f64);

pub const CREATE_OBSERVATIONS: &str =
    "CREATE TABLE obs (test TEXT, arm INTEGER, m REAL, y REAL);";

/// Render observations as a single INSERT statement
pub fn insert_sql(rows: &[Observation]) -> String {
    let values: Vec<String> = rows
        .iter()
        .map(|(test, arm, m, y)| format!("('{}', {}, {:?}, {:?})", test, arm, m, y))
        .collect();
    format!("INSERT INTO obs VALUES {};", values.join(", "))
}

/// In-memory database holding `obs`
pub fn observations_db(rows: &[Observation]) -> SqliteExecutor {
    let db = SqliteExecutor::in_memory().expect("in-memory database");
    run_sql(&db, CREATE_OBSERVATIONS);
    if !rows.is_empty() {
        run_sql(&db, &insert_sql(rows));
    }
    db
}

/// In-memory database from arbitrary setup SQL
pub fn db_from_sql(sql: &str) -> SqliteExecutor {
    let db = SqliteExecutor::in_memory().expect("in-memory database");
    run_sql(&db, sql);
    db
}

pub fn run_sql(db: &SqliteExecutor, sql: &str) {
    db.connection().execute_batch(sql).expect("setup SQL");
}

/// Write `obs` to `dir/name` and return its path
pub fn observations_file(dir: &Path, name: &str, rows: &[Observation]) -> PathBuf {
    let path = dir.join(name);
    let conn = rusqlite::Connection::open(&path).expect("create database file");
    conn.execute_batch(CREATE_OBSERVATIONS).expect("create table");
    if !rows.is_empty() {
        conn.execute_batch(&insert_sql(rows)).expect("insert rows");
    }
    path
}

/// Three tests, two arms each, every row on y = 3m + 1
pub fn linear_mediation() -> Vec<Observation> {
    vec![
        ("T1", 0, 1.0, 4.0),
        ("T1", 0, 3.0, 10.0),
        ("T1", 1, 2.0, 7.0),
        ("T1", 1, 4.0, 13.0),
        ("T2", 0, 0.0, 1.0),
        ("T2", 0, 2.0, 7.0),
        ("T2", 1, 2.0, 7.0),
        ("T2", 1, 4.0, 13.0),
        ("T3", 0, 5.0, 16.0),
        ("T3", 0, 7.0, 22.0),
        ("T3", 1, 8.0, 25.0),
        ("T3", 1, 10.0, 31.0),
    ]
}
