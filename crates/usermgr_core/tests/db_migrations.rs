use rusqlite::Connection;
use usermgr_core::db::migrations::latest_version;
use usermgr_core::db::{open_db, open_db_in_memory, DbError};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "users");
}

#[test]
fn opening_same_database_twice_is_idempotent_and_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("usermgr.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    conn_first
        .execute(
            "INSERT INTO users (name, email, age) VALUES ('Kept', 'kept@example.com', 30);",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let count: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM users;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn schema_rejects_out_of_range_age() {
    let conn = open_db_in_memory().unwrap();

    let err = conn
        .execute(
            "INSERT INTO users (name, email, age) VALUES ('Old', 'old@example.com', 121);",
            [],
        )
        .unwrap_err();
    assert_eq!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    );
}

#[test]
fn schema_sets_created_at_and_keeps_it_immutable() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO users (name, email, age) VALUES ('Stamp', 'stamp@example.com', 30);",
        [],
    )
    .unwrap();

    let created_at: i64 = conn
        .query_row("SELECT created_at FROM users;", [], |row| row.get(0))
        .unwrap();
    assert!(created_at > 0);

    let err = conn
        .execute("UPDATE users SET created_at = 1;", [])
        .unwrap_err();
    assert!(err.to_string().contains("immutable"), "unexpected error: {err}");

    conn.execute("UPDATE users SET age = 31;", []).unwrap();
    let after: i64 = conn
        .query_row("SELECT created_at FROM users;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(after, created_at);
}

#[test]
fn upgrade_from_first_schema_applies_only_missing_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v1.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_users.sql"))
        .unwrap();
    conn.execute_batch("PRAGMA user_version = 1;").unwrap();
    conn.execute(
        "INSERT INTO users (name, email, age) VALUES ('Early', 'early@example.com', 40);",
        [],
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    let trigger_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'trigger' AND name = 'users_created_at_immutable';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(trigger_count, 1);

    let email: String = conn
        .query_row("SELECT email FROM users;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(email, "early@example.com");
    assert!(conn.execute("UPDATE users SET created_at = 1;", []).is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
