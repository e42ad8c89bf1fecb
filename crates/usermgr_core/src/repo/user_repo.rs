//! User repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide save/find/list/update/delete over the `users` table.
//! - Run every write inside one unit of work with commit-or-rollback semantics.
//! - Translate driver failures into the `RepoError` taxonomy.
//!
//! # Invariants
//! - Precondition failures (`InvalidArgument`) are returned before any I/O.
//! - A failed write leaves no partial state: the transaction is rolled back
//!   before the error is returned.
//! - Email uniqueness violations are always reported as `DuplicateEmail`,
//!   whether caught by the pre-check or by the storage constraint.
//! - "Not found" on reads is `Ok(None)`, never an error.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::user::{User, UserId, UserValidationError};
use log::{error, info, warn};
use rusqlite::{params, Connection, ErrorCode, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const USER_SELECT_SQL: &str = "SELECT
    id,
    name,
    email,
    age,
    created_at
FROM users";

const USERS_TABLE: &str = "users";
const USER_COLUMNS: [&str; 5] = ["id", "name", "email", "age", "created_at"];

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from user repository operations.
#[derive(Debug)]
pub enum RepoError {
    /// Caller input violates a precondition. Raised before touching storage.
    InvalidArgument(&'static str),
    /// Referenced user does not exist.
    NotFound(UserId),
    /// Another user already owns this email.
    DuplicateEmail(String),
    /// Declarative field constraint violated at write time.
    Validation(UserValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid `User`.
    InvalidData(String),
}

impl RepoError {
    /// Returns whether this error belongs to the storage failure family.
    ///
    /// `DuplicateEmail` is classified as a storage failure as well, so callers
    /// that only care about "the store refused the write" can match once.
    pub fn is_data_access(&self) -> bool {
        matches!(self, Self::Db(_) | Self::DuplicateEmail(_))
    }

    /// Stable machine-readable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::DuplicateEmail(_) => "duplicate_email",
            Self::Validation(_) => "validation_failed",
            Self::Db(_) => "db_error",
            Self::UninitializedConnection { .. } => "uninitialized_connection",
            Self::MissingRequiredTable(_) => "missing_table",
            Self::MissingRequiredColumn { .. } => "missing_column",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::NotFound(id) => write!(f, "user not found: {id}"),
            Self::DuplicateEmail(email) => write!(f, "email already exists: {email}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table missing: {table}"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column missing: {table}.{column}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted user data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<UserValidationError> for RepoError {
    fn from(value: UserValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for user CRUD operations.
pub trait UserRepository {
    /// Inserts `user` and writes the generated `id` and `created_at` back into it.
    fn save(&self, user: &mut User) -> RepoResult<UserId>;
    /// Looks up one user by primary key. `Ok(None)` when no row matches.
    fn find_by_id(&self, id: UserId) -> RepoResult<Option<User>>;
    /// Returns every stored user ordered by id.
    fn get_all_users(&self) -> RepoResult<Vec<User>>;
    /// Replaces `name`, `email` and `age` of an existing user.
    fn update(&self, user: &User) -> RepoResult<()>;
    /// Removes an existing user by primary key.
    fn delete(&self, user: &User) -> RepoResult<()>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations were not applied.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the schema is
    ///   not the one this binary writes.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_user_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Runs `action` inside one immediate transaction.
    ///
    /// Commits when `action` succeeds. Any error rolls the whole unit of work
    /// back before it is returned; categorized errors keep their kind and raw
    /// driver errors surface as `RepoError::Db` carrying the cause.
    ///
    /// # Side effects
    /// - Emits one `event=<event>` line with `status=ok|error`.
    fn in_transaction<T>(
        &self,
        event: &'static str,
        action: impl FnOnce(&Transaction<'_>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let started_at = Instant::now();
        let result = self.run_unit_of_work(event, action);
        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(_) => info!("event={event} module=repo status=ok duration_ms={duration_ms}"),
            Err(RepoError::Db(db_err)) => error!(
                "event={event} module=repo status=error duration_ms={duration_ms} error_code=db_error error={db_err}"
            ),
            Err(err) => error!(
                "event={event} module=repo status=error duration_ms={duration_ms} error_code={}",
                err.code()
            ),
        }
        result
    }

    fn run_unit_of_work<T>(
        &self,
        event: &'static str,
        action: impl FnOnce(&Transaction<'_>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        match action(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("event={event}_rollback module=repo status=error error={rollback_err}");
                }
                Err(err)
            }
        }
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn save(&self, user: &mut User) -> RepoResult<UserId> {
        require_email(&user.email)?;
        if user.is_persisted() {
            return Err(RepoError::InvalidArgument(
                "user already has an id; use update instead",
            ));
        }

        let pending: &User = user;
        let (id, created_at) = self.in_transaction("user_save", |tx| {
            if email_exists(tx, &pending.email)? {
                return Err(RepoError::DuplicateEmail(pending.email.clone()));
            }
            pending.validate()?;

            tx.execute(
                "INSERT INTO users (name, email, age) VALUES (?1, ?2, ?3);",
                params![pending.name.as_str(), pending.email.as_str(), pending.age],
            )
            .map_err(|err| classify_write_error(err, &pending.email))?;

            let id = tx.last_insert_rowid();
            let created_at: i64 = tx.query_row(
                "SELECT created_at FROM users WHERE id = ?1;",
                [id],
                |row| row.get(0),
            )?;
            Ok((id, created_at))
        })?;

        user.id = Some(id);
        user.created_at = Some(created_at);
        Ok(id)
    }

    fn find_by_id(&self, id: UserId) -> RepoResult<Option<User>> {
        require_positive_id(id)?;

        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_user_row(row)?));
        }
        Ok(None)
    }

    fn get_all_users(&self) -> RepoResult<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }
        Ok(users)
    }

    fn update(&self, user: &User) -> RepoResult<()> {
        let id = require_id(user)?;

        self.in_transaction("user_update", |tx| {
            if !user_exists(tx, id)? {
                return Err(RepoError::NotFound(id));
            }
            user.validate()?;

            tx.execute(
                "UPDATE users
                 SET
                    name = ?2,
                    email = ?3,
                    age = ?4
                 WHERE id = ?1;",
                params![id, user.name.as_str(), user.email.as_str(), user.age],
            )
            .map_err(|err| classify_write_error(err, &user.email))?;
            Ok(())
        })
    }

    fn delete(&self, user: &User) -> RepoResult<()> {
        require_email(&user.email)?;
        let id = require_id(user)?;

        self.in_transaction("user_delete", |tx| {
            if !user_exists(tx, id)? {
                return Err(RepoError::NotFound(id));
            }
            tx.execute("DELETE FROM users WHERE id = ?1;", [id])?;
            Ok(())
        })
    }
}

fn require_email(email: &str) -> RepoResult<()> {
    if email.trim().is_empty() {
        return Err(RepoError::InvalidArgument("email must not be blank"));
    }
    Ok(())
}

fn require_positive_id(id: UserId) -> RepoResult<()> {
    if id <= 0 {
        return Err(RepoError::InvalidArgument("user id must be positive"));
    }
    Ok(())
}

fn require_id(user: &User) -> RepoResult<UserId> {
    let id = user
        .id
        .ok_or(RepoError::InvalidArgument("user has no id; save it first"))?;
    require_positive_id(id)?;
    Ok(id)
}

fn email_exists(conn: &Connection, email: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1);",
        [email],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn user_exists(conn: &Connection, id: UserId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1);",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Maps a unique-constraint hit on `users.email` to `DuplicateEmail`; every
/// other driver error stays a storage error.
///
/// On `save` the pre-check and insert share one `IMMEDIATE` transaction, so
/// the insert cannot hit the constraint there; `update` reaches it directly.
fn classify_write_error(err: rusqlite::Error, email: &str) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == ErrorCode::ConstraintViolation
            && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            && message.contains("users.email")
        {
            return RepoError::DuplicateEmail(email.to_string());
        }
    }
    err.into()
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let id: UserId = row.get("id")?;
    let user = User {
        id: Some(id),
        name: row.get("name")?,
        email: row.get("email")?,
        age: row.get("age")?,
        created_at: Some(row.get("created_at")?),
    };
    user.validate()
        .map_err(|err| RepoError::InvalidData(format!("users.id={id}: {err}")))?;
    Ok(user)
}

fn ensure_user_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, USERS_TABLE)? {
        return Err(RepoError::MissingRequiredTable(USERS_TABLE));
    }

    for column in USER_COLUMNS {
        if !table_has_column(conn, USERS_TABLE, column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: USERS_TABLE,
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::{classify_write_error, RepoError};
    use crate::db::open_db_in_memory;

    #[test]
    fn unique_email_violation_is_classified_as_duplicate() {
        let conn = open_db_in_memory().unwrap();
        conn.execute(
            "INSERT INTO users (name, email, age) VALUES ('A', 'x@example.com', 30);",
            [],
        )
        .unwrap();
        let err = conn
            .execute(
                "INSERT INTO users (name, email, age) VALUES ('B', 'x@example.com', 31);",
                [],
            )
            .unwrap_err();

        match classify_write_error(err, "x@example.com") {
            RepoError::DuplicateEmail(email) => assert_eq!(email, "x@example.com"),
            other => panic!("expected DuplicateEmail, got {other:?}"),
        }
    }

    #[test]
    fn check_violation_stays_storage_error() {
        let conn = open_db_in_memory().unwrap();
        let err = conn
            .execute(
                "INSERT INTO users (name, email, age) VALUES ('A', 'old@example.com', 121);",
                [],
            )
            .unwrap_err();

        let classified = classify_write_error(err, "old@example.com");
        assert!(matches!(classified, RepoError::Db(_)));
        assert_eq!(classified.code(), "db_error");
    }
}
