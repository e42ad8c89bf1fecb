//! User domain model.
//!
//! # Responsibility
//! - Define the persisted `User` record and its declarative constraints.
//! - Provide partial-override (`UserPatch`) semantics for edits.
//!
//! # Invariants
//! - `name` is never blank.
//! - `age` stays within `MIN_AGE..=MAX_AGE`; values are rejected, never clamped.
//! - `id` is `None` until the record has been inserted.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage-generated primary key.
pub type UserId = i64;

/// Lowest accepted age, inclusive.
pub const MIN_AGE: i32 = 0;
/// Highest accepted age, inclusive.
pub const MAX_AGE: i32 = 120;

/// Declarative constraint violations on a `User`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    BlankName,
    AgeOutOfRange { age: i32 },
}

impl Display for UserValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "name must not be blank"),
            Self::AgeOutOfRange { age } => write!(
                f,
                "age ({age}) must be between {MIN_AGE} and {MAX_AGE}"
            ),
        }
    }
}

impl Error for UserValidationError {}

/// Persisted user record.
///
/// Deserialization runs `validate()`, so a decoded value always satisfies the
/// declarative constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UserFields")]
pub struct User {
    /// Assigned by storage on insert.
    pub id: Option<UserId>,
    pub name: String,
    /// Unique across all stored users.
    pub email: String,
    pub age: i32,
    /// Unix epoch milliseconds, set once by storage.
    pub created_at: Option<i64>,
}

#[derive(Deserialize)]
struct UserFields {
    id: Option<UserId>,
    name: String,
    email: String,
    age: i32,
    created_at: Option<i64>,
}

impl TryFrom<UserFields> for User {
    type Error = UserValidationError;

    fn try_from(value: UserFields) -> Result<Self, Self::Error> {
        let user = Self {
            id: value.id,
            name: value.name,
            email: value.email,
            age: value.age,
            created_at: value.created_at,
        };
        user.validate()?;
        Ok(user)
    }
}

impl User {
    /// Creates an unsaved user. No validation happens here; constraints are
    /// checked when the record is written.
    pub fn new(name: impl Into<String>, email: impl Into<String>, age: i32) -> Self {
        Self {
            id: None,
            name: name.into(),
            email: email.into(),
            age,
            created_at: None,
        }
    }

    /// Checks declarative field constraints.
    pub fn validate(&self) -> Result<(), UserValidationError> {
        if self.name.trim().is_empty() {
            return Err(UserValidationError::BlankName);
        }
        if !(MIN_AGE..=MAX_AGE).contains(&self.age) {
            return Err(UserValidationError::AgeOutOfRange { age: self.age });
        }
        Ok(())
    }

    /// Returns whether storage has assigned an id.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// Optional overrides for the mutable user fields.
///
/// `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i32>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.age.is_none()
    }

    /// Writes the supplied overrides onto `user`. `id` and `created_at` are
    /// never touched.
    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(age) = self.age {
            user.age = age;
        }
    }
}
