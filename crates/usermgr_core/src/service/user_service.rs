//! User use-case service.
//!
//! # Responsibility
//! - Provide the entry points the console front-end calls.
//! - Combine lookup + mutation steps into single use-cases.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - Service layer remains storage-agnostic.

use crate::model::user::{User, UserId, UserPatch};
use crate::repo::user_repo::{RepoError, RepoResult, UserRepository};

/// Use-case service wrapper for user CRUD operations.
pub struct UserService<R: UserRepository> {
    repo: R,
}

impl<R: UserRepository> UserService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Builds a user from raw fields and saves it.
    ///
    /// Returns the stored record with `id` and `created_at` populated.
    pub fn create_user(
        &self,
        name: impl Into<String>,
        email: impl Into<String>,
        age: i32,
    ) -> RepoResult<User> {
        let mut user = User::new(name, email, age);
        self.repo.save(&mut user)?;
        Ok(user)
    }

    pub fn find_user(&self, id: UserId) -> RepoResult<Option<User>> {
        self.repo.find_by_id(id)
    }

    pub fn list_users(&self) -> RepoResult<Vec<User>> {
        self.repo.get_all_users()
    }

    /// Writes an already edited record back.
    pub fn update_user(&self, user: &User) -> RepoResult<()> {
        self.repo.update(user)
    }

    /// Loads the user, applies `patch` and writes it back.
    ///
    /// # Contract
    /// - Returns `RepoError::NotFound` when `id` does not exist.
    /// - An empty patch still round-trips through `update`.
    pub fn patch_user(&self, id: UserId, patch: &UserPatch) -> RepoResult<User> {
        let mut user = self.repo.find_by_id(id)?.ok_or(RepoError::NotFound(id))?;
        patch.apply_to(&mut user);
        self.repo.update(&user)?;
        Ok(user)
    }

    /// Loads the user and deletes it, returning the removed record.
    pub fn delete_user(&self, id: UserId) -> RepoResult<User> {
        let user = self.repo.find_by_id(id)?.ok_or(RepoError::NotFound(id))?;
        self.repo.delete(&user)?;
        Ok(user)
    }
}
