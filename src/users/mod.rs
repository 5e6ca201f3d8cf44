//! The layered user pipeline.
//!
//! Callers talk to [`Users`], which wraps a [`UserValidator`], which wraps a
//! store ([`PgUserDb`] or [`MemoryUserDb`]). Every layer implements
//! [`UserDb`], so each one can stand in for the layer it wraps.

use async_trait::async_trait;

use crate::error::Result;

pub mod credentials;
pub mod memory;
pub mod repo;
mod repo_types;
pub mod services;
pub mod validator;

pub use credentials::Credentials;
pub use memory::MemoryUserDb;
pub use repo::PgUserDb;
pub use repo_types::User;
pub use services::Users;
pub use validator::{Rule, UserValidator};

/// Single-user queries and mutations.
///
/// Lookups return `UserError::NotFound` when nothing matches; any other
/// failure from the backing store comes back as `UserError::Store`.
#[async_trait]
pub trait UserDb: Send + Sync {
    async fn by_id(&self, id: i64) -> Result<User>;

    async fn by_email(&self, email: &str) -> Result<User>;

    /// At the store this takes the digest; above it, the raw token.
    async fn by_remember(&self, token: &str) -> Result<User>;

    /// Persists a new user and back-fills id and timestamps.
    async fn create(&self, user: &mut User) -> Result<()>;

    /// Overwrites every mutable field of the user with `user.id`.
    async fn update(&self, user: &mut User) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn close(&self) -> Result<()>;

    /// Create the users table if absent and apply pending migrations.
    async fn ensure_schema(&self) -> Result<()>;

    /// Drop the users table and rebuild it.
    async fn reset_schema(&self) -> Result<()>;
}

#[async_trait]
pub trait UserService: UserDb {
    /// Returns the user for `email` if `password` matches, otherwise
    /// `NotFound` or `PasswordIncorrect`.
    async fn authenticate(&self, email: &str, password: &str) -> Result<User>;
}
