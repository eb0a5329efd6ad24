//! Authentication module.
//!
//! Registration and credential checks on top of the repository contract.
//! Passwords are stored and compared as given.

use crate::error::{AppError, Result};
use crate::library::user::MIN_PASSWORD_LEN;
use crate::library::{SharedUser, User};
use crate::repository::RepositoryHandle;

pub use crate::library::generate_token;

/// Authentication service.
pub struct AuthService {
    repo: RepositoryHandle,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(repo: RepositoryHandle) -> Self {
        Self { repo }
    }

    /// Register a new user.
    pub fn register(&self, user_name: &str, password: &str, confirm: &str) -> Result<SharedUser> {
        if password != confirm {
            return Err(AppError::Auth("Passwords do not match".to_string()));
        }

        let user = User::new(user_name, password, None);
        if user.user_name().is_none() {
            return Err(AppError::Auth("Username must not be empty".to_string()));
        }
        if user.password().is_none() {
            return Err(AppError::Auth(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        // Hold the lock so the existence check and the insert are one step
        let mut repo = self.repo.lock();
        if repo.get_user(user_name)?.is_some() {
            return Err(AppError::Auth(format!(
                "User '{}' already exists",
                user_name.trim()
            )));
        }

        let user_id = user.user_id().to_string();
        repo.add_user(user)?;
        let stored = repo
            .get_user_by_id(&user_id)?
            .ok_or_else(|| AppError::Storage(format!("User {} vanished after insert", user_id)))?;

        tracing::info!(user = %user_name.trim(), "Registered user");
        Ok(stored)
    }

    /// Check credentials and return the matching user.
    pub fn login(&self, user_name: &str, password: &str) -> Result<SharedUser> {
        let user = self
            .repo
            .lock()
            .get_user(user_name)?
            .ok_or_else(|| AppError::Auth(format!("Unknown user '{}'", user_name.trim())))?;

        if user.read().password() != Some(password) {
            tracing::debug!(user = %user_name.trim(), "Rejected login");
            return Err(AppError::Auth("Incorrect password".to_string()));
        }

        Ok(user)
    }
}
