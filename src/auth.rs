//! Login guard and password-change flow over an external credential store.
//!
//! These are composed at the HTTP boundary; nothing in the capture path
//! depends on them.

use thiserror::Error;
use tracing::{info, warn};

pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub user_name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("login required")]
    LoginRequired,
    #[error("Username not on record")]
    NotFound,
    #[error("Username and/or Password incorrect")]
    Invalid,
    #[error("new password does not match the confirmation password")]
    Mismatch,
    #[error("credential store failure: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// Opaque user store. Hashing and persistence live behind it.
pub trait CredentialStore: Send + Sync {
    /// `NotFound` for an unknown name, `Invalid` for a wrong password.
    fn verify(&self, user_name: &str, password: &str) -> Result<User>;

    fn verify_id(&self, id: UserId, password: &str) -> Result<User>;

    fn update_password(&self, id: UserId, new_password: &str) -> Result<()>;
}

/// Guard for protected routes: the session's user id, or `LoginRequired`
/// so the boundary can redirect to the login page.
pub fn require_login(session_user: Option<UserId>) -> Result<UserId> {
    session_user.ok_or(AuthError::LoginRequired)
}

/// Check `old_password`, require `new_password == confirm`, then store it.
pub fn change_password(
    store: &dyn CredentialStore,
    id: UserId,
    old_password: &str,
    new_password: &str,
    confirm: &str,
) -> Result<()> {
    store.verify_id(id, old_password).map_err(|e| {
        warn!("Password change for user {} rejected: {}", id, e);
        e
    })?;

    if new_password != confirm {
        return Err(AuthError::Mismatch);
    }

    store.update_password(id, new_password)?;
    info!("Password changed for user {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct PlainStore {
        user: User,
        password: Mutex<String>,
    }

    impl PlainStore {
        fn new(password: &str) -> Self {
            Self {
                user: User {
                    id: 1,
                    user_name: "sushi".into(),
                },
                password: Mutex::new(password.into()),
            }
        }

        fn check(&self, password: &str) -> Result<User> {
            if *self.password.lock().unwrap() == password {
                Ok(self.user.clone())
            } else {
                Err(AuthError::Invalid)
            }
        }
    }

    impl CredentialStore for PlainStore {
        fn verify(&self, user_name: &str, password: &str) -> Result<User> {
            if user_name != self.user.user_name {
                return Err(AuthError::NotFound);
            }
            self.check(password)
        }

        fn verify_id(&self, id: UserId, password: &str) -> Result<User> {
            if id != self.user.id {
                return Err(AuthError::NotFound);
            }
            self.check(password)
        }

        fn update_password(&self, _id: UserId, new_password: &str) -> Result<()> {
            *self.password.lock().unwrap() = new_password.into();
            Ok(())
        }
    }

    #[test]
    fn guard_needs_a_user() {
        assert_eq!(require_login(None), Err(AuthError::LoginRequired));
        assert_eq!(require_login(Some(7)), Ok(7));
    }

    #[test]
    fn change_password_happy_path() {
        let store = PlainStore::new("old");
        change_password(&store, 1, "old", "new", "new").unwrap();
        assert!(store.verify("sushi", "new").is_ok());
        assert_eq!(store.verify("sushi", "old"), Err(AuthError::Invalid));
    }

    #[test]
    fn wrong_old_password_is_invalid() {
        let store = PlainStore::new("old");
        assert_eq!(
            change_password(&store, 1, "nope", "new", "new"),
            Err(AuthError::Invalid)
        );
        assert!(store.verify("sushi", "old").is_ok());
    }

    #[test]
    fn confirmation_must_match() {
        let store = PlainStore::new("old");
        assert_eq!(
            change_password(&store, 1, "old", "new", "neww"),
            Err(AuthError::Mismatch)
        );
        assert!(store.verify("sushi", "old").is_ok());
    }

    #[test]
    fn unknown_user_is_not_found() {
        let store = PlainStore::new("old");
        assert_eq!(store.verify("mochi", "old"), Err(AuthError::NotFound));
    }
}
