//! Bootstrap administrator account.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::AuthConfig;
use crate::error::Result;
use crate::models::{NewUser, PermissionFlags};
use crate::password::hash_password;
use crate::storage::Storage;

/// Create the configured administrator unless an account with that
/// username exists. Returns the new id when one was created.
///
/// # Errors
///
/// Returns an error if the lookup or insert fails.
pub fn ensure_admin_account(
    storage: &Storage,
    auth: &AuthConfig,
    now: DateTime<Utc>,
) -> Result<Option<i64>> {
    if storage.get_user_by_username(&auth.admin_username)?.is_some() {
        debug!(username = %auth.admin_username, "Admin account present");
        return Ok(None);
    }

    let admin = NewUser {
        username: auth.admin_username.clone(),
        password_hash: hash_password(&auth.admin_password, auth.password_iterations),
        name: auth.admin_name.clone(),
        email: auth.admin_email.clone(),
        permissions: PermissionFlags::all(),
        is_admin: true,
        ..NewUser::default()
    };
    let id = storage.create_user(&admin, now)?;
    info!(username = %admin.username, id, "Created admin account");
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::verify_password;
    use crate::storage::test_support::{at, storage};

    fn auth() -> AuthConfig {
        AuthConfig {
            password_iterations: 1000,
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_creates_admin_once() {
        let storage = storage();
        let auth = auth();

        let id = ensure_admin_account(&storage, &auth, at(2025, 3, 1, 8, 0))
            .unwrap()
            .unwrap();
        let admin = storage.get_user(id).unwrap().unwrap();
        assert!(admin.is_admin);
        assert_eq!(admin.permissions, PermissionFlags::all());
        assert_eq!(admin.email.as_deref(), Some("admin@example.com"));
        assert!(verify_password(&admin.password_hash, "admin123"));

        let again = ensure_admin_account(&storage, &auth, at(2025, 3, 2, 8, 0)).unwrap();
        assert_eq!(again, None);
        assert_eq!(storage.count_users().unwrap(), 1);
    }
}
