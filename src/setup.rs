use rand::{distributions::Alphanumeric, Rng};

use crate::models::User;
use crate::storage::{Storage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("an admin account already exists")]
    AlreadyConfigured,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Create the first admin account. Refuses once any admin exists.
///
/// Callers that can race (the HTTP handler) serialise on `AppState::setup_lock`.
pub async fn claim_first_admin(
    storage: &dyn Storage,
    username: &str,
    password: &str,
) -> Result<User, SetupError> {
    if storage.has_admin().await? {
        return Err(SetupError::AlreadyConfigured);
    }
    let user = storage.create_user(username, password, true).await?;
    tracing::info!("Created first admin account '{}' (id {})", user.username, user.id);
    Ok(user)
}

/// Random password handed out by the first-run bootstrap.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// First-run bootstrap from the command line. Returns the generated password when an
/// admin was created, `None` when one already existed.
pub async fn bootstrap_admin(
    storage: &dyn Storage,
    username: &str,
) -> Result<Option<String>, StorageError> {
    let password = generate_password();
    match claim_first_admin(storage, username, &password).await {
        Ok(_) => Ok(Some(password)),
        Err(SetupError::AlreadyConfigured) => Ok(None),
        Err(SetupError::Storage(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::storage::SeaStorage;

    #[tokio::test]
    async fn test_claim_first_admin_only_once() {
        let storage = SeaStorage::new(db::init_memory().await.unwrap());

        let admin = claim_first_admin(&storage, "owner", "hunter22").await.unwrap();
        assert!(admin.is_admin);

        let err = claim_first_admin(&storage, "second", "hunter22").await.unwrap_err();
        assert!(matches!(err, SetupError::AlreadyConfigured));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_generates_usable_password() {
        let storage = SeaStorage::new(db::init_memory().await.unwrap());

        let password = bootstrap_admin(&storage, "owner").await.unwrap().unwrap();
        assert_eq!(password.len(), 16);
        assert!(storage.verify_admin_user("owner", &password).await.unwrap().is_some());

        assert!(bootstrap_admin(&storage, "owner").await.unwrap().is_none());
    }
}
