use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use sea_orm::*;

use crate::entities::{user, waitlist};
use crate::models::{User, WaitlistEntry};
use crate::password;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("email is already on the waitlist")]
    DuplicateEmail,
    #[error("username is already taken")]
    DuplicateUsername,
    #[error("database error: {0}")]
    Database(DbErr),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

impl From<DbErr> for StorageError {
    fn from(e: DbErr) -> Self {
        Self::Database(e)
    }
}

fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Domain operations over the `users` and `waitlist` tables.
pub trait Storage: Send + Sync {
    /// Fails with [`StorageError::DuplicateEmail`] when the store already holds the email.
    fn create_waitlist_entry<'a>(
        &'a self,
        full_name: &'a str,
        email: &'a str,
    ) -> BoxFuture<'a, Result<WaitlistEntry, StorageError>>;

    fn get_waitlist_entry_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<Option<WaitlistEntry>, StorageError>>;

    fn get_waitlist_count(&self) -> BoxFuture<'_, Result<u64, StorageError>>;

    /// Oldest first.
    fn get_all_waitlist_entries(&self) -> BoxFuture<'_, Result<Vec<WaitlistEntry>, StorageError>>;

    /// Deleting an id that does not exist is not an error.
    fn delete_waitlist_entry(&self, id: i32) -> BoxFuture<'_, Result<(), StorageError>>;

    fn create_user<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
        is_admin: bool,
    ) -> BoxFuture<'a, Result<User, StorageError>>;

    fn get_user(&self, id: i32) -> BoxFuture<'_, Result<Option<User>, StorageError>>;

    fn has_admin(&self) -> BoxFuture<'_, Result<bool, StorageError>>;

    /// Returns the user only when the password matches and the account is an admin.
    fn verify_admin_user<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<Option<User>, StorageError>>;
}

/// [`Storage`] backed by a sea-orm connection.
#[derive(Clone)]
pub struct SeaStorage {
    db: DatabaseConnection,
}

impl SeaStorage {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl Storage for SeaStorage {
    fn create_waitlist_entry<'a>(
        &'a self,
        full_name: &'a str,
        email: &'a str,
    ) -> BoxFuture<'a, Result<WaitlistEntry, StorageError>> {
        async move {
            let entry = waitlist::ActiveModel {
                full_name: Set(full_name.to_string()),
                email: Set(email.to_string()),
                created_at: Set(Utc::now()),
                ..Default::default()
            };

            entry.insert(&self.db).await.map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::DuplicateEmail
                } else {
                    e.into()
                }
            })
        }
        .boxed()
    }

    fn get_waitlist_entry_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<Option<WaitlistEntry>, StorageError>> {
        async move {
            Ok(waitlist::Entity::find()
                .filter(waitlist::Column::Email.eq(email))
                .one(&self.db)
                .await?)
        }
        .boxed()
    }

    fn get_waitlist_count(&self) -> BoxFuture<'_, Result<u64, StorageError>> {
        async move { Ok(waitlist::Entity::find().count(&self.db).await?) }.boxed()
    }

    fn get_all_waitlist_entries(&self) -> BoxFuture<'_, Result<Vec<WaitlistEntry>, StorageError>> {
        async move {
            Ok(waitlist::Entity::find()
                .order_by_asc(waitlist::Column::CreatedAt)
                .order_by_asc(waitlist::Column::Id)
                .all(&self.db)
                .await?)
        }
        .boxed()
    }

    fn delete_waitlist_entry(&self, id: i32) -> BoxFuture<'_, Result<(), StorageError>> {
        async move {
            let res = waitlist::Entity::delete_by_id(id).exec(&self.db).await?;
            if res.rows_affected == 0 {
                tracing::debug!("Delete of missing waitlist entry {id} ignored");
            }
            Ok(())
        }
        .boxed()
    }

    fn create_user<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
        is_admin: bool,
    ) -> BoxFuture<'a, Result<User, StorageError>> {
        async move {
            let owned = password.to_string();
            let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&owned))
                .await
                .map_err(|e| StorageError::PasswordHash(e.to_string()))?
                .map_err(|e| StorageError::PasswordHash(e.to_string()))?;

            let new_user = user::ActiveModel {
                username: Set(username.to_string()),
                password_hash: Set(password_hash),
                is_admin: Set(is_admin),
                created_at: Set(Utc::now()),
                ..Default::default()
            };

            new_user.insert(&self.db).await.map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::DuplicateUsername
                } else {
                    e.into()
                }
            })
        }
        .boxed()
    }

    fn get_user(&self, id: i32) -> BoxFuture<'_, Result<Option<User>, StorageError>> {
        async move { Ok(user::Entity::find_by_id(id).one(&self.db).await?) }.boxed()
    }

    fn has_admin(&self) -> BoxFuture<'_, Result<bool, StorageError>> {
        async move {
            let admins = user::Entity::find()
                .filter(user::Column::IsAdmin.eq(true))
                .count(&self.db)
                .await?;
            Ok(admins > 0)
        }
        .boxed()
    }

    fn verify_admin_user<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<Option<User>, StorageError>> {
        async move {
            let found = user::Entity::find()
                .filter(user::Column::Username.eq(username))
                .one(&self.db)
                .await?;

            // argon2 is CPU-bound; keep it off the async workers.
            let owned = password.to_string();
            let stored_hash = found.as_ref().map(|u| u.password_hash.clone());
            let matches = tokio::task::spawn_blocking(move || match stored_hash {
                Some(hash) => password::verify_password(&owned, &hash),
                None => password::verify_dummy(&owned),
            })
            .await
            .map_err(|e| StorageError::PasswordHash(e.to_string()))?;

            Ok(found.filter(|user| matches && user.is_admin))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn storage() -> SeaStorage {
        SeaStorage::new(db::init_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_create_and_lookup_entry() {
        let s = storage().await;
        let entry = s.create_waitlist_entry("Ada Lovelace", "ada@example.com").await.unwrap();
        assert_eq!(entry.full_name, "Ada Lovelace");
        assert_eq!(entry.email, "ada@example.com");

        let found = s.get_waitlist_entry_by_email("ada@example.com").await.unwrap();
        assert_eq!(found.map(|e| e.id), Some(entry.id));
        assert!(s.get_waitlist_entry_by_email("bob@example.com").await.unwrap().is_none());
        assert_eq!(s.get_waitlist_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unique_constraint_backstops_duplicate_insert() {
        let s = storage().await;
        s.create_waitlist_entry("Ada", "ada@example.com").await.unwrap();

        let err = s.create_waitlist_entry("Ada Again", "ada@example.com").await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateEmail));

        let err = s.create_waitlist_entry("Ada Shouting", "ADA@Example.com").await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateEmail));
        assert_eq!(s.get_waitlist_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_is_oldest_first_and_delete_is_idempotent() {
        let s = storage().await;
        let first = s.create_waitlist_entry("First", "first@example.com").await.unwrap();
        let second = s.create_waitlist_entry("Second", "second@example.com").await.unwrap();
        let third = s.create_waitlist_entry("Third", "third@example.com").await.unwrap();

        let ids: Vec<i32> = s.get_all_waitlist_entries().await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);

        s.delete_waitlist_entry(second.id).await.unwrap();
        s.delete_waitlist_entry(second.id).await.unwrap();
        s.delete_waitlist_entry(9999).await.unwrap();

        let ids: Vec<i32> = s.get_all_waitlist_entries().await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![first.id, third.id]);
    }

    #[tokio::test]
    async fn test_verify_admin_user() {
        let s = storage().await;
        assert!(!s.has_admin().await.unwrap());

        let admin = s.create_user("root", "s3cret!", true).await.unwrap();
        s.create_user("viewer", "s3cret!", false).await.unwrap();
        assert!(s.has_admin().await.unwrap());
        assert_ne!(admin.password_hash, "s3cret!");

        let ok = s.verify_admin_user("root", "s3cret!").await.unwrap();
        assert_eq!(ok.map(|u| u.id), Some(admin.id));
        assert!(s.verify_admin_user("root", "wrong-pass").await.unwrap().is_none());
        assert!(s.verify_admin_user("viewer", "s3cret!").await.unwrap().is_none());
        assert!(s.verify_admin_user("nobody", "s3cret!").await.unwrap().is_none());

        let err = s.create_user("root", "another1", true).await.unwrap_err();
        assert!(matches!(err, StorageError::DuplicateUsername));

        assert_eq!(s.get_user(admin.id).await.unwrap().map(|u| u.username), Some("root".to_string()));
        assert!(s.get_user(admin.id + 100).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_logins_verify_independently() {
        let s = storage().await;
        s.create_user("root", "s3cret!", true).await.unwrap();

        let attempts = [("root", "s3cret!"), ("root", "wrong-pass"), ("ghost", "s3cret!")];
        let results = futures::future::join_all(
            attempts
                .iter()
                .cycle()
                .take(6)
                .map(|(u, p)| s.verify_admin_user(u, p)),
        )
        .await;

        let granted: Vec<bool> = results
            .into_iter()
            .map(|r| r.unwrap().is_some())
            .collect();
        assert_eq!(granted, vec![true, false, false, true, false, false]);
    }
}
