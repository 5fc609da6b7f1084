//! User repository for database operations

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use common::error::is_unique_violation;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::user::{EmailChangeOutcome, User};

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Hash a password with a fresh salt
    fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();
        Ok(hash)
    }

    fn user_from_row(row: &sqlx::postgres::PgRow) -> User {
        User {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            password_hash: row.get("password_hash"),
            is_admin: row.get("is_admin"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, name, password_hash, is_admin, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Self::user_from_row(&row)))
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, name, password_hash, is_admin, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Self::user_from_row(&row)))
    }

    /// Check whether an email address belongs to any account other than `exclude`
    pub async fn email_taken(&self, email: &str, exclude: Uuid) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS present FROM users WHERE email = $1 AND id <> $2")
            .bind(email)
            .bind(exclude)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    /// Verify a user's password against the stored hash
    pub fn verify_password(&self, user: &User, password: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

        let argon2 = Argon2::default();
        let result = argon2.verify_password(password.as_bytes(), &parsed_hash);

        Ok(result.is_ok())
    }

    /// Re-hash and persist a new password for a user
    pub async fn update_password(&self, user_id: Uuid, new_password: &str) -> Result<()> {
        let password_hash = Self::hash_password(new_password)?;

        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&password_hash)
        .execute(&self.pool)
        .await?;

        info!("Updated password for user {}", user_id);
        Ok(())
    }

    /// Commit an email change gated by a one-time code
    ///
    /// Token consumption and the address update run in one transaction. The
    /// unique index on `users.email` is the authority on uniqueness: a
    /// concurrent confirmation for the same address loses here with
    /// `EmailTaken` even though its earlier pre-check passed.
    pub async fn change_email(
        &self,
        user_id: Uuid,
        new_email: &str,
        code: &str,
    ) -> Result<EmailChangeOutcome> {
        let mut tx = self.pool.begin().await?;

        // One-time use: the row is gone after this statement, matched or not.
        let consumed = sqlx::query(
            r#"
            DELETE FROM email_change_tokens
            WHERE user_id = $1 AND new_email = $2 AND token = $3 AND expires_at > now()
            RETURNING user_id
            "#,
        )
        .bind(user_id)
        .bind(new_email)
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?;

        if consumed.is_none() {
            return Ok(EmailChangeOutcome::InvalidToken);
        }

        let old_row = sqlx::query("SELECT email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(old_row) = old_row else {
            return Ok(EmailChangeOutcome::InvalidToken);
        };
        let old_email: String = old_row.get("email");

        let update = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(new_email)
        .execute(&mut *tx)
        .await;

        match update {
            Ok(_) => {
                tx.commit().await?;
                info!("Updated email for user {}", user_id);
                Ok(EmailChangeOutcome::Updated { old_email })
            }
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                Ok(EmailChangeOutcome::EmailTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a user account
    ///
    /// Tokens, settings, and tickets go with it via `ON DELETE CASCADE`.
    pub async fn delete(&self, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            info!("Deleted account for user {}", user_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = UserRepository::hash_password("correct horse").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();

        assert!(
            Argon2::default()
                .verify_password(b"correct horse", &parsed)
                .is_ok()
        );
        assert!(
            Argon2::default()
                .verify_password(b"wrong horse", &parsed)
                .is_err()
        );
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = UserRepository::hash_password("same input").unwrap();
        let b = UserRepository::hash_password("same input").unwrap();
        assert_ne!(a, b);
    }

    // The tests below need a migrated database; run with `cargo test -- --ignored`
    // and DATABASE_URL set.

    use crate::repositories::TokenRepository;

    async fn test_pool() -> PgPool {
        PgPool::connect(&std::env::var("DATABASE_URL").expect("DATABASE_URL not set"))
            .await
            .expect("failed to connect to test database")
    }

    async fn create_user(pool: &PgPool, password: &str) -> Uuid {
        let hash = UserRepository::hash_password(password).unwrap();
        let row = sqlx::query(
            "INSERT INTO users (email, name, password_hash) VALUES ($1, 'Test User', $2) RETURNING id",
        )
        .bind(format!("{}@test.example", Uuid::new_v4()))
        .bind(hash)
        .fetch_one(pool)
        .await
        .unwrap();
        row.get("id")
    }

    #[tokio::test]
    #[ignore]
    async fn test_password_change_invalidates_old_password() {
        let pool = test_pool().await;
        let repo = UserRepository::new(pool.clone());
        let user_id = create_user(&pool, "old password").await;

        repo.update_password(user_id, "new password").await.unwrap();

        let user = repo.find_by_id(user_id).await.unwrap().unwrap();
        assert!(!repo.verify_password(&user, "old password").unwrap());
        assert!(repo.verify_password(&user, "new password").unwrap());

        repo.delete(user_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_email_change_flow_consumes_code() {
        let pool = test_pool().await;
        let user_repo = UserRepository::new(pool.clone());
        let token_repo = TokenRepository::new(pool.clone());
        let user_id = create_user(&pool, "password").await;

        let new_email = format!("{}@new.example", Uuid::new_v4());
        token_repo
            .upsert_email_change(user_id, &new_email, "104743")
            .await
            .unwrap();

        let outcome = user_repo
            .change_email(user_id, &new_email, "104743")
            .await
            .unwrap();
        assert!(matches!(outcome, EmailChangeOutcome::Updated { .. }));

        let user = user_repo.find_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.email, new_email);

        // The code was deleted on first use
        let outcome = user_repo
            .change_email(user_id, &new_email, "104743")
            .await
            .unwrap();
        assert!(matches!(outcome, EmailChangeOutcome::InvalidToken));

        user_repo.delete(user_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_email_change_loses_to_existing_address() {
        let pool = test_pool().await;
        let user_repo = UserRepository::new(pool.clone());
        let token_repo = TokenRepository::new(pool.clone());
        let user_id = create_user(&pool, "password").await;
        let other_id = create_user(&pool, "password").await;

        let other = user_repo.find_by_id(other_id).await.unwrap().unwrap();

        // A pending change to an address that another account now holds
        // must fail at commit time even though it passed at request time.
        token_repo
            .upsert_email_change(user_id, &other.email, "104759")
            .await
            .unwrap();

        let outcome = user_repo
            .change_email(user_id, &other.email, "104759")
            .await
            .unwrap();
        assert!(matches!(outcome, EmailChangeOutcome::EmailTaken));

        user_repo.delete(user_id).await.unwrap();
        user_repo.delete(other_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_delete_account() {
        let pool = test_pool().await;
        let repo = UserRepository::new(pool.clone());
        let user_id = create_user(&pool, "password").await;

        assert!(repo.delete(user_id).await.unwrap());
        assert!(repo.find_by_id(user_id).await.unwrap().is_none());
        assert!(!repo.delete(user_id).await.unwrap());
    }
}
