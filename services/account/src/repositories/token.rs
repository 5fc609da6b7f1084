//! One-time code repository for the password-reset and email-change flows

use anyhow::Result;
use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{EmailChangeToken, PasswordResetToken};

/// Lifetime of a one-time code
pub const CODE_TTL_MINUTES: i64 = 5;

/// Generate a 6-digit numeric code, zero-padded
pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

/// Repository for the two one-time code tables
#[derive(Clone)]
pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    /// Create a new token repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a password-reset code for a user, replacing any prior one
    ///
    /// The table's primary key on `user_id` makes this a last-request-wins
    /// upsert: concurrent requests serialize on the row and only the latest
    /// code remains valid.
    pub async fn upsert_password_reset(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<PasswordResetToken> {
        let expires_at = Utc::now() + Duration::minutes(CODE_TTL_MINUTES);

        let row = sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET token = $2, expires_at = $3, created_at = now()
            RETURNING user_id, token, expires_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        info!("Stored password reset code for user {}", user_id);
        Ok(PasswordResetToken {
            user_id: row.get("user_id"),
            token: row.get("token"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
        })
    }

    /// Consume an unexpired password-reset code, returning its owner
    ///
    /// A single `DELETE … RETURNING` makes the code atomically one-time-use:
    /// of two concurrent confirmations, exactly one gets the row back.
    pub async fn consume_password_reset(&self, code: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query(
            r#"
            DELETE FROM password_reset_tokens
            WHERE token = $1 AND expires_at > now()
            RETURNING user_id
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get("user_id")))
    }

    /// Store an email-change code bound to the requested address, replacing
    /// any prior pending change for the user
    pub async fn upsert_email_change(
        &self,
        user_id: Uuid,
        new_email: &str,
        code: &str,
    ) -> Result<EmailChangeToken> {
        let expires_at = Utc::now() + Duration::minutes(CODE_TTL_MINUTES);

        let row = sqlx::query(
            r#"
            INSERT INTO email_change_tokens (user_id, new_email, token, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id)
            DO UPDATE SET new_email = $2, token = $3, expires_at = $4, created_at = now()
            RETURNING user_id, new_email, token, expires_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(new_email)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        info!("Stored email change code for user {}", user_id);
        Ok(EmailChangeToken {
            user_id: row.get("user_id"),
            new_email: row.get("new_email"),
            token: row.get("token"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
        })
    }
}
