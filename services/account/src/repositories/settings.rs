//! Settings repository for database operations

use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::UserSettings;

/// Settings repository
#[derive(Clone)]
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    /// Create a new settings repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a user's settings, falling back to defaults when no row exists
    pub async fn get(&self, user_id: Uuid) -> Result<UserSettings> {
        let row = sqlx::query(
            r#"
            SELECT email_notifications, weather_alerts, weekly_digest, data_sharing
            FROM user_settings
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(UserSettings {
                email_notifications: row.get("email_notifications"),
                weather_alerts: row.get("weather_alerts"),
                weekly_digest: row.get("weekly_digest"),
                data_sharing: row.get("data_sharing"),
            }),
            None => Ok(UserSettings::default()),
        }
    }

    /// Persist a user's settings, creating the row on first update
    pub async fn update(&self, user_id: Uuid, settings: &UserSettings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_settings
                (user_id, email_notifications, weather_alerts, weekly_digest, data_sharing)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id)
            DO UPDATE SET
                email_notifications = $2,
                weather_alerts = $3,
                weekly_digest = $4,
                data_sharing = $5,
                updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(settings.email_notifications)
        .bind(settings.weather_alerts)
        .bind(settings.weekly_digest)
        .bind(settings.data_sharing)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// These tests need a migrated database; run with `cargo test -- --ignored`
// and DATABASE_URL set.
#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> PgPool {
        PgPool::connect(&std::env::var("DATABASE_URL").expect("DATABASE_URL not set"))
            .await
            .expect("failed to connect to test database")
    }

    async fn create_user(pool: &PgPool) -> Uuid {
        let row = sqlx::query(
            "INSERT INTO users (email, name, password_hash) VALUES ($1, 'Test User', 'x') RETURNING id",
        )
        .bind(format!("{}@test.example", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .unwrap();
        row.get("id")
    }

    #[tokio::test]
    #[ignore]
    async fn test_defaults_then_update_round_trip() {
        let pool = test_pool().await;
        let repo = SettingsRepository::new(pool.clone());
        let user_id = create_user(&pool).await;

        // No row yet: defaults
        let settings = repo.get(user_id).await.unwrap();
        assert!(settings.email_notifications);
        assert!(!settings.weekly_digest);

        let updated = UserSettings {
            email_notifications: false,
            weather_alerts: true,
            weekly_digest: true,
            data_sharing: false,
        };
        repo.update(user_id, &updated).await.unwrap();

        let settings = repo.get(user_id).await.unwrap();
        assert!(!settings.email_notifications);
        assert!(settings.weekly_digest);

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&pool)
            .await
            .unwrap();
    }
}
