//! Ticket repository for database operations
//!
//! Every multi-step write (create with its first message, message append,
//! close, reopen) runs in a transaction, and status is re-read under
//! `FOR UPDATE` before any transition so concurrent requests serialize on
//! the ticket row.

use anyhow::Result;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    MessageOutcome, Ticket, TicketMessage, TicketPriority, TicketStats, TicketStatus,
    TicketStatusHistory, TicketSummary, TransitionOutcome,
};

const TICKET_COLUMNS: &str = "id, user_id, subject, category, priority, status, \
     created_at, updated_at, closed_by, closed_at";

/// Ticket repository
#[derive(Clone)]
pub struct TicketRepository {
    pool: PgPool,
}

impl TicketRepository {
    /// Create a new ticket repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn ticket_from_row(row: &PgRow) -> Result<Ticket> {
        let status: TicketStatus = row
            .get::<String, _>("status")
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        let priority: TicketPriority = row
            .get::<String, _>("priority")
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        Ok(Ticket {
            id: row.get("id"),
            user_id: row.get("user_id"),
            subject: row.get("subject"),
            category: row.get("category"),
            priority,
            status,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            closed_by: row.get("closed_by"),
            closed_at: row.get("closed_at"),
        })
    }

    fn message_from_row(row: &PgRow) -> TicketMessage {
        TicketMessage {
            id: row.get("id"),
            ticket_id: row.get("ticket_id"),
            sender_id: row.get("sender_id"),
            message: row.get("message"),
            is_admin_reply: row.get("is_admin_reply"),
            created_at: row.get("created_at"),
        }
    }

    /// Create a ticket in `open` state together with its initial message
    pub async fn create(
        &self,
        user_id: Uuid,
        subject: &str,
        category: &str,
        priority: TicketPriority,
        message: &str,
    ) -> Result<Ticket> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tickets (user_id, subject, category, priority, status)
            VALUES ($1, $2, $3, $4, 'open')
            RETURNING {TICKET_COLUMNS}
            "#,
        ))
        .bind(user_id)
        .bind(subject)
        .bind(category)
        .bind(priority.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let ticket = Self::ticket_from_row(&row)?;

        sqlx::query(
            r#"
            INSERT INTO ticket_messages (ticket_id, sender_id, message, is_admin_reply)
            VALUES ($1, $2, $3, false)
            "#,
        )
        .bind(ticket.id)
        .bind(user_id)
        .bind(message)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Created ticket {} for user {}", ticket.id, user_id);
        Ok(ticket)
    }

    /// Find a ticket by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Ticket>> {
        let row = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::ticket_from_row(&row)).transpose()
    }

    /// Append a message to a ticket's thread
    ///
    /// Status is re-checked under a row lock; a `closed` ticket rejects the
    /// message even if it closed after the caller's visibility check.
    pub async fn add_message(
        &self,
        ticket_id: Uuid,
        sender_id: Uuid,
        message: &str,
        is_admin_reply: bool,
    ) -> Result<MessageOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM tickets WHERE id = $1 FOR UPDATE")
            .bind(ticket_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Ok(MessageOutcome::NotFound);
        };

        let status: TicketStatus = row
            .get::<String, _>("status")
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        if !status.accepts_messages() {
            return Ok(MessageOutcome::TicketClosed);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO ticket_messages (ticket_id, sender_id, message, is_admin_reply)
            VALUES ($1, $2, $3, $4)
            RETURNING id, ticket_id, sender_id, message, is_admin_reply, created_at
            "#,
        )
        .bind(ticket_id)
        .bind(sender_id)
        .bind(message)
        .bind(is_admin_reply)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE tickets SET updated_at = now() WHERE id = $1")
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(MessageOutcome::Added(Self::message_from_row(&row)))
    }

    /// Close a ticket, recording who closed it and a history row
    pub async fn close(
        &self,
        ticket_id: Uuid,
        closed_by: Uuid,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM tickets WHERE id = $1 FOR UPDATE")
            .bind(ticket_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Ok(TransitionOutcome::NotFound);
        };

        let status: TicketStatus = row
            .get::<String, _>("status")
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        if !status.can_close() {
            return Ok(TransitionOutcome::InvalidState(status));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE tickets
            SET status = 'closed', closed_by = $2, closed_at = now(), updated_at = now()
            WHERE id = $1
            RETURNING {TICKET_COLUMNS}
            "#,
        ))
        .bind(ticket_id)
        .bind(closed_by)
        .fetch_one(&mut *tx)
        .await?;

        let ticket = Self::ticket_from_row(&row)?;

        sqlx::query(
            r#"
            INSERT INTO ticket_status_history (ticket_id, old_status, new_status, changed_by, reason)
            VALUES ($1, $2, 'closed', $3, $4)
            "#,
        )
        .bind(ticket_id)
        .bind(status.as_str())
        .bind(closed_by)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Closed ticket {} by user {}", ticket_id, closed_by);
        Ok(TransitionOutcome::Done(ticket))
    }

    /// Reopen a closed ticket with a mandatory reason
    pub async fn reopen(
        &self,
        ticket_id: Uuid,
        changed_by: Uuid,
        reason: &str,
    ) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM tickets WHERE id = $1 FOR UPDATE")
            .bind(ticket_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Ok(TransitionOutcome::NotFound);
        };

        let status: TicketStatus = row
            .get::<String, _>("status")
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        if !status.can_reopen() {
            return Ok(TransitionOutcome::InvalidState(status));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE tickets
            SET status = 'reopened', closed_by = NULL, closed_at = NULL, updated_at = now()
            WHERE id = $1
            RETURNING {TICKET_COLUMNS}
            "#,
        ))
        .bind(ticket_id)
        .fetch_one(&mut *tx)
        .await?;

        let ticket = Self::ticket_from_row(&row)?;

        sqlx::query(
            r#"
            INSERT INTO ticket_status_history (ticket_id, old_status, new_status, changed_by, reason)
            VALUES ($1, $2, 'reopened', $3, $4)
            "#,
        )
        .bind(ticket_id)
        .bind(status.as_str())
        .bind(changed_by)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Reopened ticket {} by user {}", ticket_id, changed_by);
        Ok(TransitionOutcome::Done(ticket))
    }

    /// List tickets with optional owner/status/priority filters
    ///
    /// `owner = None` lists every ticket (admin listing). Each summary
    /// carries its thread's message count.
    pub async fn list(
        &self,
        owner: Option<Uuid>,
        status: Option<TicketStatus>,
        priority: Option<TicketPriority>,
    ) -> Result<Vec<TicketSummary>> {
        let mut sql = format!(
            "SELECT t.id, t.user_id, t.subject, t.category, t.priority, t.status, \
             t.created_at, t.updated_at, t.closed_by, t.closed_at, \
             (SELECT count(*) FROM ticket_messages m WHERE m.ticket_id = t.id) AS message_count \
             FROM tickets t"
        );

        let mut conditions: Vec<String> = Vec::new();
        let mut n = 0;
        if owner.is_some() {
            n += 1;
            conditions.push(format!("t.user_id = ${}", n));
        }
        if status.is_some() {
            n += 1;
            conditions.push(format!("t.status = ${}", n));
        }
        if priority.is_some() {
            n += 1;
            conditions.push(format!("t.priority = ${}", n));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY t.updated_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(owner) = owner {
            query = query.bind(owner);
        }
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        if let Some(priority) = priority {
            query = query.bind(priority.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| {
                let ticket = Self::ticket_from_row(&row)?;
                Ok(TicketSummary {
                    ticket,
                    message_count: row.get("message_count"),
                })
            })
            .collect()
    }

    /// Aggregate counts for the admin listing
    pub async fn stats(&self) -> Result<TicketStats> {
        let row = sqlx::query(
            r#"
            SELECT
                count(*) FILTER (WHERE status = 'open') AS open,
                count(*) FILTER (WHERE status = 'reopened') AS reopened,
                count(*) FILTER (WHERE status = 'closed') AS closed,
                count(*) FILTER (WHERE priority = 'high') AS high_priority
            FROM tickets
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TicketStats {
            open: row.get("open"),
            reopened: row.get("reopened"),
            closed: row.get("closed"),
            high_priority: row.get("high_priority"),
        })
    }

    /// A ticket's thread, oldest first
    pub async fn messages(&self, ticket_id: Uuid) -> Result<Vec<TicketMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, ticket_id, sender_id, message, is_admin_reply, created_at
            FROM ticket_messages
            WHERE ticket_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::message_from_row).collect())
    }

    /// A ticket's status audit trail, oldest first
    pub async fn history(&self, ticket_id: Uuid) -> Result<Vec<TicketStatusHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT ticket_id, old_status, new_status, changed_by, reason, changed_at
            FROM ticket_status_history
            WHERE ticket_id = $1
            ORDER BY changed_at
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let old_status: TicketStatus = row
                    .get::<String, _>("old_status")
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))?;
                let new_status: TicketStatus = row
                    .get::<String, _>("new_status")
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))?;

                Ok(TicketStatusHistory {
                    ticket_id: row.get("ticket_id"),
                    old_status,
                    new_status,
                    changed_by: row.get("changed_by"),
                    reason: row.get("reason"),
                    changed_at: row.get("changed_at"),
                })
            })
            .collect()
    }
}

// These tests need a migrated database; run with `cargo test -- --ignored`
// and DATABASE_URL set.
#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

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

    async fn delete_user(pool: &PgPool, user_id: Uuid) {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    #[serial]
    #[ignore]
    async fn test_create_ticket_with_initial_message() {
        let pool = test_pool().await;
        let repo = TicketRepository::new(pool.clone());
        let user_id = create_user(&pool).await;

        let ticket = repo
            .create(
                user_id,
                "Forecast page stuck loading",
                "weather",
                TicketPriority::Medium,
                "The hourly view spins forever after login.",
            )
            .await
            .unwrap();

        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.user_id, user_id);

        let messages = repo.messages(ticket.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_id, user_id);
        assert!(!messages[0].is_admin_reply);

        delete_user(&pool, user_id).await;
    }

    #[tokio::test]
    #[serial]
    #[ignore]
    async fn test_closed_ticket_rejects_messages_until_reopened() {
        let pool = test_pool().await;
        let repo = TicketRepository::new(pool.clone());
        let user_id = create_user(&pool).await;

        let ticket = repo
            .create(
                user_id,
                "Wrong units shown",
                "weather",
                TicketPriority::Low,
                "Temperatures render in Kelvin on the detail page.",
            )
            .await
            .unwrap();

        let outcome = repo.close(ticket.id, user_id, Some("resolved")).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Done(_)));

        let outcome = repo
            .add_message(ticket.id, user_id, "It happened again today.", false)
            .await
            .unwrap();
        assert!(matches!(outcome, MessageOutcome::TicketClosed));

        // Close is not legal twice
        let outcome = repo.close(ticket.id, user_id, None).await.unwrap();
        assert!(matches!(
            outcome,
            TransitionOutcome::InvalidState(TicketStatus::Closed)
        ));

        let outcome = repo
            .reopen(ticket.id, user_id, "issue came back")
            .await
            .unwrap();
        let TransitionOutcome::Done(reopened) = outcome else {
            panic!("expected reopen to succeed");
        };
        assert_eq!(reopened.status, TicketStatus::Reopened);
        assert!(reopened.closed_by.is_none());

        let outcome = repo
            .add_message(ticket.id, user_id, "It happened again today.", false)
            .await
            .unwrap();
        assert!(matches!(outcome, MessageOutcome::Added(_)));

        // Both transitions landed in the audit trail
        let history = repo.history(ticket.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].new_status, TicketStatus::Closed);
        assert_eq!(history[1].new_status, TicketStatus::Reopened);
        assert_eq!(history[1].reason.as_deref(), Some("issue came back"));

        delete_user(&pool, user_id).await;
    }

    #[tokio::test]
    #[serial]
    #[ignore]
    async fn test_reopen_only_legal_from_closed() {
        let pool = test_pool().await;
        let repo = TicketRepository::new(pool.clone());
        let user_id = create_user(&pool).await;

        let ticket = repo
            .create(
                user_id,
                "Export misses last day",
                "analytics",
                TicketPriority::Medium,
                "CSV export drops the most recent day of data.",
            )
            .await
            .unwrap();

        let outcome = repo.reopen(ticket.id, user_id, "still open").await.unwrap();
        assert!(matches!(
            outcome,
            TransitionOutcome::InvalidState(TicketStatus::Open)
        ));

        delete_user(&pool, user_id).await;
    }

    #[tokio::test]
    #[serial]
    #[ignore]
    async fn test_list_visibility_and_stats() {
        let pool = test_pool().await;
        let repo = TicketRepository::new(pool.clone());
        let user_a = create_user(&pool).await;
        let user_b = create_user(&pool).await;

        let before = repo.stats().await.unwrap();

        let ticket_a = repo
            .create(
                user_a,
                "Login loops",
                "account",
                TicketPriority::Medium,
                "I get bounced back to the login form.",
            )
            .await
            .unwrap();
        repo.create(
            user_b,
            "Radar tiles missing",
            "weather",
            TicketPriority::Low,
            "The radar overlay shows grey squares.",
        )
        .await
        .unwrap();

        let a_tickets = repo.list(Some(user_a), None, None).await.unwrap();
        assert_eq!(a_tickets.len(), 1);
        assert_eq!(a_tickets[0].ticket.id, ticket_a.id);
        assert_eq!(a_tickets[0].message_count, 1);

        let filtered = repo
            .list(Some(user_a), Some(TicketStatus::Closed), None)
            .await
            .unwrap();
        assert!(filtered.is_empty());

        let after = repo.stats().await.unwrap();
        assert_eq!(after.open - before.open, 2);
        assert_eq!(after.high_priority, before.high_priority);

        delete_user(&pool, user_a).await;
        delete_user(&pool, user_b).await;
    }
}
