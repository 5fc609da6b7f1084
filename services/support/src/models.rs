//! Support ticket models
//!
//! The status state machine lives on `TicketStatus` so transition legality
//! can be checked (and tested) without touching the database; repositories
//! re-check it inside their transactions before writing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Ticket lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Reopened,
    Closed,
}

impl TicketStatus {
    /// Database/text representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Reopened => "reopened",
            TicketStatus::Closed => "closed",
        }
    }

    /// A reopened ticket behaves as open for messaging purposes
    pub fn accepts_messages(&self) -> bool {
        !matches!(self, TicketStatus::Closed)
    }

    /// Closing is legal from `open` and `reopened`
    pub fn can_close(&self) -> bool {
        matches!(self, TicketStatus::Open | TicketStatus::Reopened)
    }

    /// Reopening is legal only from `closed`
    pub fn can_reopen(&self) -> bool {
        matches!(self, TicketStatus::Closed)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TicketStatus::Open),
            "reopened" => Ok(TicketStatus::Reopened),
            "closed" => Ok(TicketStatus::Closed),
            other => Err(format!("Unknown ticket status: {}", other)),
        }
    }
}

/// Ticket priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
}

impl TicketPriority {
    /// Database/text representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
        }
    }
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TicketPriority::Low),
            "medium" => Ok(TicketPriority::Medium),
            "high" => Ok(TicketPriority::High),
            other => Err(format!("Unknown ticket priority: {}", other)),
        }
    }
}

/// Ticket entity
#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub category: String,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_by: Option<Uuid>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Ticket with its message count, as returned by list endpoints
#[derive(Debug, Clone, Serialize)]
pub struct TicketSummary {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub message_count: i64,
}

/// A message in a ticket's thread
#[derive(Debug, Clone, Serialize)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender_id: Uuid,
    pub message: String,
    pub is_admin_reply: bool,
    pub created_at: DateTime<Utc>,
}

/// One entry in a ticket's status audit trail
#[derive(Debug, Clone, Serialize)]
pub struct TicketStatusHistory {
    pub ticket_id: Uuid,
    pub old_status: TicketStatus,
    pub new_status: TicketStatus,
    pub changed_by: Uuid,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Full ticket view: the ticket, its thread, and its audit trail
#[derive(Debug, Serialize)]
pub struct TicketDetail {
    pub ticket: Ticket,
    pub messages: Vec<TicketMessage>,
    pub history: Vec<TicketStatusHistory>,
}

/// Aggregate counts shown on the admin listing
#[derive(Debug, Serialize)]
pub struct TicketStats {
    pub open: i64,
    pub reopened: i64,
    pub closed: i64,
    pub high_priority: i64,
}

/// Result of appending a message
///
/// The repository re-checks status under a row lock, so a ticket closed (or
/// deleted) after the handler's visibility check still resolves correctly.
#[derive(Debug)]
pub enum MessageOutcome {
    Added(TicketMessage),
    TicketClosed,
    NotFound,
}

/// Result of a close/reopen attempt
#[derive(Debug)]
pub enum TransitionOutcome {
    Done(Ticket),
    InvalidState(TicketStatus),
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TicketStatus::Open,
            TicketStatus::Reopened,
            TicketStatus::Closed,
        ] {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
        assert!("resolved".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_priority_round_trip() {
        for priority in [
            TicketPriority::Low,
            TicketPriority::Medium,
            TicketPriority::High,
        ] {
            assert_eq!(
                priority.as_str().parse::<TicketPriority>().unwrap(),
                priority
            );
        }
        assert!("urgent".parse::<TicketPriority>().is_err());
    }

    #[test]
    fn test_messaging_admissibility() {
        assert!(TicketStatus::Open.accepts_messages());
        assert!(TicketStatus::Reopened.accepts_messages());
        assert!(!TicketStatus::Closed.accepts_messages());
    }

    #[test]
    fn test_transition_legality() {
        assert!(TicketStatus::Open.can_close());
        assert!(TicketStatus::Reopened.can_close());
        assert!(!TicketStatus::Closed.can_close());

        assert!(TicketStatus::Closed.can_reopen());
        assert!(!TicketStatus::Open.can_reopen());
        assert!(!TicketStatus::Reopened.can_reopen());
    }
}
