//! Database enum types for the ticket lifecycle schema.
//!
//! Catalog classifications and history tags are stored as `SMALLINT` codes and
//! mapped to closed Rust enums here, so the rest of the crate never compares
//! raw numeric literals.

use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::SmallInt;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use std::io::Write;

// ============================================================================
// TICKET STATE TYPE
// ============================================================================

/// Classification of a concrete catalog state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum StateType {
    New = 1,
    Open = 2,
    Closed = 3,
    PendingReminder = 4,
    PendingAuto = 5,
    Removed = 6,
    Merged = 7,
    Resolved = 8,
}

impl StateType {
    pub const ALL: [StateType; 8] = [
        Self::New,
        Self::Open,
        Self::Closed,
        Self::PendingReminder,
        Self::PendingAuto,
        Self::Removed,
        Self::Merged,
        Self::Resolved,
    ];

    pub fn is_pending(self) -> bool {
        matches!(self, Self::PendingReminder | Self::PendingAuto)
    }
}

impl ToSql<SmallInt, Pg> for StateType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        out.write_all(&v.to_be_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<SmallInt, Pg> for StateType {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = i16::from_sql(bytes)?;
        match value {
            1 => Ok(Self::New),
            2 => Ok(Self::Open),
            3 => Ok(Self::Closed),
            4 => Ok(Self::PendingReminder),
            5 => Ok(Self::PendingAuto),
            6 => Ok(Self::Removed),
            7 => Ok(Self::Merged),
            8 => Ok(Self::Resolved),
            _ => Err(format!("Unknown StateType: {}", value).into()),
        }
    }
}

impl std::fmt::Display for StateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::PendingReminder => write!(f, "pending reminder"),
            Self::PendingAuto => write!(f, "pending auto"),
            Self::Removed => write!(f, "removed"),
            Self::Merged => write!(f, "merged"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for StateType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], " ").trim() {
            "new" => Ok(Self::New),
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "pending reminder" => Ok(Self::PendingReminder),
            "pending auto" | "pending auto close" => Ok(Self::PendingAuto),
            "removed" => Ok(Self::Removed),
            "merged" => Ok(Self::Merged),
            "resolved" => Ok(Self::Resolved),
            _ => Err(format!("Unknown state type: {}", s)),
        }
    }
}

// ============================================================================
// HISTORY TYPE
// ============================================================================

/// Tag carried by every audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = SmallInt)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum HistoryType {
    NoteAdded = 1,
    StateChanged = 2,
    PriorityChanged = 3,
    QueueMoved = 4,
    OwnerChanged = 5,
    PendingTimeSet = 6,
    Merged = 7,
    LockChanged = 8,
    ReopenRequested = 9,
}

impl HistoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoteAdded => "note_added",
            Self::StateChanged => "state_changed",
            Self::PriorityChanged => "priority_changed",
            Self::QueueMoved => "queue_moved",
            Self::OwnerChanged => "owner_changed",
            Self::PendingTimeSet => "pending_time_set",
            Self::Merged => "merged",
            Self::LockChanged => "lock_changed",
            Self::ReopenRequested => "reopen_requested",
        }
    }
}

impl ToSql<SmallInt, Pg> for HistoryType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let v = *self as i16;
        out.write_all(&v.to_be_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<SmallInt, Pg> for HistoryType {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = i16::from_sql(bytes)?;
        match value {
            1 => Ok(Self::NoteAdded),
            2 => Ok(Self::StateChanged),
            3 => Ok(Self::PriorityChanged),
            4 => Ok(Self::QueueMoved),
            5 => Ok(Self::OwnerChanged),
            6 => Ok(Self::PendingTimeSet),
            7 => Ok(Self::Merged),
            8 => Ok(Self::LockChanged),
            9 => Ok(Self::ReopenRequested),
            _ => Err(format!("Unknown HistoryType: {}", value).into()),
        }
    }
}

impl std::fmt::Display for HistoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HistoryType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "note_added" => Ok(Self::NoteAdded),
            "state_changed" => Ok(Self::StateChanged),
            "priority_changed" => Ok(Self::PriorityChanged),
            "queue_moved" => Ok(Self::QueueMoved),
            "owner_changed" => Ok(Self::OwnerChanged),
            "pending_time_set" => Ok(Self::PendingTimeSet),
            "merged" => Ok(Self::Merged),
            "lock_changed" => Ok(Self::LockChanged),
            "reopen_requested" => Ok(Self::ReopenRequested),
            _ => Err(format!("Unknown history type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_type_from_str_accepts_aliases() {
        assert_eq!("Pending-Reminder".parse::<StateType>(), Ok(StateType::PendingReminder));
        assert_eq!("pending_auto_close".parse::<StateType>(), Ok(StateType::PendingAuto));
        assert!("archived".parse::<StateType>().is_err());
    }

    #[test]
    fn test_state_type_pending_flag() {
        let pending: Vec<StateType> = StateType::ALL.into_iter().filter(|t| t.is_pending()).collect();
        assert_eq!(pending, vec![StateType::PendingReminder, StateType::PendingAuto]);
    }

    #[test]
    fn test_history_type_tags() {
        assert_eq!(HistoryType::QueueMoved.as_str(), "queue_moved");
        assert_eq!("pending-time-set".parse::<HistoryType>(), Ok(HistoryType::PendingTimeSet));
        assert_eq!(HistoryType::ReopenRequested.to_string(), "reopen_requested");
    }
}
