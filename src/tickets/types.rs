use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::shared::enums::StateType;

use super::transitions::{rules_for, StateClass, StateRules};

pub type TicketId = i64;
pub type ArticleId = i64;
pub type HistoryId = i64;
pub type StateId = i32;
pub type PriorityId = i32;
pub type QueueId = i32;
pub type UserId = i32;

/// Actor id used when no authenticated user is attached to a call.
pub const SYSTEM_USER_ID: UserId = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub ticket_number: String,
    pub state_id: StateId,
    pub priority_id: PriorityId,
    pub queue_id: QueueId,
    pub owner_id: UserId,
    pub responsible_id: Option<UserId>,
    pub locked: bool,
    pub pending_until: Option<DateTime<Utc>>,
    pub changed_by: UserId,
    pub changed_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(id: TicketId, ticket_number: impl Into<String>, state_id: StateId) -> Self {
        Self {
            id,
            ticket_number: ticket_number.into(),
            state_id,
            priority_id: 3,
            queue_id: 1,
            owner_id: SYSTEM_USER_ID,
            responsible_id: None,
            locked: false,
            pending_until: None,
            changed_by: SYSTEM_USER_ID,
            changed_at: Utc::now(),
        }
    }

    pub fn with_owner(mut self, owner_id: UserId) -> Self {
        self.owner_id = owner_id;
        self
    }

    /// Human-facing reference, `#<ticket number>` or `#<id>` when unnumbered.
    pub fn label(&self) -> String {
        let tn = self.ticket_number.trim();
        if tn.is_empty() {
            format!("#{}", self.id)
        } else {
            format!("#{tn}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketState {
    pub id: StateId,
    pub name: String,
    pub state_type: StateType,
    pub is_valid: bool,
}

impl TicketState {
    pub fn new(id: StateId, name: impl Into<String>, state_type: StateType) -> Self {
        Self {
            id,
            name: name.into(),
            state_type,
            is_valid: true,
        }
    }

    pub fn rules(&self) -> StateRules {
        rules_for(self.state_type)
    }

    pub fn class(&self) -> StateClass {
        self.rules().class
    }

    pub fn is_pending(&self) -> bool {
        self.state_type.is_pending()
    }
}

/// Display name of a priority, queue or user row with its validity flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefLabel {
    pub name: String,
    pub is_valid: bool,
}

impl RefLabel {
    pub fn valid(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_valid: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Agent,
    Customer,
    System,
}

impl std::str::FromStr for ActorRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "agent" => Ok(Self::Agent),
            "customer" => Ok(Self::Customer),
            "system" => Ok(Self::System),
            _ => Err(format!("Unknown actor role: {}", s)),
        }
    }
}

/// Attribution for every mutation; the role is decided by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: ActorRole,
}

impl Actor {
    pub fn agent(id: UserId) -> Self {
        Self {
            id,
            role: ActorRole::Agent,
        }
    }

    pub fn customer(id: UserId) -> Self {
        Self {
            id,
            role: ActorRole::Customer,
        }
    }

    pub fn system() -> Self {
        Self {
            id: SYSTEM_USER_ID,
            role: ActorRole::System,
        }
    }

    pub fn is_customer(&self) -> bool {
        self.role == ActorRole::Customer
    }
}

/// Field values written by one mutation. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketPatch {
    pub state_id: Option<StateId>,
    pub pending_until: Option<Option<DateTime<Utc>>>,
    pub priority_id: Option<PriorityId>,
    pub queue_id: Option<QueueId>,
    pub owner_id: Option<UserId>,
    pub responsible_id: Option<Option<UserId>>,
    pub locked: Option<bool>,
}

impl TicketPatch {
    pub fn apply_to(&self, ticket: &mut Ticket) {
        if let Some(state_id) = self.state_id {
            ticket.state_id = state_id;
        }
        if let Some(pending_until) = self.pending_until {
            ticket.pending_until = pending_until;
        }
        if let Some(priority_id) = self.priority_id {
            ticket.priority_id = priority_id;
        }
        if let Some(queue_id) = self.queue_id {
            ticket.queue_id = queue_id;
        }
        if let Some(owner_id) = self.owner_id {
            ticket.owner_id = owner_id;
        }
        if let Some(responsible_id) = self.responsible_id {
            ticket.responsible_id = responsible_id;
        }
        if let Some(locked) = self.locked {
            ticket.locked = locked;
        }
    }
}

/// Row snapshots on both sides of a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketChange {
    pub before: Ticket,
    pub after: Ticket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTicket {
    pub before: Ticket,
    pub articles_moved: u64,
}
