//! Single-ticket mutations: validate, write in one transaction, then audit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::shared::enums::HistoryType;

use super::catalog::{StateCatalog, StateResolution};
use super::error::{EntityKind, LifecycleError, ValidationError};
use super::history::{change_message, AuditTrail, HistoryEntry, HistoryRecorder, NewHistoryEntry};
use super::pending::PendingTimeResolver;
use super::store::TicketStore;
use super::transitions::{check_preconditions, check_reopen_request, check_transition, StateClass, TransitionInput};
use super::types::{
    Actor, PriorityId, QueueId, RefLabel, Ticket, TicketChange, TicketId, TicketPatch, TicketState,
    UserId,
};

fn default_true() -> bool {
    true
}

/// One change requested by a caller, before any validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Mutation {
    StateChange {
        /// State id, name or alias.
        state: String,
        #[serde(default)]
        pending_until: Option<String>,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        resolution: Option<String>,
    },
    PriorityChange {
        priority_id: PriorityId,
    },
    QueueMove {
        queue_id: QueueId,
    },
    OwnerChange {
        owner_id: UserId,
        #[serde(default = "default_true")]
        set_responsible: bool,
    },
    LockChange {
        locked: bool,
    },
}

/// A mutation whose request-level checks passed and whose references resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedMutation {
    State {
        target: TicketState,
        pending_until: Option<DateTime<Utc>>,
        reason: Option<String>,
        resolution: Option<String>,
    },
    Priority {
        id: PriorityId,
        name: String,
    },
    Queue {
        id: QueueId,
        name: String,
    },
    Owner {
        id: UserId,
        name: String,
        set_responsible: bool,
    },
    Lock {
        locked: bool,
    },
}

impl PreparedMutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::State { .. } => "state_change",
            Self::Priority { .. } => "priority_change",
            Self::Queue { .. } => "queue_move",
            Self::Owner { .. } => "owner_change",
            Self::Lock { .. } => "lock_change",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    pub ticket: Ticket,
    pub history: Vec<HistoryEntry>,
    pub audit_complete: bool,
}

/// Display labels read before the write for the before/after messages.
#[derive(Debug, Default)]
struct AuditBaseline {
    ticket: Option<Ticket>,
    label: Option<String>,
    responsible_label: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Old-side labels keep the name of retired rows.
fn label_name(label: Option<RefLabel>) -> Option<String> {
    label.map(|label| label.name)
}

fn lock_label(locked: bool) -> &'static str {
    if locked {
        "locked"
    } else {
        "unlocked"
    }
}

#[derive(Clone)]
pub struct TicketMutator<S: TicketStore> {
    store: S,
    catalog: Arc<StateCatalog>,
    resolver: PendingTimeResolver,
    recorder: HistoryRecorder<S>,
}

impl<S: TicketStore> TicketMutator<S> {
    pub fn new(
        store: S,
        catalog: Arc<StateCatalog>,
        resolver: PendingTimeResolver,
        recorder: HistoryRecorder<S>,
    ) -> Self {
        Self {
            store,
            catalog,
            resolver,
            recorder,
        }
    }

    /// Request-level validation shared by single and bulk callers.
    pub async fn prepare(&self, mutation: Mutation, actor: &Actor) -> Result<PreparedMutation, LifecycleError> {
        match mutation {
            Mutation::StateChange {
                state,
                pending_until,
                reason,
                resolution,
            } => {
                let target = self.resolve_target_state(&state)?;
                let reason = non_blank(reason);
                let resolution = non_blank(resolution);

                let pending_until = match non_blank(pending_until) {
                    Some(text) if target.is_pending() => Some(
                        self.resolver
                            .parse(&text)
                            .ok_or(ValidationError::InvalidPendingTime(text))?,
                    ),
                    _ => None,
                };

                let input = TransitionInput {
                    reason: reason.as_deref(),
                    resolution: resolution.as_deref(),
                    has_deadline: pending_until.is_some(),
                };
                check_preconditions(&target, &input, actor)?;

                Ok(PreparedMutation::State {
                    target,
                    pending_until,
                    reason,
                    resolution,
                })
            }
            Mutation::PriorityChange { priority_id } => {
                let name = self
                    .store
                    .priority_label(priority_id)
                    .await?
                    .filter(|label| label.is_valid)
                    .map(|label| label.name)
                    .ok_or_else(|| LifecycleError::not_found(EntityKind::Priority, priority_id))?;
                Ok(PreparedMutation::Priority { id: priority_id, name })
            }
            Mutation::QueueMove { queue_id } => {
                let name = self
                    .store
                    .queue_label(queue_id)
                    .await?
                    .filter(|label| label.is_valid)
                    .map(|label| label.name)
                    .ok_or_else(|| LifecycleError::not_found(EntityKind::Queue, queue_id))?;
                Ok(PreparedMutation::Queue { id: queue_id, name })
            }
            Mutation::OwnerChange {
                owner_id,
                set_responsible,
            } => {
                let name = self
                    .store
                    .user_label(owner_id)
                    .await?
                    .filter(|label| label.is_valid)
                    .map(|label| label.name)
                    .ok_or_else(|| LifecycleError::not_found(EntityKind::User, owner_id))?;
                Ok(PreparedMutation::Owner {
                    id: owner_id,
                    name,
                    set_responsible,
                })
            }
            Mutation::LockChange { locked } => Ok(PreparedMutation::Lock { locked }),
        }
    }

    /// Retired (invalid) catalog states are never offered as targets.
    fn resolve_target_state(&self, alias_or_id: &str) -> Result<TicketState, LifecycleError> {
        let state = match self.catalog.resolve(alias_or_id) {
            StateResolution::Blank => Err(ValidationError::InvalidValue {
                field: "state",
                value: String::new(),
            }
            .into()),
            StateResolution::Id(id) => self
                .catalog
                .by_id(id)
                .cloned()
                .ok_or_else(|| LifecycleError::not_found(EntityKind::State, id)),
            StateResolution::Found(state) => Ok(state.clone()),
            StateResolution::NotFound(input) => Err(LifecycleError::not_found(EntityKind::State, input)),
        }?;
        if !state.is_valid {
            return Err(LifecycleError::not_found(EntityKind::State, &state.name));
        }
        Ok(state)
    }

    pub async fn mutate(
        &self,
        ticket_id: TicketId,
        mutation: Mutation,
        actor: &Actor,
    ) -> Result<MutationOutcome, LifecycleError> {
        let prepared = self.prepare(mutation, actor).await?;
        self.apply(ticket_id, &prepared, actor).await
    }

    pub async fn apply_state_change(
        &self,
        ticket_id: TicketId,
        state: &str,
        pending_until: Option<&str>,
        reason: Option<&str>,
        resolution: Option<&str>,
        actor: &Actor,
    ) -> Result<MutationOutcome, LifecycleError> {
        let mutation = Mutation::StateChange {
            state: state.to_string(),
            pending_until: pending_until.map(str::to_string),
            reason: reason.map(str::to_string),
            resolution: resolution.map(str::to_string),
        };
        self.mutate(ticket_id, mutation, actor).await
    }

    pub async fn apply_priority_change(
        &self,
        ticket_id: TicketId,
        priority_id: PriorityId,
        actor: &Actor,
    ) -> Result<MutationOutcome, LifecycleError> {
        self.mutate(ticket_id, Mutation::PriorityChange { priority_id }, actor)
            .await
    }

    pub async fn apply_queue_change(
        &self,
        ticket_id: TicketId,
        queue_id: QueueId,
        actor: &Actor,
    ) -> Result<MutationOutcome, LifecycleError> {
        self.mutate(ticket_id, Mutation::QueueMove { queue_id }, actor).await
    }

    pub async fn apply_owner_change(
        &self,
        ticket_id: TicketId,
        owner_id: UserId,
        set_responsible: bool,
        actor: &Actor,
    ) -> Result<MutationOutcome, LifecycleError> {
        let mutation = Mutation::OwnerChange {
            owner_id,
            set_responsible,
        };
        self.mutate(ticket_id, mutation, actor).await
    }

    pub async fn apply_lock_change(
        &self,
        ticket_id: TicketId,
        locked: bool,
        actor: &Actor,
    ) -> Result<MutationOutcome, LifecycleError> {
        self.mutate(ticket_id, Mutation::LockChange { locked }, actor).await
    }

    /// Writes a prepared mutation to one ticket and records its history.
    pub async fn apply(
        &self,
        ticket_id: TicketId,
        prepared: &PreparedMutation,
        actor: &Actor,
    ) -> Result<MutationOutcome, LifecycleError> {
        let baseline = self.read_baseline(ticket_id, prepared).await?;

        let change = self
            .store
            .update_ticket(ticket_id, actor.id, self.guard_for(prepared, *actor))
            .await?;

        info!(
            "Ticket {} {} applied by user {}",
            ticket_id,
            prepared.kind(),
            actor.id
        );

        let trail = self.record_change(&change, prepared, &baseline, actor).await;
        Ok(MutationOutcome {
            ticket: change.after,
            history: trail.entries,
            audit_complete: trail.complete,
        })
    }

    /// Reads the current row and its display labels. Only a missing ticket is
    /// fatal; any other failure degrades the audit message.
    async fn read_baseline(
        &self,
        ticket_id: TicketId,
        prepared: &PreparedMutation,
    ) -> Result<AuditBaseline, LifecycleError> {
        let ticket = match self.store.get_ticket(ticket_id).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return Err(LifecycleError::not_found(EntityKind::Ticket, ticket_id)),
            Err(e) => {
                warn!("Audit pre-read of ticket {} failed: {}", ticket_id, e);
                return Ok(AuditBaseline::default());
            }
        };

        let label = match prepared {
            PreparedMutation::State { .. } => self
                .store
                .state_by_id(ticket.state_id)
                .await
                .map(|s| s.map(|s| s.name)),
            PreparedMutation::Priority { .. } => self.store.priority_label(ticket.priority_id).await.map(label_name),
            PreparedMutation::Queue { .. } => self.store.queue_label(ticket.queue_id).await.map(label_name),
            PreparedMutation::Owner { .. } => self.store.user_label(ticket.owner_id).await.map(label_name),
            PreparedMutation::Lock { .. } => Ok(Some(lock_label(ticket.locked).to_string())),
        };
        let label = label.unwrap_or_else(|e| {
            warn!("Audit label lookup for ticket {} failed: {}", ticket_id, e);
            None
        });

        let responsible_label = match (prepared, ticket.responsible_id) {
            (PreparedMutation::Owner { set_responsible: true, .. }, Some(id)) => {
                self.store.user_label(id).await.map(label_name).unwrap_or_else(|e| {
                    warn!("Audit label lookup for ticket {} failed: {}", ticket_id, e);
                    None
                })
            }
            _ => None,
        };

        Ok(AuditBaseline {
            ticket: Some(ticket),
            label,
            responsible_label,
        })
    }

    /// Closure run against the locked row inside the write transaction.
    fn guard_for(
        &self,
        prepared: &PreparedMutation,
        actor: Actor,
    ) -> impl FnOnce(&Ticket) -> Result<TicketPatch, ValidationError> + Send + 'static {
        let catalog = Arc::clone(&self.catalog);
        let prepared = prepared.clone();
        move |current: &Ticket| match prepared {
            PreparedMutation::State {
                target,
                pending_until,
                reason,
                resolution,
            } => {
                let from = catalog
                    .by_id(current.state_id)
                    .ok_or(ValidationError::UnknownCurrentState(current.state_id))?;
                let input = TransitionInput {
                    reason: reason.as_deref(),
                    resolution: resolution.as_deref(),
                    has_deadline: pending_until.is_some(),
                };
                check_transition(from, &target, &input, &actor)?;

                let pending_until = if target.is_pending() {
                    Some(pending_until)
                } else if current.pending_until.is_some() {
                    Some(None)
                } else {
                    None
                };
                Ok(TicketPatch {
                    state_id: Some(target.id),
                    pending_until,
                    ..Default::default()
                })
            }
            PreparedMutation::Priority { id, .. } => Ok(TicketPatch {
                priority_id: Some(id),
                ..Default::default()
            }),
            PreparedMutation::Queue { id, .. } => Ok(TicketPatch {
                queue_id: Some(id),
                ..Default::default()
            }),
            PreparedMutation::Owner {
                id,
                set_responsible,
                ..
            } => Ok(TicketPatch {
                owner_id: Some(id),
                responsible_id: set_responsible.then_some(Some(id)),
                ..Default::default()
            }),
            PreparedMutation::Lock { locked } => Ok(TicketPatch {
                locked: Some(locked),
                ..Default::default()
            }),
        }
    }

    async fn record_change(
        &self,
        change: &TicketChange,
        prepared: &PreparedMutation,
        baseline: &AuditBaseline,
        actor: &Actor,
    ) -> AuditTrail {
        let before = &change.before;
        let after = &change.after;
        let ticket_id = after.id;

        // A label read before the write only describes the old value if the
        // row did not move underneath us in the meantime.
        let fresh = |same: fn(&Ticket, &Ticket) -> bool| {
            baseline.ticket.as_ref().is_some_and(|seen| same(seen, before))
        };
        let old_label = |same: fn(&Ticket, &Ticket) -> bool| {
            if fresh(same) {
                baseline.label.clone().unwrap_or_default()
            } else {
                String::new()
            }
        };

        let mut entries = Vec::new();
        match prepared {
            PreparedMutation::State {
                target,
                pending_until,
                reason,
                resolution,
            } => {
                if before.state_id != after.state_id {
                    let old = old_label(|a, b| a.state_id == b.state_id);
                    entries.push((HistoryType::StateChanged, change_message("State", &old, &target.name)));
                }
                match pending_until {
                    Some(until) if target.is_pending() => entries.push((
                        HistoryType::PendingTimeSet,
                        format!("Pending until {}", self.resolver.display(*until)),
                    )),
                    _ if before.pending_until.is_some() && after.pending_until.is_none() => {
                        entries.push((HistoryType::PendingTimeSet, "Pending time cleared".to_string()))
                    }
                    _ => {}
                }
                if let Some(reason) = reason {
                    let label = if target.is_pending() { "Pending reason" } else { "Reason" };
                    entries.push((HistoryType::NoteAdded, self.recorder.note(label, reason)));
                }
                if let Some(resolution) = resolution {
                    if target.class() == StateClass::Resolved {
                        entries.push((HistoryType::NoteAdded, self.recorder.note("Resolution", resolution)));
                    }
                }
            }
            PreparedMutation::Priority { name, .. } => {
                if before.priority_id != after.priority_id {
                    let old = old_label(|a, b| a.priority_id == b.priority_id);
                    entries.push((HistoryType::PriorityChanged, change_message("Priority", &old, name)));
                }
            }
            PreparedMutation::Queue { name, .. } => {
                if before.queue_id != after.queue_id {
                    let old = old_label(|a, b| a.queue_id == b.queue_id);
                    entries.push((HistoryType::QueueMoved, change_message("Queue", &old, name)));
                }
            }
            PreparedMutation::Owner { name, .. } => {
                if before.owner_id != after.owner_id {
                    let old = old_label(|a, b| a.owner_id == b.owner_id);
                    entries.push((HistoryType::OwnerChanged, change_message("Owner", &old, name)));
                }
                if before.responsible_id != after.responsible_id {
                    let old = if fresh(|a, b| a.responsible_id == b.responsible_id) {
                        baseline.responsible_label.clone().unwrap_or_default()
                    } else {
                        String::new()
                    };
                    entries.push((HistoryType::OwnerChanged, change_message("Responsible", &old, name)));
                }
            }
            PreparedMutation::Lock { locked } => {
                if before.locked != after.locked {
                    entries.push((
                        HistoryType::LockChanged,
                        change_message("Lock", lock_label(before.locked), lock_label(*locked)),
                    ));
                }
            }
        }

        let mut trail = AuditTrail::default();
        for (history_type, message) in entries {
            self.recorder
                .record_into(&mut trail, NewHistoryEntry::new(ticket_id, history_type, message, actor.id))
                .await;
        }
        trail
    }

    /// Records a customer's wish to reopen without touching the ticket.
    pub async fn request_reopen(
        &self,
        ticket_id: TicketId,
        reason: &str,
        actor: &Actor,
    ) -> Result<MutationOutcome, LifecycleError> {
        let ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found(EntityKind::Ticket, ticket_id))?;
        let current = self
            .catalog
            .by_id(ticket.state_id)
            .ok_or(ValidationError::UnknownCurrentState(ticket.state_id))?;
        check_reopen_request(current, reason)?;

        let entry = NewHistoryEntry::new(
            ticket_id,
            HistoryType::ReopenRequested,
            self.recorder.note("Reopen requested", reason),
            actor.id,
        );
        let saved = self.recorder.record(entry).await?;
        info!("Reopen requested for ticket {} by user {}", ticket_id, actor.id);

        Ok(MutationOutcome {
            ticket,
            history: saved.into_iter().collect(),
            audit_complete: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_payload_shape() {
        let parsed: Mutation = serde_json::from_str(
            r#"{"action":"state_change","state":"pending reminder","pending_until":"2026-11-01 09:00","reason":"waiting"}"#,
        )
        .expect("state change");
        assert!(matches!(parsed, Mutation::StateChange { ref state, .. } if state == "pending reminder"));

        let owner: Mutation =
            serde_json::from_str(r#"{"action":"owner_change","owner_id":5}"#).expect("owner change");
        assert_eq!(
            owner,
            Mutation::OwnerChange {
                owner_id: 5,
                set_responsible: true
            }
        );

        assert!(serde_json::from_str::<Mutation>(r#"{"action":"delete"}"#).is_err());
    }

    #[test]
    fn test_non_blank_trims() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(Some(" why ".to_string())), Some("why".to_string()));
        assert_eq!(non_blank(None), None);
    }
}
