use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::error::{LifecycleError, ValidationError};
use super::mutation::{Mutation, TicketMutator};
use super::store::TicketStore;
use super::types::{Actor, TicketId};

pub const DEFAULT_MAX_BULK_TICKETS: usize = 1000;

/// Per-item accounting for a batch; `succeeded + failed == total` always.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkActionResult {
    pub success: bool,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl BulkActionResult {
    pub fn new(total: usize) -> Self {
        Self {
            success: true,
            total,
            ..Default::default()
        }
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, ticket_id: TicketId, reason: impl std::fmt::Display) {
        self.failed += 1;
        self.success = false;
        self.errors.push(format!("Ticket {ticket_id}: {reason}"));
    }
}

/// Shared flag checked between batch items.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drops repeated ids, keeping first occurrences in input order.
pub fn dedup_ticket_ids(ids: &[TicketId]) -> Vec<TicketId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Request-level checks common to every batch operation.
pub(crate) fn validate_batch(
    ids: &[TicketId],
    actor: &Actor,
    max_tickets: usize,
) -> Result<Vec<TicketId>, ValidationError> {
    if actor.is_customer() {
        return Err(ValidationError::PermissionDenied(
            "customers cannot run bulk operations".to_string(),
        ));
    }
    let ids = dedup_ticket_ids(ids);
    if ids.is_empty() {
        return Err(ValidationError::NoTicketsSelected);
    }
    if ids.len() > max_tickets {
        return Err(ValidationError::TooManyTickets {
            count: ids.len(),
            limit: max_tickets,
        });
    }
    Ok(ids)
}

#[derive(Clone)]
pub struct BulkExecutor<S: TicketStore> {
    mutator: TicketMutator<S>,
    max_tickets: usize,
}

impl<S: TicketStore> BulkExecutor<S> {
    pub fn new(mutator: TicketMutator<S>, max_tickets: usize) -> Self {
        Self {
            mutator,
            max_tickets: max_tickets.max(1),
        }
    }

    /// Applies one mutation to every id in order. Only request-level problems
    /// fail the whole call; per-ticket failures land in the result.
    pub async fn apply_to_many(
        &self,
        ticket_ids: &[TicketId],
        mutation: Mutation,
        actor: &Actor,
        cancel: Option<&CancelFlag>,
    ) -> Result<BulkActionResult, LifecycleError> {
        let ids = validate_batch(ticket_ids, actor, self.max_tickets)?;
        let prepared = self.mutator.prepare(mutation, actor).await?;

        let mut result = BulkActionResult::new(ids.len());
        for id in ids {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                result.record_failure(id, "cancelled");
                continue;
            }
            match self.mutator.apply(id, &prepared, actor).await {
                Ok(_) => result.record_success(),
                Err(e) => {
                    warn!("Bulk {} failed for ticket {}: {}", prepared.kind(), id, e);
                    result.record_failure(id, e.item_reason());
                }
            }
        }

        info!(
            "Bulk {} by user {}: {}/{} succeeded",
            prepared.kind(),
            actor.id,
            result.succeeded,
            result.total
        );
        Ok(result)
    }
}
