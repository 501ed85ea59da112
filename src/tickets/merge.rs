//! Folding source tickets into a target ticket.

use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::shared::enums::{HistoryType, StateType};

use super::bulk::{validate_batch, BulkActionResult, CancelFlag};
use super::catalog::StateCatalog;
use super::error::{EntityKind, LifecycleError, StoreError, ValidationError};
use super::history::{AuditTrail, HistoryRecorder, NewHistoryEntry};
use super::store::TicketStore;
use super::transitions::StateClass;
use super::types::{Actor, Ticket, TicketId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    #[serde(flatten)]
    pub summary: BulkActionResult,
    pub target_ticket: String,
    pub merged_tickets: Vec<String>,
    pub audit_complete: bool,
}

fn append_reason(message: String, reason: Option<&str>) -> String {
    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => format!("{message} — {reason}"),
        None => message,
    }
}

/// Entry written on the target, listing sources in processing order.
pub fn merge_summary_message(labels: &[String], reason: Option<&str>) -> String {
    let base = match labels {
        [] => "Tickets merged".to_string(),
        [single] => format!("Merged ticket {single} into this ticket"),
        many => format!("Merged tickets {} into this ticket", many.join(", ")),
    };
    append_reason(base, reason)
}

pub fn merge_child_message(target_label: &str, reason: Option<&str>) -> String {
    append_reason(format!("Merged into ticket {target_label}"), reason)
}

fn merge_failure_reason(err: &StoreError) -> String {
    match err {
        StoreError::TicketNotFound(_) => "not found".to_string(),
        StoreError::ArticleMove(_) => "article move failed".to_string(),
        StoreError::Rejected(v) => v.to_string(),
        StoreError::Database(_) | StoreError::Connection(_) => "merge failed".to_string(),
    }
}

#[derive(Clone)]
pub struct MergeExecutor<S: TicketStore> {
    store: S,
    catalog: Arc<StateCatalog>,
    recorder: HistoryRecorder<S>,
    max_tickets: usize,
    record_on_sources: bool,
}

impl<S: TicketStore> MergeExecutor<S> {
    pub fn new(
        store: S,
        catalog: Arc<StateCatalog>,
        recorder: HistoryRecorder<S>,
        max_tickets: usize,
        record_on_sources: bool,
    ) -> Self {
        Self {
            store,
            catalog,
            recorder,
            max_tickets: max_tickets.max(1),
            record_on_sources,
        }
    }

    fn class_of(&self, ticket: &Ticket) -> Option<StateClass> {
        self.catalog.by_id(ticket.state_id).map(|s| s.class())
    }

    pub async fn merge(
        &self,
        target_id: TicketId,
        source_ids: &[TicketId],
        reason: Option<&str>,
        actor: &Actor,
        cancel: Option<&CancelFlag>,
    ) -> Result<MergeResult, LifecycleError> {
        if actor.is_customer() {
            return Err(ValidationError::PermissionDenied("customers cannot merge tickets".to_string()).into());
        }

        let target = self
            .store
            .get_ticket(target_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found(EntityKind::Ticket, target_id))?;
        if let Some(class @ (StateClass::Merged | StateClass::Removed)) = self.class_of(&target) {
            return Err(ValidationError::InvalidMergeTarget(class).into());
        }

        let sources: Vec<TicketId> = source_ids.iter().copied().filter(|id| *id != target_id).collect();
        if sources.is_empty() {
            return Err(ValidationError::NoSourceTickets.into());
        }
        let sources = validate_batch(&sources, actor, self.max_tickets)?;

        let merged_state = self
            .catalog
            .first_of_type(StateType::Merged)
            .ok_or_else(|| LifecycleError::not_found(EntityKind::State, StateType::Merged))?
            .id;

        let target_label = target.label();
        let mut result = MergeResult {
            summary: BulkActionResult::new(sources.len()),
            target_ticket: target.ticket_number.clone(),
            ..Default::default()
        };
        let mut labels = Vec::new();
        let mut trail = AuditTrail::default();

        for source_id in sources {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                result.summary.record_failure(source_id, "cancelled");
                continue;
            }

            let catalog = Arc::clone(&self.catalog);
            let not_yet_merged = move |source: &Ticket| {
                match catalog.by_id(source.state_id).map(|s| s.class()) {
                    Some(StateClass::Merged) => Err(ValidationError::AlreadyMerged(source.label())),
                    _ => Ok(()),
                }
            };

            match self
                .store
                .merge_ticket(source_id, target_id, merged_state, actor.id, not_yet_merged)
                .await
            {
                Ok(merged) => {
                    info!(
                        "Merged ticket {} into {} ({} article(s) moved)",
                        source_id, target_id, merged.articles_moved
                    );
                    result.summary.record_success();
                    result.merged_tickets.push(merged.before.ticket_number.clone());
                    labels.push(merged.before.label());
                    if self.record_on_sources {
                        let entry = NewHistoryEntry::new(
                            source_id,
                            HistoryType::Merged,
                            merge_child_message(&target_label, reason),
                            actor.id,
                        );
                        self.recorder.record_into(&mut trail, entry).await;
                    }
                }
                Err(e) => {
                    warn!("Merge of ticket {} into {} failed: {}", source_id, target_id, e);
                    result.summary.record_failure(source_id, merge_failure_reason(&e));
                }
            }
        }

        if !labels.is_empty() {
            let entry = NewHistoryEntry::new(
                target_id,
                HistoryType::Merged,
                merge_summary_message(&labels, reason),
                actor.id,
            );
            self.recorder.record_into(&mut trail, entry).await;
        }
        result.audit_complete = trail.complete;

        info!(
            "Merge into ticket {} by user {}: {}/{} succeeded",
            target_id, actor.id, result.summary.succeeded, result.summary.total
        );
        Ok(result)
    }
}
