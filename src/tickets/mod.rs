//! Ticket lifecycle engine: transition validation, transactional mutation,
//! append-only audit history, bulk updates and merging.

pub mod api;
pub mod bulk;
pub mod catalog;
pub mod error;
pub mod history;
pub mod memory_store;
pub mod merge;
pub mod mutation;
pub mod pending;
pub mod pg_store;
pub mod store;
pub mod transitions;
pub mod types;

use std::sync::Arc;

use log::info;

use crate::core::config::LifecycleConfig;

pub use api::configure_ticket_lifecycle_routes;
pub use bulk::{BulkActionResult, BulkExecutor, CancelFlag};
pub use catalog::{StateCatalog, StateOption};
pub use error::{EntityKind, LifecycleError, StoreError, ValidationError};
pub use history::{HistoryEntry, HistoryRecorder};
pub use memory_store::InMemoryTicketStore;
pub use merge::{MergeExecutor, MergeResult};
pub use mutation::{Mutation, MutationOutcome, TicketMutator};
pub use pg_store::PgTicketStore;
pub use store::TicketStore;
pub use types::{Actor, ActorRole, RefLabel, Ticket, TicketId, TicketState};

/// Entry point wiring the catalog, recorder and executors over one store.
#[derive(Clone)]
pub struct TicketLifecycle<S: TicketStore> {
    store: S,
    config: LifecycleConfig,
    catalog: Arc<StateCatalog>,
    recorder: HistoryRecorder<S>,
    mutator: TicketMutator<S>,
    bulk: BulkExecutor<S>,
    merger: MergeExecutor<S>,
}

impl<S: TicketStore> TicketLifecycle<S> {
    pub async fn new(store: S, config: LifecycleConfig) -> Result<Self, LifecycleError> {
        let catalog = Arc::new(StateCatalog::new(store.load_states().await?));
        info!("Loaded {} ticket states", catalog.states().len());

        let recorder = HistoryRecorder::new(store.clone(), config.note_excerpt_chars);
        let mutator = TicketMutator::new(
            store.clone(),
            Arc::clone(&catalog),
            config.pending_resolver(),
            recorder.clone(),
        );
        let bulk = BulkExecutor::new(mutator.clone(), config.max_bulk_tickets);
        let merger = MergeExecutor::new(
            store.clone(),
            Arc::clone(&catalog),
            recorder.clone(),
            config.max_bulk_tickets,
            config.record_merge_on_sources,
        );

        Ok(Self {
            store,
            config,
            catalog,
            recorder,
            mutator,
            bulk,
            merger,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn catalog(&self) -> &StateCatalog {
        &self.catalog
    }

    pub fn mutator(&self) -> &TicketMutator<S> {
        &self.mutator
    }

    pub async fn mutate(
        &self,
        ticket_id: TicketId,
        mutation: Mutation,
        actor: &Actor,
    ) -> Result<MutationOutcome, LifecycleError> {
        self.mutator.mutate(ticket_id, mutation, actor).await
    }

    pub async fn request_reopen(
        &self,
        ticket_id: TicketId,
        reason: &str,
        actor: &Actor,
    ) -> Result<MutationOutcome, LifecycleError> {
        self.mutator.request_reopen(ticket_id, reason, actor).await
    }

    pub async fn apply_to_many(
        &self,
        ticket_ids: &[TicketId],
        mutation: Mutation,
        actor: &Actor,
        cancel: Option<&CancelFlag>,
    ) -> Result<BulkActionResult, LifecycleError> {
        self.bulk.apply_to_many(ticket_ids, mutation, actor, cancel).await
    }

    pub async fn merge(
        &self,
        target_id: TicketId,
        source_ids: &[TicketId],
        reason: Option<&str>,
        actor: &Actor,
        cancel: Option<&CancelFlag>,
    ) -> Result<MergeResult, LifecycleError> {
        self.merger
            .merge(target_id, source_ids, reason, actor, cancel)
            .await
    }

    pub async fn history(&self, ticket_id: TicketId) -> Result<Vec<HistoryEntry>, LifecycleError> {
        if self.store.get_ticket(ticket_id).await?.is_none() {
            return Err(LifecycleError::not_found(EntityKind::Ticket, ticket_id));
        }
        Ok(self.recorder.list(ticket_id).await?)
    }
}
