use std::future::Future;

use super::error::{StoreError, ValidationError};
use super::history::{HistoryEntry, NewHistoryEntry};
use super::types::{
    MergedTicket, PriorityId, QueueId, RefLabel, StateId, Ticket, TicketChange, TicketId,
    TicketPatch, TicketState, UserId,
};

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for the lifecycle engine.
///
/// Every write method is one transaction on one ticket. `update_ticket` hands
/// the locked row to `guard`, which either produces the patch to write or
/// rejects the change; a rejection leaves the row untouched. Reference
/// lookups return retired rows too, flagged through [`RefLabel::is_valid`].
pub trait TicketStore: Clone + Send + Sync + 'static {
    fn load_states(&self) -> impl Future<Output = StoreResult<Vec<TicketState>>> + Send;

    fn get_ticket(&self, id: TicketId) -> impl Future<Output = StoreResult<Option<Ticket>>> + Send;

    fn state_by_id(&self, id: StateId) -> impl Future<Output = StoreResult<Option<TicketState>>> + Send;

    fn priority_label(&self, id: PriorityId) -> impl Future<Output = StoreResult<Option<RefLabel>>> + Send;

    fn queue_label(&self, id: QueueId) -> impl Future<Output = StoreResult<Option<RefLabel>>> + Send;

    fn user_label(&self, id: UserId) -> impl Future<Output = StoreResult<Option<RefLabel>>> + Send;

    fn update_ticket<G>(
        &self,
        id: TicketId,
        actor: UserId,
        guard: G,
    ) -> impl Future<Output = StoreResult<TicketChange>> + Send
    where
        G: FnOnce(&Ticket) -> Result<TicketPatch, ValidationError> + Send + 'static;

    /// Moves every article of `source` to `target` and sets the merged state.
    /// `guard` sees the locked source row first and may refuse the merge.
    fn merge_ticket<G>(
        &self,
        source: TicketId,
        target: TicketId,
        merged_state: StateId,
        actor: UserId,
        guard: G,
    ) -> impl Future<Output = StoreResult<MergedTicket>> + Send
    where
        G: FnOnce(&Ticket) -> Result<(), ValidationError> + Send + 'static;

    fn append_history(&self, entry: NewHistoryEntry) -> impl Future<Output = StoreResult<HistoryEntry>> + Send;

    /// Entries of one ticket ordered by creation time, then id.
    fn list_history(&self, ticket: TicketId) -> impl Future<Output = StoreResult<Vec<HistoryEntry>>> + Send;
}
