//! In-process [`TicketStore`] used by tests, demos and the engine's own
//! integration suite. A single write lock stands in for row locking.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::core::shared::enums::StateType;

use super::error::{StoreError, ValidationError};
use super::history::{HistoryEntry, NewHistoryEntry};
use super::store::{StoreResult, TicketStore};
use super::types::{
    ArticleId, HistoryId, MergedTicket, PriorityId, QueueId, RefLabel, StateId, Ticket,
    TicketChange, TicketId, TicketPatch, TicketState, UserId, SYSTEM_USER_ID,
};

#[derive(Debug, Default)]
struct FailurePlan {
    updates: HashSet<TicketId>,
    article_moves: HashSet<TicketId>,
    history_appends: bool,
    label_lookups: bool,
}

/// Runs after every committed ticket write, once the lock is released.
#[derive(Clone)]
struct CommitHook(Arc<dyn Fn(TicketId) + Send + Sync>);

impl fmt::Debug for CommitHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CommitHook")
    }
}

#[derive(Debug, Default)]
struct MemoryData {
    tickets: BTreeMap<TicketId, Ticket>,
    states: BTreeMap<StateId, TicketState>,
    priorities: HashMap<PriorityId, RefLabel>,
    queues: HashMap<QueueId, RefLabel>,
    users: HashMap<UserId, RefLabel>,
    articles: BTreeMap<ArticleId, TicketId>,
    history: Vec<HistoryEntry>,
    next_history_id: HistoryId,
    next_article_id: ArticleId,
    failures: FailurePlan,
    commit_hook: Option<CommitHook>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTicketStore {
    data: Arc<RwLock<MemoryData>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the same reference data as the initial migration.
    pub async fn with_default_catalog() -> Self {
        let store = Self::new();
        for (id, name, state_type) in [
            (1, "new", StateType::New),
            (2, "closed successful", StateType::Closed),
            (3, "closed unsuccessful", StateType::Closed),
            (4, "open", StateType::Open),
            (5, "removed", StateType::Removed),
            (6, "pending reminder", StateType::PendingReminder),
            (7, "pending auto close+", StateType::PendingAuto),
            (8, "pending auto close-", StateType::PendingAuto),
            (9, "merged", StateType::Merged),
            (10, "resolved", StateType::Resolved),
        ] {
            store.add_state(TicketState::new(id, name, state_type)).await;
        }
        for (id, name) in [
            (1, "1 very low"),
            (2, "2 low"),
            (3, "3 normal"),
            (4, "4 high"),
            (5, "5 very high"),
        ] {
            store.add_priority(id, name).await;
        }
        for (id, name) in [(1, "Postmaster"), (2, "Raw"), (3, "Junk"), (4, "Misc")] {
            store.add_queue(id, name).await;
        }
        store.add_user(SYSTEM_USER_ID, "Admin System").await;
        store
    }

    pub async fn add_state(&self, state: TicketState) {
        self.data.write().await.states.insert(state.id, state);
    }

    pub async fn add_priority(&self, id: PriorityId, name: &str) {
        self.data.write().await.priorities.insert(id, RefLabel::valid(name));
    }

    pub async fn retire_priority(&self, id: PriorityId) {
        if let Some(label) = self.data.write().await.priorities.get_mut(&id) {
            label.is_valid = false;
        }
    }

    pub async fn add_queue(&self, id: QueueId, name: &str) {
        self.data.write().await.queues.insert(id, RefLabel::valid(name));
    }

    pub async fn retire_queue(&self, id: QueueId) {
        if let Some(label) = self.data.write().await.queues.get_mut(&id) {
            label.is_valid = false;
        }
    }

    pub async fn add_user(&self, id: UserId, name: &str) {
        self.data.write().await.users.insert(id, RefLabel::valid(name));
    }

    pub async fn retire_user(&self, id: UserId) {
        if let Some(label) = self.data.write().await.users.get_mut(&id) {
            label.is_valid = false;
        }
    }

    pub async fn insert_ticket(&self, ticket: Ticket) {
        self.data.write().await.tickets.insert(ticket.id, ticket);
    }

    pub async fn add_article(&self, ticket_id: TicketId) -> ArticleId {
        let mut data = self.data.write().await;
        data.next_article_id += 1;
        let id = data.next_article_id;
        data.articles.insert(id, ticket_id);
        id
    }

    pub async fn articles_of(&self, ticket_id: TicketId) -> Vec<ArticleId> {
        let data = self.data.read().await;
        data.articles
            .iter()
            .filter(|(_, owner)| **owner == ticket_id)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Registers a callback invoked with the ticket id after each committed
    /// update or merge.
    pub async fn on_commit(&self, hook: impl Fn(TicketId) + Send + Sync + 'static) {
        self.data.write().await.commit_hook = Some(CommitHook(Arc::new(hook)));
    }

    pub async fn fail_updates_for(&self, ticket_id: TicketId) {
        self.data.write().await.failures.updates.insert(ticket_id);
    }

    pub async fn fail_article_moves_for(&self, ticket_id: TicketId) {
        self.data.write().await.failures.article_moves.insert(ticket_id);
    }

    pub async fn fail_history_appends(&self, fail: bool) {
        self.data.write().await.failures.history_appends = fail;
    }

    pub async fn fail_label_lookups(&self, fail: bool) {
        self.data.write().await.failures.label_lookups = fail;
    }

    async fn lookup<T: Clone>(&self, pick: impl FnOnce(&MemoryData) -> Option<T>) -> StoreResult<Option<T>> {
        let data = self.data.read().await;
        if data.failures.label_lookups {
            return Err(StoreError::Database("lookup unavailable".to_string()));
        }
        Ok(pick(&*data))
    }
}

impl TicketStore for InMemoryTicketStore {
    async fn load_states(&self) -> StoreResult<Vec<TicketState>> {
        Ok(self.data.read().await.states.values().cloned().collect())
    }

    async fn get_ticket(&self, id: TicketId) -> StoreResult<Option<Ticket>> {
        Ok(self.data.read().await.tickets.get(&id).cloned())
    }

    async fn state_by_id(&self, id: StateId) -> StoreResult<Option<TicketState>> {
        self.lookup(|d| d.states.get(&id).cloned()).await
    }

    async fn priority_label(&self, id: PriorityId) -> StoreResult<Option<RefLabel>> {
        self.lookup(|d| d.priorities.get(&id).cloned()).await
    }

    async fn queue_label(&self, id: QueueId) -> StoreResult<Option<RefLabel>> {
        self.lookup(|d| d.queues.get(&id).cloned()).await
    }

    async fn user_label(&self, id: UserId) -> StoreResult<Option<RefLabel>> {
        self.lookup(|d| d.users.get(&id).cloned()).await
    }

    async fn update_ticket<G>(&self, id: TicketId, actor: UserId, guard: G) -> StoreResult<TicketChange>
    where
        G: FnOnce(&Ticket) -> Result<TicketPatch, ValidationError> + Send + 'static,
    {
        let mut data = self.data.write().await;
        let fail = data.failures.updates.contains(&id);
        let ticket = data
            .tickets
            .get_mut(&id)
            .ok_or(StoreError::TicketNotFound(id))?;

        let patch = guard(&*ticket)?;
        if fail {
            return Err(StoreError::Database(format!("update of ticket {id} failed")));
        }

        let before = ticket.clone();
        patch.apply_to(ticket);
        ticket.changed_by = actor;
        ticket.changed_at = Utc::now();
        let change = TicketChange {
            before,
            after: ticket.clone(),
        };

        let hook = data.commit_hook.clone();
        drop(data);
        if let Some(hook) = hook {
            (hook.0)(id);
        }
        Ok(change)
    }

    async fn merge_ticket<G>(
        &self,
        source: TicketId,
        target: TicketId,
        merged_state: StateId,
        actor: UserId,
        guard: G,
    ) -> StoreResult<MergedTicket>
    where
        G: FnOnce(&Ticket) -> Result<(), ValidationError> + Send + 'static,
    {
        let mut data = self.data.write().await;
        if !data.tickets.contains_key(&target) {
            return Err(StoreError::TicketNotFound(target));
        }
        let before = data
            .tickets
            .get(&source)
            .cloned()
            .ok_or(StoreError::TicketNotFound(source))?;
        guard(&before)?;

        // Nothing below runs once the move fails, so the source stays untouched.
        if data.failures.article_moves.contains(&source) {
            return Err(StoreError::ArticleMove(format!(
                "articles of ticket {source} could not be reassigned"
            )));
        }

        let mut articles_moved = 0;
        for owner in data.articles.values_mut().filter(|owner| **owner == source) {
            *owner = target;
            articles_moved += 1;
        }
        if let Some(ticket) = data.tickets.get_mut(&source) {
            ticket.state_id = merged_state;
            ticket.pending_until = None;
            ticket.changed_by = actor;
            ticket.changed_at = Utc::now();
        }
        let hook = data.commit_hook.clone();
        drop(data);
        if let Some(hook) = hook {
            (hook.0)(source);
        }
        Ok(MergedTicket {
            before,
            articles_moved,
        })
    }

    async fn append_history(&self, entry: NewHistoryEntry) -> StoreResult<HistoryEntry> {
        let mut data = self.data.write().await;
        if data.failures.history_appends {
            return Err(StoreError::Database("history table unavailable".to_string()));
        }
        data.next_history_id += 1;
        let now = Utc::now();
        let created_at = data
            .history
            .last()
            .map_or(now, |last| last.created_at.max(now));
        let saved = HistoryEntry {
            id: data.next_history_id,
            ticket_id: entry.ticket_id,
            article_id: entry.article_id,
            history_type: entry.history_type,
            message: entry.message,
            created_by: entry.created_by,
            created_at,
        };
        data.history.push(saved.clone());
        Ok(saved)
    }

    async fn list_history(&self, ticket: TicketId) -> StoreResult<Vec<HistoryEntry>> {
        let data = self.data.read().await;
        let mut entries: Vec<HistoryEntry> = data
            .history
            .iter()
            .filter(|e| e.ticket_id == ticket)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.created_at, e.id));
        Ok(entries)
    }
}
