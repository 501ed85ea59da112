//! PostgreSQL [`TicketStore`] on the shared diesel pool.
//!
//! Diesel is synchronous, so every call runs on the blocking pool with its own
//! pooled connection. Writes lock the ticket row with `SELECT ... FOR UPDATE`
//! inside a transaction.

use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;

use crate::core::shared::enums::{HistoryType, StateType};
use crate::core::shared::schema::{article, queue, ticket, ticket_history, ticket_priority, ticket_state, users};
use crate::core::shared::DbPool;

use super::error::{StoreError, ValidationError};
use super::history::{HistoryEntry, NewHistoryEntry};
use super::store::{StoreResult, TicketStore};
use super::types::{
    MergedTicket, PriorityId, QueueId, RefLabel, StateId, Ticket, TicketChange, TicketId,
    TicketPatch, TicketState, UserId,
};

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = ticket)]
struct TicketRow {
    id: i64,
    tn: String,
    ticket_state_id: i32,
    ticket_priority_id: i32,
    queue_id: i32,
    user_id: i32,
    responsible_user_id: Option<i32>,
    locked: bool,
    until_time: i64,
    change_by: i32,
    change_time: DateTime<Utc>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Self {
            id: row.id,
            ticket_number: row.tn,
            state_id: row.ticket_state_id,
            priority_id: row.ticket_priority_id,
            queue_id: row.queue_id,
            owner_id: row.user_id,
            responsible_id: row.responsible_user_id,
            locked: row.locked,
            pending_until: from_until_time(row.until_time),
            changed_by: row.change_by,
            changed_at: row.change_time,
        }
    }
}

/// `until_time` stores unix seconds, `0` meaning unset.
fn from_until_time(value: i64) -> Option<DateTime<Utc>> {
    if value <= 0 {
        return None;
    }
    Utc.timestamp_opt(value, 0).single()
}

fn to_until_time(value: Option<DateTime<Utc>>) -> i64 {
    value.map_or(0, |dt| dt.timestamp())
}

#[derive(AsChangeset)]
#[diesel(table_name = ticket)]
struct TicketChangeset {
    ticket_state_id: Option<i32>,
    until_time: Option<i64>,
    ticket_priority_id: Option<i32>,
    queue_id: Option<i32>,
    user_id: Option<i32>,
    responsible_user_id: Option<Option<i32>>,
    locked: Option<bool>,
    change_by: i32,
    change_time: DateTime<Utc>,
}

impl TicketChangeset {
    fn from_patch(patch: &TicketPatch, actor: UserId, now: DateTime<Utc>) -> Self {
        Self {
            ticket_state_id: patch.state_id,
            until_time: patch.pending_until.map(to_until_time),
            ticket_priority_id: patch.priority_id,
            queue_id: patch.queue_id,
            user_id: patch.owner_id,
            responsible_user_id: patch.responsible_id,
            locked: patch.locked,
            change_by: actor,
            change_time: now,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = ticket_state)]
struct StateRow {
    id: i32,
    name: String,
    type_id: StateType,
    is_valid: bool,
}

impl From<StateRow> for TicketState {
    fn from(row: StateRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            state_type: row.type_id,
            is_valid: row.is_valid,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = ticket_history)]
struct HistoryRow {
    id: i64,
    ticket_id: i64,
    article_id: Option<i64>,
    history_type: HistoryType,
    message: String,
    create_by: i32,
    create_time: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            ticket_id: row.ticket_id,
            article_id: row.article_id,
            history_type: row.history_type,
            message: row.message,
            created_by: row.create_by,
            created_at: row.create_time,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = ticket_history)]
struct NewHistoryRow {
    ticket_id: i64,
    article_id: Option<i64>,
    history_type: HistoryType,
    message: String,
    create_by: i32,
    create_time: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgTicketStore {
    pool: DbPool,
}

impl PgTicketStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Connection(format!("Task error: {}", e)))?
    }
}

impl TicketStore for PgTicketStore {
    async fn load_states(&self) -> StoreResult<Vec<TicketState>> {
        self.run(|conn| {
            let rows = ticket_state::table
                .select(StateRow::as_select())
                .order(ticket_state::id.asc())
                .load(conn)?;
            Ok(rows.into_iter().map(TicketState::from).collect())
        })
        .await
    }

    async fn get_ticket(&self, id: TicketId) -> StoreResult<Option<Ticket>> {
        self.run(move |conn| {
            let row = ticket::table
                .find(id)
                .select(TicketRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(Ticket::from))
        })
        .await
    }

    async fn state_by_id(&self, id: StateId) -> StoreResult<Option<TicketState>> {
        self.run(move |conn| {
            let row = ticket_state::table
                .find(id)
                .select(StateRow::as_select())
                .first(conn)
                .optional()?;
            Ok(row.map(TicketState::from))
        })
        .await
    }

    async fn priority_label(&self, id: PriorityId) -> StoreResult<Option<RefLabel>> {
        self.run(move |conn| {
            let row = ticket_priority::table
                .find(id)
                .select((ticket_priority::name, ticket_priority::is_valid))
                .first::<(String, bool)>(conn)
                .optional()?;
            Ok(row.map(|(name, is_valid)| RefLabel { name, is_valid }))
        })
        .await
    }

    async fn queue_label(&self, id: QueueId) -> StoreResult<Option<RefLabel>> {
        self.run(move |conn| {
            let row = queue::table
                .find(id)
                .select((queue::name, queue::is_valid))
                .first::<(String, bool)>(conn)
                .optional()?;
            Ok(row.map(|(name, is_valid)| RefLabel { name, is_valid }))
        })
        .await
    }

    async fn user_label(&self, id: UserId) -> StoreResult<Option<RefLabel>> {
        self.run(move |conn| {
            let row = users::table
                .find(id)
                .select((users::login, users::first_name, users::last_name, users::is_valid))
                .first::<(String, String, String, bool)>(conn)
                .optional()?;
            Ok(row.map(|(login, first, last, is_valid)| {
                let full = format!("{} {}", first.trim(), last.trim());
                let name = if full.trim().is_empty() {
                    login
                } else {
                    full.trim().to_string()
                };
                RefLabel { name, is_valid }
            }))
        })
        .await
    }

    async fn update_ticket<G>(&self, id: TicketId, actor: UserId, guard: G) -> StoreResult<TicketChange>
    where
        G: FnOnce(&Ticket) -> Result<TicketPatch, ValidationError> + Send + 'static,
    {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let before: Ticket = ticket::table
                    .find(id)
                    .select(TicketRow::as_select())
                    .for_update()
                    .first(conn)
                    .optional()?
                    .ok_or(StoreError::TicketNotFound(id))?
                    .into();

                let patch = guard(&before)?;
                let now = Utc::now();
                diesel::update(ticket::table.find(id))
                    .set(&TicketChangeset::from_patch(&patch, actor, now))
                    .execute(conn)?;

                let mut after = before.clone();
                patch.apply_to(&mut after);
                after.changed_by = actor;
                after.changed_at = now;
                Ok(TicketChange { before, after })
            })
        })
        .await
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
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let target_exists = ticket::table
                    .find(target)
                    .select(ticket::id)
                    .first::<i64>(conn)
                    .optional()?
                    .is_some();
                if !target_exists {
                    return Err(StoreError::TicketNotFound(target));
                }

                let before: Ticket = ticket::table
                    .find(source)
                    .select(TicketRow::as_select())
                    .for_update()
                    .first(conn)
                    .optional()?
                    .ok_or(StoreError::TicketNotFound(source))?
                    .into();
                guard(&before)?;

                let articles_moved = diesel::update(article::table.filter(article::ticket_id.eq(source)))
                    .set(article::ticket_id.eq(target))
                    .execute(conn)
                    .map_err(|e| StoreError::ArticleMove(e.to_string()))?;

                diesel::update(ticket::table.find(source))
                    .set((
                        ticket::ticket_state_id.eq(merged_state),
                        ticket::until_time.eq(0i64),
                        ticket::change_by.eq(actor),
                        ticket::change_time.eq(Utc::now()),
                    ))
                    .execute(conn)?;

                Ok(MergedTicket {
                    before,
                    articles_moved: articles_moved as u64,
                })
            })
        })
        .await
    }

    async fn append_history(&self, entry: NewHistoryEntry) -> StoreResult<HistoryEntry> {
        self.run(move |conn| {
            let row = diesel::insert_into(ticket_history::table)
                .values(NewHistoryRow {
                    ticket_id: entry.ticket_id,
                    article_id: entry.article_id,
                    history_type: entry.history_type,
                    message: entry.message,
                    create_by: entry.created_by,
                    create_time: Utc::now(),
                })
                .returning(HistoryRow::as_returning())
                .get_result(conn)?;
            Ok(row.into())
        })
        .await
    }

    async fn list_history(&self, ticket_id: TicketId) -> StoreResult<Vec<HistoryEntry>> {
        self.run(move |conn| {
            let rows = ticket_history::table
                .filter(ticket_history::ticket_id.eq(ticket_id))
                .order((ticket_history::create_time.asc(), ticket_history::id.asc()))
                .select(HistoryRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(HistoryEntry::from).collect())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_until_time_conversion() {
        assert_eq!(from_until_time(0), None);
        assert_eq!(from_until_time(-5), None);
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        assert_eq!(from_until_time(to_until_time(Some(at))), Some(at));
        assert_eq!(to_until_time(None), 0);
    }

    #[test]
    fn test_changeset_clears_pending_time() {
        let patch = TicketPatch {
            state_id: Some(4),
            pending_until: Some(None),
            ..Default::default()
        };
        let changes = TicketChangeset::from_patch(&patch, 7, Utc::now());
        assert_eq!(changes.until_time, Some(0));
        assert_eq!(changes.ticket_state_id, Some(4));
        assert_eq!(changes.ticket_priority_id, None);
        assert_eq!(changes.change_by, 7);
    }
}
