//! Append-only audit trail for ticket mutations.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::shared::enums::HistoryType;

use super::store::{StoreResult, TicketStore};
use super::types::{ArticleId, HistoryId, TicketId, UserId};

pub const DEFAULT_EXCERPT_CHARS: usize = 140;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryId,
    pub ticket_id: TicketId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_id: Option<ArticleId>,
    pub history_type: HistoryType,
    pub message: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub ticket_id: TicketId,
    pub article_id: Option<ArticleId>,
    pub history_type: HistoryType,
    pub message: String,
    pub created_by: UserId,
}

impl NewHistoryEntry {
    pub fn new(ticket_id: TicketId, history_type: HistoryType, message: impl Into<String>, created_by: UserId) -> Self {
        Self {
            ticket_id,
            article_id: None,
            history_type,
            message: message.into(),
            created_by,
        }
    }

    pub fn with_article(mut self, article_id: ArticleId) -> Self {
        self.article_id = Some(article_id);
        self
    }
}

/// Before/after message for one field; empty when nothing changed.
pub fn change_message(field: &str, old: &str, new: &str) -> String {
    let old = old.trim();
    let new = new.trim();
    if old == new {
        String::new()
    } else if old.is_empty() {
        format!("{field} set to {new}")
    } else {
        format!("{field} changed from {old} to {new}")
    }
}

/// Collapses whitespace and cuts `text` to at most `max_chars` characters,
/// backing up to the last word boundary.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max_chars).collect();
    let ends_on_word = collapsed.chars().nth(max_chars) == Some(' ');
    let trimmed = match cut.rfind(' ') {
        _ if ends_on_word => cut.as_str(),
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end())
}

/// `"<label> — <excerpt>"`, or just the label when the body is blank.
pub fn note_message(label: &str, body: &str, max_chars: usize) -> String {
    let body = excerpt(body, max_chars);
    if body.is_empty() {
        label.to_string()
    } else {
        format!("{label} — {body}")
    }
}

/// Entries written by one operation and whether every append succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditTrail {
    pub entries: Vec<HistoryEntry>,
    pub complete: bool,
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            complete: true,
        }
    }
}

#[derive(Clone)]
pub struct HistoryRecorder<S: TicketStore> {
    store: S,
    excerpt_chars: usize,
}

impl<S: TicketStore> HistoryRecorder<S> {
    pub fn new(store: S, excerpt_chars: usize) -> Self {
        Self {
            store,
            excerpt_chars: excerpt_chars.max(1),
        }
    }

    pub fn excerpt_chars(&self) -> usize {
        self.excerpt_chars
    }

    pub fn note(&self, label: &str, body: &str) -> String {
        note_message(label, body, self.excerpt_chars)
    }

    /// Appends one entry. Blank messages are skipped and yield `None`.
    pub async fn record(&self, entry: NewHistoryEntry) -> StoreResult<Option<HistoryEntry>> {
        if entry.message.trim().is_empty() {
            debug!(
                "Skipping empty {} history entry for ticket {}",
                entry.history_type, entry.ticket_id
            );
            return Ok(None);
        }
        self.store.append_history(entry).await.map(Some)
    }

    /// Post-commit append: a failure is logged and marks the trail incomplete.
    pub async fn record_into(&self, trail: &mut AuditTrail, entry: NewHistoryEntry) {
        let ticket_id = entry.ticket_id;
        let history_type = entry.history_type;
        match self.record(entry).await {
            Ok(Some(saved)) => trail.entries.push(saved),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    "Failed to record {} history for ticket {}: {}",
                    history_type, ticket_id, e
                );
                trail.complete = false;
            }
        }
    }

    pub async fn list(&self, ticket_id: TicketId) -> StoreResult<Vec<HistoryEntry>> {
        self.store.list_history(ticket_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_message() {
        assert_eq!(change_message("State", "open", "open"), "");
        assert_eq!(
            change_message("State", "", "pending reminder"),
            "State set to pending reminder"
        );
        assert_eq!(
            change_message("Priority", "3 normal", "5 very high"),
            "Priority changed from 3 normal to 5 very high"
        );
    }

    #[test]
    fn test_excerpt_trims_at_word_boundary() {
        assert_eq!(excerpt("  short\n\tnote  ", 140), "short note");
        assert_eq!(excerpt("the quick brown fox", 12), "the quick...");
        assert_eq!(excerpt("supercalifragilistic", 5), "super...");
        assert_eq!(excerpt("the quick brown", 9), "the quick...");
        assert_eq!(excerpt("the quick brown", 10), "the quick...");

        let long = "word ".repeat(60);
        let cut = excerpt(&long, DEFAULT_EXCERPT_CHARS);
        assert!(cut.chars().count() <= DEFAULT_EXCERPT_CHARS + 3);
        assert!(cut.ends_with("word..."));
    }

    #[test]
    fn test_note_message() {
        assert_eq!(
            note_message("Pending reason", "waiting on   vendor", 140),
            "Pending reason — waiting on vendor"
        );
        assert_eq!(note_message("Resolution", "  ", 140), "Resolution");
    }
}
