//! Read-only lookup of catalog states by id, name or alias.

use serde::Serialize;

use crate::core::shared::enums::StateType;

use super::types::{StateId, TicketState};

/// Lowercases and folds `-`, `_` and runs of whitespace into single spaces.
pub fn normalize_state_name(name: &str) -> String {
    name.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateResolution<'a> {
    /// Nothing was supplied.
    Blank,
    /// Numeric input, taken as an id without consulting the catalog.
    Id(StateId),
    Found(&'a TicketState),
    NotFound(String),
}

impl<'a> StateResolution<'a> {
    pub fn state_id(&self) -> Option<StateId> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Found(state) => Some(state.id),
            Self::Blank | Self::NotFound(_) => None,
        }
    }
}

/// Entry of the option list handed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct StateOption {
    pub id: StateId,
    pub name: String,
    pub state_type: StateType,
    pub pending: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StateCatalog {
    states: Vec<TicketState>,
}

impl StateCatalog {
    pub fn new(mut states: Vec<TicketState>) -> Self {
        states.sort_by_key(|s| s.id);
        Self { states }
    }

    pub fn resolve(&self, alias_or_id: &str) -> StateResolution<'_> {
        let input = alias_or_id.trim();
        if input.is_empty() {
            return StateResolution::Blank;
        }
        if let Ok(id) = input.parse::<StateId>() {
            return StateResolution::Id(id);
        }
        let wanted = normalize_state_name(input);
        self.states
            .iter()
            .find(|s| normalize_state_name(&s.name) == wanted)
            .map_or_else(
                || StateResolution::NotFound(input.to_string()),
                StateResolution::Found,
            )
    }

    pub fn by_id(&self, id: StateId) -> Option<&TicketState> {
        self.states.iter().find(|s| s.id == id)
    }

    /// First valid state of the given type, lowest id first.
    pub fn first_of_type(&self, state_type: StateType) -> Option<&TicketState> {
        self.states
            .iter()
            .find(|s| s.is_valid && s.state_type == state_type)
    }

    pub fn states(&self) -> &[TicketState] {
        &self.states
    }

    pub fn options(&self) -> Vec<StateOption> {
        self.states
            .iter()
            .filter(|s| s.is_valid)
            .map(|s| StateOption {
                id: s.id,
                name: s.name.clone(),
                state_type: s.state_type,
                pending: s.is_pending(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StateCatalog {
        let mut retired = TicketState::new(11, "merged legacy", StateType::Merged);
        retired.is_valid = false;
        StateCatalog::new(vec![
            TicketState::new(4, "open", StateType::Open),
            TicketState::new(1, "new", StateType::New),
            TicketState::new(7, "pending auto close+", StateType::PendingAuto),
            TicketState::new(6, "pending reminder", StateType::PendingReminder),
            retired,
            TicketState::new(9, "merged", StateType::Merged),
        ])
    }

    #[test]
    fn test_normalize_state_name() {
        assert_eq!(normalize_state_name("Pending_Reminder"), "pending reminder");
        assert_eq!(normalize_state_name("  pending -  reminder "), "pending reminder");
    }

    #[test]
    fn test_resolve_aliases() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("PENDING-reminder").state_id(), Some(6));
        assert_eq!(catalog.resolve("pending_auto_close+").state_id(), Some(7));
        assert_eq!(catalog.resolve("42"), StateResolution::Id(42));
        assert_eq!(catalog.resolve("   "), StateResolution::Blank);
        assert_eq!(
            catalog.resolve("waiting"),
            StateResolution::NotFound("waiting".to_string())
        );
    }

    #[test]
    fn test_first_of_type_skips_invalid() {
        let catalog = catalog();
        assert_eq!(catalog.first_of_type(StateType::Merged).map(|s| s.id), Some(9));
        assert!(catalog.first_of_type(StateType::Resolved).is_none());
        let pending: Vec<_> = catalog.options().into_iter().filter(|o| o.pending).map(|o| o.id).collect();
        assert_eq!(pending, vec![6, 7]);
    }
}
