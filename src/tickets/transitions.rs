//! Transition graph between coarse state classes.
//!
//! Catalog states carry a [`StateType`]; the validator only ever reasons
//! about the [`StateClass`] that type maps to, through [`rules_for`].

use serde::{Deserialize, Serialize};

use crate::core::shared::enums::StateType;

use super::error::ValidationError;
use super::types::{Actor, TicketState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    New,
    Open,
    Pending,
    Resolved,
    Closed,
    Merged,
    Removed,
}

impl StateClass {
    pub const ALL: [StateClass; 7] = [
        Self::New,
        Self::Open,
        Self::Pending,
        Self::Resolved,
        Self::Closed,
        Self::Merged,
        Self::Removed,
    ];
}

impl std::fmt::Display for StateClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Open => write!(f, "open"),
            Self::Pending => write!(f, "pending"),
            Self::Resolved => write!(f, "resolved"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// Per-type requirements consulted when a ticket enters a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateRules {
    pub class: StateClass,
    pub requires_reason: bool,
    pub requires_deadline: bool,
    pub requires_resolution: bool,
    pub is_terminal: bool,
}

impl StateRules {
    const fn plain(class: StateClass) -> Self {
        Self {
            class,
            requires_reason: false,
            requires_deadline: false,
            requires_resolution: false,
            is_terminal: false,
        }
    }

    const fn terminal(class: StateClass) -> Self {
        Self {
            is_terminal: true,
            ..Self::plain(class)
        }
    }
}

pub fn rules_for(state_type: StateType) -> StateRules {
    match state_type {
        StateType::New => StateRules::plain(StateClass::New),
        StateType::Open => StateRules::plain(StateClass::Open),
        StateType::PendingReminder | StateType::PendingAuto => StateRules {
            requires_reason: true,
            requires_deadline: true,
            ..StateRules::plain(StateClass::Pending)
        },
        StateType::Resolved => StateRules {
            requires_resolution: true,
            ..StateRules::plain(StateClass::Resolved)
        },
        StateType::Closed => StateRules::plain(StateClass::Closed),
        StateType::Merged => StateRules::terminal(StateClass::Merged),
        StateType::Removed => StateRules::terminal(StateClass::Removed),
    }
}

/// Every direct edge of the graph. `merged` is only entered by a merge.
pub const LEGAL_TRANSITIONS: [(StateClass, StateClass); 6] = [
    (StateClass::New, StateClass::Open),
    (StateClass::Open, StateClass::Pending),
    (StateClass::Pending, StateClass::Open),
    (StateClass::Open, StateClass::Resolved),
    (StateClass::Resolved, StateClass::Closed),
    (StateClass::Closed, StateClass::Open),
];

pub fn is_legal_transition(from: StateClass, to: StateClass) -> bool {
    LEGAL_TRANSITIONS.contains(&(from, to))
}

/// Caller-supplied inputs that accompany a state change.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionInput<'a> {
    pub reason: Option<&'a str>,
    pub resolution: Option<&'a str>,
    pub has_deadline: bool,
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Checks that depend only on the target state and the request itself.
pub fn check_preconditions(
    target: &TicketState,
    input: &TransitionInput<'_>,
    actor: &Actor,
) -> Result<(), ValidationError> {
    let rules = target.rules();

    if actor.is_customer() && rules.class == StateClass::Resolved {
        return Err(ValidationError::PermissionDenied(
            "customers cannot resolve tickets".to_string(),
        ));
    }
    if rules.requires_reason && is_blank(input.reason) {
        return Err(ValidationError::ReasonRequired);
    }
    if rules.requires_deadline && !input.has_deadline {
        return Err(ValidationError::PendingTimeRequired);
    }
    if rules.requires_resolution && is_blank(input.resolution) {
        return Err(ValidationError::ResolutionRequired);
    }
    Ok(())
}

/// Full check of one move, run against the freshly locked row.
pub fn check_transition(
    current: &TicketState,
    target: &TicketState,
    input: &TransitionInput<'_>,
    actor: &Actor,
) -> Result<(), ValidationError> {
    check_preconditions(target, input, actor)?;

    let from = current.class();
    let to = target.class();
    if !is_legal_transition(from, to) {
        return Err(ValidationError::IllegalTransition { from, to });
    }
    if actor.is_customer() && from == StateClass::Closed && to == StateClass::Open {
        return Err(ValidationError::PermissionDenied(
            "customers must submit a reopen request".to_string(),
        ));
    }
    Ok(())
}

/// A reopen request records intent only; the ticket must be closed or resolved.
pub fn check_reopen_request(current: &TicketState, reason: &str) -> Result<(), ValidationError> {
    if reason.trim().is_empty() {
        return Err(ValidationError::ReasonRequired);
    }
    match current.class() {
        StateClass::Closed | StateClass::Resolved => Ok(()),
        from => Err(ValidationError::IllegalTransition {
            from,
            to: StateClass::Open,
        }),
    }
}
