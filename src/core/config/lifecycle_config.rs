use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::tickets::bulk::DEFAULT_MAX_BULK_TICKETS;
use crate::tickets::history::DEFAULT_EXCERPT_CHARS;
use crate::tickets::pending::PendingTimeResolver;

const MAX_BULK_CEILING: usize = 10_000;
const EXCERPT_MIN: usize = 20;
const EXCERPT_MAX: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Zone applied to pending deadlines given without an offset.
    pub default_timezone: String,

    pub max_bulk_tickets: usize,

    pub note_excerpt_chars: usize,

    /// Also write "Merged into ticket ..." on every merged source.
    pub record_merge_on_sources: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_timezone: "UTC".to_string(),
            max_bulk_tickets: DEFAULT_MAX_BULK_TICKETS,
            note_excerpt_chars: DEFAULT_EXCERPT_CHARS,
            record_merge_on_sources: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value '{}' for {}", raw, key);
            None
        }
    }
}

impl LifecycleConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(tz) = std::env::var("TICKETS_DEFAULT_TIMEZONE") {
            config.default_timezone = tz;
        }
        if let Some(max) = env_parse("TICKETS_MAX_BULK") {
            config.max_bulk_tickets = max;
        }
        if let Some(chars) = env_parse("TICKETS_NOTE_EXCERPT_CHARS") {
            config.note_excerpt_chars = chars;
        }
        if let Some(flag) = env_parse("TICKETS_MERGE_SOURCE_HISTORY") {
            config.record_merge_on_sources = flag;
        }

        config.clamped()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<Self>(content).map(Self::clamped)
    }

    /// Pulls out-of-range values back into bounds, warning for each.
    pub fn clamped(mut self) -> Self {
        if self.max_bulk_tickets == 0 {
            warn!("max_bulk_tickets of 0 is invalid, using {}", DEFAULT_MAX_BULK_TICKETS);
            self.max_bulk_tickets = DEFAULT_MAX_BULK_TICKETS;
        } else if self.max_bulk_tickets > MAX_BULK_CEILING {
            warn!(
                "max_bulk_tickets {} is too high, capping at {}",
                self.max_bulk_tickets, MAX_BULK_CEILING
            );
            self.max_bulk_tickets = MAX_BULK_CEILING;
        }

        let chars = self.note_excerpt_chars.clamp(EXCERPT_MIN, EXCERPT_MAX);
        if chars != self.note_excerpt_chars {
            warn!(
                "note_excerpt_chars {} out of range, using {}",
                self.note_excerpt_chars, chars
            );
            self.note_excerpt_chars = chars;
        }

        debug!(
            "Lifecycle config: tz={} max_bulk={} excerpt={} merge_source_history={}",
            self.default_timezone,
            self.max_bulk_tickets,
            self.note_excerpt_chars,
            self.record_merge_on_sources
        );
        self
    }

    pub fn pending_resolver(&self) -> PendingTimeResolver {
        PendingTimeResolver::from_zone_name(&self.default_timezone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LifecycleConfig::default();
        assert_eq!(config.max_bulk_tickets, 1000);
        assert_eq!(config.note_excerpt_chars, 140);
        assert!(config.record_merge_on_sources);
    }

    #[test]
    fn test_toml_partial_and_clamped() {
        let config = LifecycleConfig::from_toml_str(
            r#"
            default_timezone = "+02:00"
            max_bulk_tickets = 50000
            note_excerpt_chars = 3
            "#,
        )
        .expect("parse");
        assert_eq!(config.default_timezone, "+02:00");
        assert_eq!(config.max_bulk_tickets, MAX_BULK_CEILING);
        assert_eq!(config.note_excerpt_chars, EXCERPT_MIN);
        assert!(config.record_merge_on_sources);
        assert_eq!(config.pending_resolver().timezone().local_minus_utc(), 7200);
    }

    #[test]
    fn test_bad_timezone_resolves_to_utc() {
        let config = LifecycleConfig {
            default_timezone: "Atlantis/Central".to_string(),
            ..Default::default()
        };
        assert_eq!(config.pending_resolver().timezone().local_minus_utc(), 0);
    }
}
