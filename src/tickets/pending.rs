//! Pending-deadline parsing and formatting in the configured timezone.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, SecondsFormat, TimeZone, Utc};
use log::warn;

/// Layouts accepted for a pending deadline, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingFormat {
    Rfc3339,
    DateTSeconds,
    DateTMinutes,
    DateSpaceSeconds,
    DateSpaceMinutes,
}

impl PendingFormat {
    pub const ALL: [PendingFormat; 5] = [
        Self::Rfc3339,
        Self::DateTSeconds,
        Self::DateTMinutes,
        Self::DateSpaceSeconds,
        Self::DateSpaceMinutes,
    ];

    /// `strftime` pattern for the offset-less layouts.
    fn pattern(self) -> Option<&'static str> {
        match self {
            Self::Rfc3339 => None,
            Self::DateTSeconds => Some("%Y-%m-%dT%H:%M:%S"),
            Self::DateTMinutes => Some("%Y-%m-%dT%H:%M"),
            Self::DateSpaceSeconds => Some("%Y-%m-%d %H:%M:%S"),
            Self::DateSpaceMinutes => Some("%Y-%m-%d %H:%M"),
        }
    }
}

/// Audit message layout, e.g. `02 Jan 2026 15:04`.
const DISPLAY_FORMAT: &str = "%d %b %Y %H:%M";

/// Parses `UTC`, `Z`, `GMT` or a fixed offset such as `+02:00`, `-0530`, `+01`.
pub fn parse_timezone(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.is_empty()
        || ["utc", "z", "gmt", "etc/utc"].contains(&value.to_lowercase().as_str())
    {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimeResolver {
    tz: FixedOffset,
}

impl Default for PendingTimeResolver {
    fn default() -> Self {
        Self { tz: Utc.fix() }
    }
}

impl PendingTimeResolver {
    pub fn new(tz: FixedOffset) -> Self {
        Self { tz }
    }

    /// Builds a resolver from a configured zone name, falling back to UTC.
    pub fn from_zone_name(name: &str) -> Self {
        match parse_timezone(name) {
            Some(tz) => Self::new(tz),
            None => {
                warn!("Unrecognized timezone '{}', falling back to UTC", name);
                Self::default()
            }
        }
    }

    pub fn timezone(&self) -> FixedOffset {
        self.tz
    }

    /// Absolute instant for `text`, or `None` when nothing matches.
    pub fn parse(&self, text: &str) -> Option<DateTime<Utc>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let instant = PendingFormat::ALL
            .iter()
            .find_map(|format| self.parse_as(*format, text))?;
        (instant.timestamp() > 0).then_some(instant)
    }

    fn parse_as(&self, format: PendingFormat, text: &str) -> Option<DateTime<Utc>> {
        match format.pattern() {
            None => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Some(pattern) => {
                let naive = NaiveDateTime::parse_from_str(text, pattern).ok()?;
                self.tz
                    .from_local_datetime(&naive)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        }
    }

    pub fn format(&self, instant: DateTime<Utc>, format: PendingFormat) -> String {
        let local = instant.with_timezone(&self.tz);
        match format.pattern() {
            None => local.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            Some(pattern) => local.format(pattern).to_string(),
        }
    }

    pub fn display(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.tz).format(DISPLAY_FORMAT).to_string()
    }
}

/// Convenience wrapper over a UTC resolver.
pub fn parse_pending_until(text: &str) -> Option<DateTime<Utc>> {
    PendingTimeResolver::default().parse(text)
}
