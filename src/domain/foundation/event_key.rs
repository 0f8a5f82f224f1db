//! Registry keys: a concrete event type or the reserved wildcard.

use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// The reserved key meaning "every envelope, whatever its type".
pub const WILDCARD: &str = "*";

/// Key under which handlers are registered.
///
/// Parsed from the event-type string handed to `subscribe`: the exact
/// string `"*"` selects [`EventKey::Wildcard`], any other non-empty
/// string is a concrete type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKey {
    /// Handlers receive only the `data` of envelopes with this type.
    Type(String),
    /// Handlers receive the full `{type, data}` envelope of every dispatch.
    Wildcard,
}

impl EventKey {
    /// Parses an event-type string into a key.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyField` for an empty string.
    pub fn parse(event_type: &str) -> Result<Self, ValidationError> {
        match event_type {
            "" => Err(ValidationError::empty_field("event_type")),
            WILDCARD => Ok(EventKey::Wildcard),
            other => Ok(EventKey::Type(other.to_string())),
        }
    }

    /// Returns the string form of the key.
    pub fn as_str(&self) -> &str {
        match self {
            EventKey::Type(event_type) => event_type,
            EventKey::Wildcard => WILDCARD,
        }
    }

    /// True for the wildcard key.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, EventKey::Wildcard)
    }
}

impl FromStr for EventKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
