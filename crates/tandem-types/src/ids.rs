//! Identifier types shared by the client, server and timer crates.
//!
//! [`TimerId`] is a UUID v4 newtype so timer ids can never be mixed up with
//! other strings that travel through the backend. [`Scope`] names the
//! partition (one game instance) that non-global stores and timers belong to.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier (UUID v4).
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl core::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a scheduled timer event.
    TimerId
}

/// Appended to a scope to name its timer broadcast channel.
///
/// Store keys end in sanitized characters, which never include `#`.
pub const TIMER_CHANNEL_SUFFIX: &str = "#timers";

/// The partition a non-global store or a timer belongs to.
///
/// In a hosted game this is the post (game instance) id. Global stores
/// ignore the scope entirely.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Wrap a scope string.
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    /// Borrow the scope as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the scope is empty (no game instance in context).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Channel fired timers of this scope are published on.
    pub fn timer_channel(&self) -> String {
        format!("{}{TIMER_CHANNEL_SUFFIX}", self.0)
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(scope: &str) -> Self {
        Self(scope.to_owned())
    }
}

impl From<String> for Scope {
    fn from(scope: String) -> Self {
        Self(scope)
    }
}

impl AsRef<str> for Scope {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_ids_are_unique() {
        assert_ne!(TimerId::new(), TimerId::new());
        assert_ne!(TimerId::new().into_inner(), Uuid::nil());
    }

    #[test]
    fn timer_id_parses_its_display_form() {
        let id = TimerId::new();
        let parsed: Result<TimerId, _> = id.to_string().parse();
        assert_eq!(parsed.ok(), Some(id));
    }

    #[test]
    fn timer_id_serializes_as_bare_uuid() {
        let id = TimerId::new();
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn scope_is_transparent_on_the_wire() {
        let scope = Scope::from("t3_abc");
        assert_eq!(serde_json::to_string(&scope).unwrap_or_default(), "\"t3_abc\"");
        assert!(!scope.is_empty());
        assert!(Scope::new(String::new()).is_empty());
    }
}
