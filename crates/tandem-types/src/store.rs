//! Store identity and durable key resolution.
//!
//! A [`StoreId`] names a logical document. Non-global ids are partitioned by
//! the current [`Scope`]; global ids share one document across every scope.
//! The resolved key is used both as the durable hash name and as the
//! broadcast channel name.
//!
//! | Store id | Resolved key |
//! |----------|--------------|
//! | `{ id: "players" }` in scope `t3_abc` | `t3_abc:players` |
//! | `{ id: "high-scores", isGlobal: true }` | `high_scores` |

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::Scope;

/// Separator between the scope and the store id in scoped keys.
///
/// Sanitized ids never contain it, so scoped keys cannot collide with
/// global keys.
pub const SCOPE_SEPARATOR: char = ':';

/// Identifies a replicated document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct StoreId {
    /// Document name, unique within its scope.
    pub id: String,
    /// Whether the document is shared across all scopes.
    #[serde(default, skip_serializing_if = "is_false")]
    #[ts(optional, as = "Option<bool>")]
    pub is_global: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl StoreId {
    /// A store partitioned by the current scope.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_global: false,
        }
    }

    /// A store shared by every scope.
    pub fn global(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_global: true,
        }
    }

    /// The id with every character outside `[A-Za-z0-9_]` replaced by `_`.
    pub fn sanitized(&self) -> String {
        self.id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect()
    }

    /// Resolve the effective durable key (and channel name) under `scope`.
    pub fn resolve(&self, scope: &Scope) -> String {
        let sanitized = self.sanitized();
        if self.is_global {
            sanitized
        } else {
            format!("{scope}{SCOPE_SEPARATOR}{sanitized}")
        }
    }
}

impl From<&str> for StoreId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StoreId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl core::fmt::Display for StoreId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_global {
            write!(f, "global:{}", self.id)
        } else {
            f.write_str(&self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_ids_partition_by_scope() {
        let id = StoreId::new("x");
        let a = id.resolve(&Scope::from("game_a"));
        let b = id.resolve(&Scope::from("game_b"));
        assert_ne!(a, b);
        assert_eq!(a, "game_a:x");
    }

    #[test]
    fn global_ids_ignore_scope() {
        let id = StoreId::global("x");
        assert_eq!(id.resolve(&Scope::from("game_a")), "x");
        assert_eq!(id.resolve(&Scope::from("game_b")), "x");
    }

    #[test]
    fn global_and_scoped_keys_never_collide() {
        // "a:x" is not reachable by a global id because ':' is sanitized away.
        let scoped = StoreId::new("x").resolve(&Scope::from("a"));
        let global = StoreId::global("a:x").resolve(&Scope::from("a"));
        assert_ne!(scoped, global);
        assert_eq!(global, "a_x");
    }

    #[test]
    fn store_keys_never_take_the_timer_channel() {
        let scope = Scope::from("p1");
        let channel = scope.timer_channel();
        assert_eq!(channel, "p1#timers");
        for id in [
            StoreId::global("p1"),
            StoreId::global("p1#timers"),
            StoreId::new("timers"),
            StoreId::new("#timers"),
        ] {
            assert_ne!(id.resolve(&scope), channel);
        }
    }

    #[test]
    fn sanitize_replaces_punctuation() {
        assert_eq!(StoreId::new("high-scores.v2").sanitized(), "high_scores_v2");
        assert_eq!(StoreId::new("plain_name9").sanitized(), "plain_name9");
    }

    #[test]
    fn is_global_is_omitted_when_false() {
        let json = serde_json::to_value(StoreId::new("players")).unwrap_or_default();
        assert_eq!(json, serde_json::json!({ "id": "players" }));

        let json = serde_json::to_value(StoreId::global("scores")).unwrap_or_default();
        assert_eq!(json, serde_json::json!({ "id": "scores", "isGlobal": true }));
    }

    #[test]
    fn missing_is_global_defaults_to_scoped() {
        let id: StoreId = serde_json::from_str(r#"{"id":"players"}"#).unwrap_or_else(|_| StoreId::global(""));
        assert_eq!(id, StoreId::new("players"));
    }
}
