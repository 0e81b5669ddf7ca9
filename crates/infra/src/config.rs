//! Persistence configuration.

use tracing::warn;

/// Default lifetime of persisted domain-event documents, in seconds.
pub const DEFAULT_EVENT_TTL_SECONDS: i32 = 120;

/// When the change tracker publishes the pending domain events of a commit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PublishOrder {
    /// Publish before the store write is attempted. Subscribers may observe
    /// events of a commit that later fails, so they must tolerate that.
    #[default]
    BeforeWrite,
    /// Publish only once the store write succeeded.
    AfterCommit,
}

impl core::str::FromStr for PublishOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before_write" | "before-write" => Ok(Self::BeforeWrite),
            "after_commit" | "after-commit" => Ok(Self::AfterCommit),
            other => Err(format!("unknown publish order '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    /// TTL stamped on event documents (`CONTACTSTORE_EVENT_TTL`).
    pub event_ttl_seconds: i32,
    /// `CONTACTSTORE_PUBLISH_ORDER`: `before_write` or `after_commit`.
    pub publish_order: PublishOrder,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            event_ttl_seconds: DEFAULT_EVENT_TTL_SECONDS,
            publish_order: PublishOrder::default(),
        }
    }
}

impl PersistenceConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Absent keys keep their default; malformed values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("CONTACTSTORE_EVENT_TTL") {
            match raw.trim().parse::<i32>() {
                Ok(ttl) if ttl > 0 || ttl == -1 => config.event_ttl_seconds = ttl,
                _ => warn!(value = %raw, "ignoring invalid CONTACTSTORE_EVENT_TTL"),
            }
        }

        if let Some(raw) = lookup("CONTACTSTORE_PUBLISH_ORDER") {
            match raw.parse() {
                Ok(order) => config.publish_order = order,
                Err(e) => warn!(error = %e, "ignoring invalid CONTACTSTORE_PUBLISH_ORDER"),
            }
        }

        config
    }
}
