//! Origin-based filtering of log calls.
//!
//! Calls routed from the tracing bridge carry their target as origin
//! (`sqlx::query`, `hyper::proto::h1`). Infrastructure origins are dropped
//! before formatting. Calls made directly on a logger have no origin and
//! are always accepted.

use std::fmt;
use std::sync::Arc;

/// Origins ignored by default: this workspace's own crates and common
/// infrastructure libraries.
pub const DEFAULT_IGNORED_ORIGINS: &[&str] = &[
    "oplog_capture",
    "oplog_db_postgres",
    "oplog_db_memory",
    "oplog_storage",
    "sqlx",
    "tokio",
    "hyper",
    "h2",
    "tower",
];

type OriginPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Predicate deciding whether a call reaches a process logger.
#[derive(Clone)]
pub struct OriginFilter {
    ignored: Vec<String>,
    predicate: Option<OriginPredicate>,
}

impl fmt::Debug for OriginFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginFilter")
            .field("ignored", &self.ignored)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl Default for OriginFilter {
    fn default() -> Self {
        Self::with_ignored(DEFAULT_IGNORED_ORIGINS.iter().copied())
    }
}

impl OriginFilter {
    /// A filter that accepts everything.
    pub fn accept_all() -> Self {
        Self {
            ignored: Vec::new(),
            predicate: None,
        }
    }

    /// Ignores origins equal to, or nested under, any of the given prefixes.
    pub fn with_ignored<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
            predicate: None,
        }
    }

    /// Adds a custom predicate; an origin must also satisfy it to be accepted.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    /// Returns `true` if a call from `origin` should be recorded.
    pub fn accepts(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return true;
        };
        if self.ignored.iter().any(|prefix| is_under(origin, prefix)) {
            return false;
        }
        self.predicate.as_ref().is_none_or(|p| p(origin))
    }
}

/// `sqlx` matches `sqlx`, `sqlx::query` and `sqlx.pool`, but not `sqlxmq`.
fn is_under(origin: &str, prefix: &str) -> bool {
    match origin.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with("::") || rest.starts_with('.'),
        None => false,
    }
}
