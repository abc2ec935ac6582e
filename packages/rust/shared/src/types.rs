//! Core domain types for research sessions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// KnowledgeId
// ---------------------------------------------------------------------------

/// Surrogate key assigned by a knowledge store at insertion time.
///
/// Monotonic per store, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeId(pub i64);

impl std::fmt::Display for KnowledgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one research run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// KnowledgeItem
// ---------------------------------------------------------------------------

/// One persisted unit of condensed research output.
///
/// Immutable once inserted, except for `cluster_label`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Result title (may be empty).
    #[serde(default)]
    pub title: String,
    /// Source URL (may be empty).
    #[serde(default)]
    pub url: String,
    /// Text that was fed to the condenser.
    #[serde(default)]
    pub raw_text: String,
    /// Condenser output, or `raw_text` when condensation failed.
    pub summary: String,
    /// Group label assigned by the post-run clustering step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_label: Option<i64>,
    /// Depth iteration (1-based) that produced this item.
    pub depth: u32,
}

// ---------------------------------------------------------------------------
// SearchHit
// ---------------------------------------------------------------------------

/// A single ranked web result from a search provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "link")]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

impl SearchHit {
    /// Convenience constructor, mostly for tests and fakes.
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }

    /// Text handed to the condenser when no page text was fetched.
    pub fn condense_input(&self) -> String {
        format!("{}: {}", self.title, self.snippet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_display_is_uuid() {
        let id = RunId::new();
        let parsed: Uuid = id.to_string().parse().expect("parse uuid");
        assert_eq!(parsed, id.0);
    }

    #[test]
    fn knowledge_id_orders_numerically() {
        let mut ids = vec![KnowledgeId(10), KnowledgeId(2), KnowledgeId(7)];
        ids.sort();
        assert_eq!(ids, vec![KnowledgeId(2), KnowledgeId(7), KnowledgeId(10)]);
        assert_eq!(KnowledgeId(3).to_string(), "3");
    }

    #[test]
    fn search_hit_accepts_link_alias() {
        let hit: SearchHit =
            serde_json::from_str(r#"{"title":"Ethics","link":"https://x.test","snippet":"s"}"#)
                .expect("deserialize");
        assert_eq!(hit.url, "https://x.test");
        assert_eq!(hit.condense_input(), "Ethics: s");
    }

    #[test]
    fn search_hit_missing_fields_default_to_empty() {
        let hit: SearchHit = serde_json::from_str(r#"{"title":"Only title"}"#).expect("deserialize");
        assert!(hit.url.is_empty());
        assert!(hit.snippet.is_empty());
    }

    #[test]
    fn knowledge_item_skips_absent_cluster_label() {
        let item = KnowledgeItem {
            title: "t".into(),
            url: String::new(),
            raw_text: "r".into(),
            summary: "s".into(),
            cluster_label: None,
            depth: 1,
        };
        let json = serde_json::to_string(&item).expect("serialize");
        assert!(!json.contains("cluster_label"));
        let parsed: KnowledgeItem = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, item);
    }
}
