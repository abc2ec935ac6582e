//! Per-depth aggregate analysis of the knowledge gathered so far.

use deepresearch_shared::{KnowledgeId, KnowledgeItem};

/// Produces the insight string enqueued as `"Explore: {insight}"` after each depth.
pub trait InsightStrategy: Send + Sync {
    fn analyze(&self, knowledge: &[(KnowledgeId, KnowledgeItem)]) -> String;
}

/// Entry count plus a fixed list of themes.
#[derive(Debug, Clone)]
pub struct CountInsight {
    themes: String,
}

impl CountInsight {
    pub fn new(themes: impl Into<String>) -> Self {
        Self {
            themes: themes.into(),
        }
    }
}

impl Default for CountInsight {
    fn default() -> Self {
        Self::new("AI disruption, ethics, applications")
    }
}

impl InsightStrategy for CountInsight {
    fn analyze(&self, knowledge: &[(KnowledgeId, KnowledgeItem)]) -> String {
        format!(
            "{} entries analyzed. Emerging themes: {}.",
            knowledge.len(),
            self.themes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_entries() {
        let item = KnowledgeItem {
            title: "t".into(),
            url: String::new(),
            raw_text: "t: s".into(),
            summary: "s".into(),
            cluster_label: None,
            depth: 1,
        };
        let knowledge = vec![(KnowledgeId(1), item.clone()), (KnowledgeId(2), item)];
        assert_eq!(
            CountInsight::default().analyze(&knowledge),
            "2 entries analyzed. Emerging themes: AI disruption, ethics, applications."
        );
        assert_eq!(
            CountInsight::new("x").analyze(&[]),
            "0 entries analyzed. Emerging themes: x."
        );
    }
}
