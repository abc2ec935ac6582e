//! Report rendering and on-disk artifacts of a research run.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use deepresearch_shared::{KnowledgeId, KnowledgeItem, ResearchError, Result, RunId};

/// Outcome of one research run.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchReport {
    pub run_id: RunId,
    pub topic: String,
    /// Insight computed at the last depth.
    pub insight: String,
    /// Items stored by this run, in id order.
    pub entries: Vec<(KnowledgeId, KnowledgeItem)>,
    pub depths_completed: u32,
    /// How many times an `Explore:` query was enqueued.
    pub insight_enqueues: u32,
    /// Frontier after the final collapse.
    pub frontier: Vec<String>,
}

impl ResearchReport {
    /// Human-readable report: topic, insight, numbered synopses.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Research Report on: {}", self.topic);
        let _ = writeln!(out, "---");
        let _ = writeln!(out, "## Insights");
        let _ = writeln!(out, "{}", self.insight);
        let _ = writeln!(out);
        let _ = writeln!(out, "## Knowledge Base");
        for (n, (_, item)) in self.entries.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", n + 1, item.summary);
        }
        out
    }

    /// Id → synopsis mapping, ordered by id.
    pub fn export_map(&self) -> BTreeMap<KnowledgeId, &str> {
        self.entries
            .iter()
            .map(|(id, item)| (*id, item.summary.as_str()))
            .collect()
    }

    /// Write [`ResearchReport::render`] to `path`, replacing any existing file.
    pub fn write_report(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.render())?;
        info!(path = %path.display(), entries = self.entries.len(), "report saved");
        Ok(())
    }

    /// Write the id → synopsis mapping as pretty JSON, replacing any existing file.
    pub fn write_export(&self, path: &Path) -> Result<()> {
        write_json(path, &self.export_map())?;
        info!(path = %path.display(), entries = self.entries.len(), "knowledge export saved");
        Ok(())
    }
}

/// Write a JSON file (pretty-printed).
pub(crate) fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| ResearchError::validation(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, &json)
}

/// Write through a sibling temp file and rename over the target.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ResearchError::io(parent, e))?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ResearchError::validation(format!("not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| ResearchError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| ResearchError::io(path, e))?;

    debug!(path = %path.display(), size = content.len(), "wrote file");
    Ok(())
}
