//! The research loop: depth-by-depth frontier expansion.
//!
//! Each depth selects a prefix of the frontier, searches every selected
//! query, condenses and stores each hit, queues one follow-up per hit
//! (novelty-ranked), then enqueues an `Explore:` query built from the
//! insight strategy and collapses duplicates.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use deepresearch_providers::{
    Condenser, EmbeddingProvider, PageFetcher, SearchProvider, condense_or_identity,
    fetch_or_none, search_or_empty,
};
use deepresearch_shared::{KnowledgeId, KnowledgeItem, ResearchError, Result, RunId, SearchHit};
use deepresearch_storage::KnowledgeStore;

use crate::frontier::Frontier;
use crate::insight::{CountInsight, InsightStrategy};
use crate::report::ResearchReport;
use crate::scorer::SimilarityScorer;

/// Queries taken from the frontier head per depth.
pub const DEFAULT_SELECT_LIMIT: usize = 5;

/// Title characters kept in a follow-up query.
const FOLLOW_UP_CHARS: usize = 50;

/// Parameters of one research run.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    pub topic: String,
    /// Initial frontier, in priority order.
    pub seed_queries: Vec<String>,
    /// Number of depth iterations, at least 1.
    pub max_depth: u32,
    /// Frontier prefix searched per depth.
    pub select_limit: usize,
    /// Rank follow-ups by novelty. Off means insertion order.
    pub ranking: bool,
    /// Condense full page text instead of the search snippet.
    pub fetch_pages: bool,
    /// Where to write the rendered report after the last depth.
    pub report_path: Option<PathBuf>,
    /// Where to write the id → synopsis JSON export after the last depth.
    pub export_path: Option<PathBuf>,
}

impl ResearchConfig {
    pub fn new<I, S>(topic: impl Into<String>, seed_queries: I, max_depth: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topic: topic.into(),
            seed_queries: seed_queries.into_iter().map(Into::into).collect(),
            max_depth,
            select_limit: DEFAULT_SELECT_LIMIT,
            ranking: true,
            fetch_pages: false,
            report_path: None,
            export_path: None,
        }
    }

    /// Reject configurations the loop cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.seed_queries.iter().all(|q| q.trim().is_empty()) {
            return Err(ResearchError::config("at least one non-empty seed query is required"));
        }
        if self.max_depth == 0 {
            return Err(ResearchError::config("max depth must be at least 1"));
        }
        if self.select_limit == 0 {
            return Err(ResearchError::config("select limit must be at least 1"));
        }
        Ok(())
    }
}

/// Progress callback for reporting loop status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a depth begins.
    fn depth_started(&self, depth: u32, max_depth: u32, queries: usize);
    /// Called before each search.
    fn query_started(&self, query: &str);
    /// Called after each knowledge item is persisted.
    fn item_stored(&self, id: KnowledgeId, item: &KnowledgeItem);
    /// Called when the run completes.
    fn done(&self, report: &ResearchReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn depth_started(&self, _depth: u32, _max_depth: u32, _queries: usize) {}
    fn query_started(&self, _query: &str) {}
    fn item_stored(&self, _id: KnowledgeId, _item: &KnowledgeItem) {}
    fn done(&self, _report: &ResearchReport) {}
}

/// Cooperative cancellation flag shared with the caller.
///
/// Checked between depths and between hits; an in-flight provider call is
/// allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// In-memory state owned by one run.
#[derive(Debug, Clone)]
pub struct ResearchSession {
    topic: String,
    max_depth: u32,
    frontier: Frontier,
    knowledge: Vec<(KnowledgeId, KnowledgeItem)>,
    /// Synopsis embeddings, parallel to `knowledge` while ranking is on.
    embeddings: Vec<Vec<f32>>,
}

impl ResearchSession {
    fn new(config: &ResearchConfig) -> Self {
        Self {
            topic: config.topic.clone(),
            max_depth: config.max_depth,
            frontier: Frontier::new(config.seed_queries.iter().cloned()),
            knowledge: Vec::new(),
            embeddings: Vec::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    /// Items stored by this session, in id order.
    pub fn knowledge(&self) -> &[(KnowledgeId, KnowledgeItem)] {
        &self.knowledge
    }

    /// Synopses of this session's items, in id order.
    pub fn synopses(&self) -> Vec<String> {
        self.knowledge
            .iter()
            .map(|(_, item)| item.summary.clone())
            .collect()
    }
}

/// The orchestrator. Holds injected collaborators; each `run` owns its own session.
pub struct Researcher {
    search: Arc<dyn SearchProvider>,
    condenser: Arc<dyn Condenser>,
    store: Arc<dyn KnowledgeStore>,
    scorer: Option<SimilarityScorer>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    insight: Arc<dyn InsightStrategy>,
    cancel: CancelFlag,
}

impl Researcher {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        condenser: Arc<dyn Condenser>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            search,
            condenser,
            store,
            scorer: None,
            fetcher: None,
            insight: Arc::new(CountInsight::default()),
            cancel: CancelFlag::new(),
        }
    }

    /// Enable novelty ranking with `embedder`.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.scorer = Some(SimilarityScorer::new(embedder));
        self
    }

    /// Enable page fetching for runs with `fetch_pages` set.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_insight(mut self, insight: Arc<dyn InsightStrategy>) -> Self {
        self.insight = insight;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for cancelling runs of this researcher.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run the loop to completion and write any configured artifacts.
    ///
    /// Provider failures degrade per call. Store failures and cancellation
    /// end the run with an error; items stored before that stay stored.
    #[instrument(skip_all, fields(topic = %config.topic, max_depth = config.max_depth))]
    pub async fn run(
        &self,
        config: &ResearchConfig,
        progress: &dyn ProgressReporter,
    ) -> Result<ResearchReport> {
        config.validate()?;

        let start = Instant::now();
        let run_id = RunId::new();
        info!(%run_id, seeds = config.seed_queries.len(), "starting research run");
        self.store
            .record_run_start(&run_id, &config.topic, config.max_depth)
            .await?;

        let outcome = self.run_depths(config, run_id.clone(), progress).await;

        let stats = match &outcome {
            Ok(report) => serde_json::json!({
                "status": "completed",
                "entries": report.entries.len(),
                "depths_completed": report.depths_completed,
                "frontier": report.frontier.len(),
                "elapsed_ms": start.elapsed().as_millis() as u64,
            }),
            Err(ResearchError::Cancelled) => serde_json::json!({ "status": "cancelled" }),
            Err(e) => serde_json::json!({ "status": "failed", "error": e.to_string() }),
        };
        let finished = self
            .store
            .record_run_finish(&run_id, &stats.to_string())
            .await;

        let report = outcome?;
        finished?;

        if let Some(path) = &config.report_path {
            report.write_report(path)?;
        }
        if let Some(path) = &config.export_path {
            report.write_export(path)?;
        }

        info!(
            %run_id,
            entries = report.entries.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "research run complete"
        );
        progress.done(&report);
        Ok(report)
    }

    async fn run_depths(
        &self,
        config: &ResearchConfig,
        run_id: RunId,
        progress: &dyn ProgressReporter,
    ) -> Result<ResearchReport> {
        let mut session = ResearchSession::new(config);
        let scorer = if config.ranking {
            self.scorer.as_ref()
        } else {
            None
        };
        let fetcher = if config.fetch_pages {
            self.fetcher.as_deref()
        } else {
            None
        };

        let mut insight = String::new();
        let mut insight_enqueues = 0;
        let mut depths_completed = 0;

        for depth in 1..=config.max_depth {
            self.check_cancelled()?;

            let queries = session.frontier.select(config.select_limit).to_vec();
            info!(depth, queries = queries.len(), frontier = session.frontier.len(), "depth started");
            progress.depth_started(depth, config.max_depth, queries.len());

            for query in &queries {
                self.check_cancelled()?;
                progress.query_started(query);

                let hits = search_or_empty(self.search.as_ref(), query).await;
                debug!(query = %query, hits = hits.len(), "search returned");

                let mut candidates = Vec::with_capacity(hits.len());
                for hit in hits {
                    self.check_cancelled()?;
                    let Some(item) = self.condense_hit(hit, depth, fetcher).await else {
                        continue;
                    };

                    let id = self.store.insert(&item).await?;
                    debug!(%id, depth, "stored knowledge item");
                    progress.item_stored(id, &item);

                    candidates.push(follow_up_query(&item));
                    if let Some(scorer) = scorer {
                        session.embeddings.push(scorer.embed(&item.summary).await);
                    }
                    session.knowledge.push((id, item));
                }

                session
                    .frontier
                    .insert_scored(candidates, &session.embeddings, scorer)
                    .await;
            }

            insight = self.insight.analyze(&session.knowledge);
            session.frontier.push(format!("Explore: {insight}"));
            insight_enqueues += 1;
            session.frontier.dedup();
            depths_completed = depth;

            info!(depth, knowledge = session.knowledge.len(), frontier = session.frontier.len(), "depth complete");
        }

        Ok(ResearchReport {
            run_id,
            topic: session.topic,
            insight,
            entries: session.knowledge,
            depths_completed,
            insight_enqueues,
            frontier: session.frontier.into_vec(),
        })
    }

    /// Build the knowledge item for one hit, or `None` when there is no text.
    async fn condense_hit(
        &self,
        hit: SearchHit,
        depth: u32,
        fetcher: Option<&dyn PageFetcher>,
    ) -> Option<KnowledgeItem> {
        let page_text = match fetcher {
            Some(fetcher) => fetch_or_none(fetcher, &hit.url).await,
            None => None,
        };

        if hit.snippet.trim().is_empty() && page_text.is_none() {
            debug!(title = %hit.title, "skipping hit without snippet");
            return None;
        }

        let raw_text = page_text.unwrap_or_else(|| hit.condense_input());
        let summary = condense_or_identity(self.condenser.as_ref(), &raw_text).await;

        Some(KnowledgeItem {
            title: hit.title,
            url: hit.url,
            raw_text,
            summary,
            cluster_label: None,
            depth,
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!("research run cancelled");
            return Err(ResearchError::Cancelled);
        }
        Ok(())
    }
}

/// `"More on {title}"` with the title cut to 50 characters; the synopsis
/// stands in for an empty title.
pub fn follow_up_query(item: &KnowledgeItem) -> String {
    let source = if item.title.trim().is_empty() {
        item.summary.trim()
    } else {
        item.title.trim()
    };
    let head: String = source.chars().take(FOLLOW_UP_CHARS).collect();
    format!("More on {}", head.trim_end())
}
