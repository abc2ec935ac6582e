//! Core research engine for DeepResearch.
//!
//! This crate ties together search, condensation, storage, and novelty
//! scoring into the depth-iterated research loop ([`Researcher::run`]),
//! plus the post-run grouping step ([`cluster_store`]).

pub mod cluster;
pub mod frontier;
pub mod insight;
pub mod report;
pub mod research;
pub mod scorer;

pub use cluster::{Clusters, KMeans, cluster_store, cluster_summaries, save_clusters};
pub use frontier::Frontier;
pub use insight::{CountInsight, InsightStrategy};
pub use report::ResearchReport;
pub use research::{
    CancelFlag, DEFAULT_SELECT_LIMIT, ProgressReporter, ResearchConfig, ResearchSession,
    Researcher, SilentProgress, follow_up_query,
};
pub use scorer::{SimilarityScorer, cosine_similarity, novelty};
