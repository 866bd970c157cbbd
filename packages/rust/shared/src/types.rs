//! Core domain types for OpenKeywords runs.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel cluster label for keywords no cluster claimed.
pub const UNCATEGORIZED: &str = "Uncategorized";

// ---------------------------------------------------------------------------
// JobId / JobStatus
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline job identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle of a pipeline job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CompanyContext
// ---------------------------------------------------------------------------

/// Immutable snapshot of what a company sells and to whom.
///
/// Produced once per run by an external analysis step (or a company file)
/// and shared read-only by every stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyContext {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub products: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub differentiators: Vec<String>,
    /// ISO 3166-1 alpha-2 market code, e.g. `us`.
    #[serde(default = "default_region")]
    pub region: String,
    /// Language code, e.g. `en`.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_region() -> String {
    "us".into()
}
fn default_language() -> String {
    "en".into()
}

impl CompanyContext {
    /// Two-letter lowercase language code used for pattern lookups.
    pub fn language_code(&self) -> String {
        self.language.trim().to_lowercase().chars().take(2).collect()
    }
}

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

/// Search intent of a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Transactional,
    Commercial,
    Informational,
    Question,
    Comparison,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Self::Transactional,
        Self::Commercial,
        Self::Informational,
        Self::Question,
        Self::Comparison,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transactional => "transactional",
            Self::Commercial => "commercial",
            Self::Informational => "informational",
            Self::Question => "question",
            Self::Comparison => "comparison",
        }
    }

    /// Case-insensitive parse of an intent label. Returns `None` for
    /// anything outside the five known intents.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a candidate keyword came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordSource {
    AiGenerated,
    ResearchForum,
    ResearchQa,
}

impl KeywordSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AiGenerated => "ai_generated",
            Self::ResearchForum => "research_forum",
            Self::ResearchQa => "research_qa",
        }
    }
}

impl fmt::Display for KeywordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unscored search phrase proposed by generation or research.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateKeyword {
    pub keyword: String,
    pub intent: Intent,
    pub source: KeywordSource,
    #[serde(default)]
    pub is_question: bool,
    /// Verbatim quote from the discussion the keyword was mined from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    /// URL of that discussion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CandidateKeyword {
    pub fn new(keyword: impl Into<String>, intent: Intent, source: KeywordSource) -> Self {
        Self {
            keyword: keyword.into(),
            intent,
            source,
            is_question: intent == Intent::Question,
            quote: None,
            url: None,
        }
    }

    /// Number of whitespace-separated words.
    pub fn word_count(&self) -> usize {
        self.keyword.split_whitespace().count()
    }
}

/// Search metrics attached by an enrichment source. Defaults mean
/// "not looked up".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMetrics {
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub difficulty: u8,
    /// Monthly search volumes, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trend: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_keywords: Vec<String>,
    #[serde(default)]
    pub has_featured_snippet: bool,
    #[serde(default)]
    pub has_paa: bool,
}

/// A candidate with its company-fit score (0..=100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredKeyword {
    #[serde(flatten)]
    pub candidate: CandidateKeyword,
    pub score: u8,
    #[serde(flatten, default)]
    pub metrics: KeywordMetrics,
}

impl ScoredKeyword {
    pub fn new(candidate: CandidateKeyword, score: u8) -> Self {
        Self {
            candidate,
            score,
            metrics: KeywordMetrics::default(),
        }
    }

    pub fn keyword(&self) -> &str {
        &self.candidate.keyword
    }
}

/// Terminal keyword entity returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteredKeyword {
    #[serde(flatten)]
    pub scored: ScoredKeyword,
    /// `None` places the keyword in the uncategorized bucket.
    #[serde(default)]
    pub cluster_name: Option<String>,
}

impl ClusteredKeyword {
    pub fn uncategorized(scored: ScoredKeyword) -> Self {
        Self {
            scored,
            cluster_name: None,
        }
    }

    pub fn keyword(&self) -> &str {
        self.scored.keyword()
    }

    pub fn score(&self) -> u8 {
        self.scored.score
    }

    /// Display label: the cluster name or [`UNCATEGORIZED`].
    pub fn cluster_label(&self) -> &str {
        self.cluster_name.as_deref().unwrap_or(UNCATEGORIZED)
    }
}

/// A named, non-overlapping group of keyword texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub keywords: Vec<String>,
}

impl Cluster {
    pub fn count(&self) -> usize {
        self.keywords.len()
    }
}

// ---------------------------------------------------------------------------
// Stage outcomes
// ---------------------------------------------------------------------------

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    Generation,
    Deduplication,
    Scoring,
    Enrichment,
    Filtering,
    Clustering,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Generation => "generation",
            Self::Deduplication => "deduplication",
            Self::Scoring => "scoring",
            Self::Enrichment => "enrichment",
            Self::Filtering => "filtering",
            Self::Clustering => "clustering",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    /// The AI-dependent step failed and a documented fallback was used.
    Degraded,
    Failed,
    /// Optional stage disabled by configuration.
    Skipped,
}

/// Outcome of one stage within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StageOutcome {
    pub fn success(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Success,
            reason: None,
        }
    }

    pub fn degraded(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Degraded,
            reason: Some(reason.into()),
        }
    }

    pub fn failed(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            reason: Some(reason.into()),
        }
    }

    pub fn skipped(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            reason: Some(reason.into()),
        }
    }
}
