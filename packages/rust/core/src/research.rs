//! Research collection: keywords mined from real discussions.
//!
//! Two independent tracks run concurrently as search-grounded AI calls.
//! Their results are concatenated forum first, Q&A second, regardless of
//! which finishes first.

use tracing::{info, instrument, warn};

use openkeywords_shared::{
    AiError, AiRequest, AiTask, CandidateKeyword, CompanyContext, KeywordSource,
};

use crate::ai::AiSession;
use crate::generation::KeywordsResponse;
use crate::prompts;

/// Research results plus the tracks that failed.
#[derive(Debug, Clone, Default)]
pub struct ResearchOutcome {
    pub keywords: Vec<CandidateKeyword>,
    pub failures: Vec<(KeywordSource, AiError)>,
}

impl ResearchOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Human-readable summary of failed tracks.
    pub fn failure_reason(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(|(source, err)| format!("{source}: {err}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Keywords requested from each track.
pub fn track_target(target_count: usize) -> usize {
    (target_count / 4).max(1)
}

#[instrument(skip_all, fields(company = %ctx.name, target_count))]
pub async fn collect_research(
    ai: &AiSession,
    ctx: &CompanyContext,
    target_count: usize,
) -> ResearchOutcome {
    let per_track = track_target(target_count);
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();

    let (forum, qa) = tokio::join!(
        run_track(
            ai,
            ctx,
            KeywordSource::ResearchForum,
            prompts::research_forum(ctx, per_track, &today),
        ),
        run_track(
            ai,
            ctx,
            KeywordSource::ResearchQa,
            prompts::research_qa(ctx, per_track, &today),
        ),
    );

    let mut outcome = ResearchOutcome::default();
    for (source, result) in [
        (KeywordSource::ResearchForum, forum),
        (KeywordSource::ResearchQa, qa),
    ] {
        match result {
            Ok(keywords) => outcome.keywords.extend(keywords),
            Err(err) => {
                warn!(%source, error = %err, "research track failed");
                outcome.failures.push((source, err));
            }
        }
    }

    info!(
        keywords = outcome.keywords.len(),
        failed_tracks = outcome.failures.len(),
        "research complete"
    );
    outcome
}

async fn run_track(
    ai: &AiSession,
    ctx: &CompanyContext,
    source: KeywordSource,
    prompt: String,
) -> Result<Vec<CandidateKeyword>, AiError> {
    let request = AiRequest::new(AiTask::Research, prompt)
        .with_schema(prompts::research_schema())
        .with_temperature(0.3)
        .grounded();

    let response: KeywordsResponse = ai.call_typed(request).await?;
    let lang = ctx.language_code();
    Ok(response
        .keywords
        .into_iter()
        .filter_map(|raw| raw.into_candidate(source, &lang))
        .collect())
}
