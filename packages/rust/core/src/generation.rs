//! AI keyword generation from the company context.

use serde::Deserialize;
use tracing::{info, instrument};

use openkeywords_shared::{
    AiError, AiRequest, AiTask, CandidateKeyword, CompanyContext, KeywordSource,
};

use crate::ai::AiSession;
use crate::{intent, prompts};

/// One keyword as the AI returns it, for generation and research alike.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawKeyword {
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub is_question: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub quote: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeywordsResponse {
    #[serde(default)]
    pub keywords: Vec<RawKeyword>,
}

impl RawKeyword {
    /// Validate into a candidate. Blank keywords yield `None`.
    pub(crate) fn into_candidate(
        self,
        source: KeywordSource,
        lang: &str,
    ) -> Option<CandidateKeyword> {
        let keyword = self.keyword.trim();
        if keyword.is_empty() {
            return None;
        }
        let (intent, is_question) =
            intent::resolve(keyword, self.intent.as_deref(), self.is_question, lang);
        Some(CandidateKeyword {
            keyword: keyword.to_string(),
            intent,
            source,
            is_question,
            quote: self.quote.filter(|q| !q.trim().is_empty()),
            url: self.url.filter(|u| !u.trim().is_empty()),
        })
    }
}

/// How many keywords to ask the AI for, given what research supplied.
///
/// Never less than a third of the target, so research cannot crowd out
/// generation entirely.
pub fn generation_target(target_count: usize, research_count: usize) -> usize {
    target_count.saturating_sub(research_count).max(target_count / 3)
}

/// Ask the AI for `target` keywords. A failed call is returned as-is; the
/// orchestrator treats it as fatal.
#[instrument(skip_all, fields(company = %ctx.name, target))]
pub async fn generate_keywords(
    ai: &AiSession,
    ctx: &CompanyContext,
    target: usize,
) -> Result<Vec<CandidateKeyword>, AiError> {
    let request = AiRequest::new(AiTask::Generation, prompts::generation(ctx, target))
        .with_schema(prompts::generation_schema())
        .with_temperature(0.7);

    let response: KeywordsResponse = ai.call_typed(request).await?;
    let lang = ctx.language_code();
    let keywords: Vec<_> = response
        .keywords
        .into_iter()
        .filter_map(|raw| raw.into_candidate(KeywordSource::AiGenerated, &lang))
        .collect();

    info!(generated = keywords.len(), "generation complete");
    Ok(keywords)
}
