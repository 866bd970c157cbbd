//! HTTP collaborators for the keyword pipeline.
//!
//! [`GeminiClient`] implements the AI Capability on top of the Gemini
//! `generateContent` endpoint, with optional Google Search grounding.
//! [`SeRankingClient`] implements the keyword metrics source on top of the
//! SE Ranking volume API.

mod gemini;
mod json;
mod seranking;

use openkeywords_shared::{OpenKeywordsError, Result};
use reqwest::Client;

pub use gemini::{GeminiClient, GeminiOptions};
pub use json::extract_json;
pub use seranking::{SeRankingClient, SeRankingOptions, region_id};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("OpenKeywords/", env!("CARGO_PKG_VERSION"));

/// Build a reqwest client shared by one provider. Deadlines are set per
/// request since grounded and plain calls differ.
fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .map_err(|e| OpenKeywordsError::Network(format!("failed to build HTTP client: {e}")))
}

fn trim_base(base: &str) -> &str {
    base.trim_end_matches('/')
}
