//! Keyword metrics source: the optional enrichment collaborator.

use async_trait::async_trait;

use crate::error::MetricsError;
use crate::types::KeywordMetrics;

/// Supplies search volume, difficulty and SERP data for keywords.
#[async_trait]
pub trait KeywordMetricsSource: Send + Sync {
    /// Look up a single keyword.
    async fn lookup(
        &self,
        keyword: &str,
        region: &str,
        language: &str,
    ) -> Result<KeywordMetrics, MetricsError>;

    /// Look up many keywords. Results are positional.
    ///
    /// The default calls [`lookup`](Self::lookup) once per keyword. Sources
    /// with a batch endpoint should override it.
    async fn lookup_many(
        &self,
        keywords: &[String],
        region: &str,
        language: &str,
    ) -> Vec<Result<KeywordMetrics, MetricsError>> {
        let mut out = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            out.push(self.lookup(keyword, region, language).await);
        }
        out
    }
}
