//! Semantic clustering through a single AI call.
//!
//! The response is joined back to the input by normalized text. Assignment
//! is a pure function of (input, response): members keep input order, the
//! first claiming cluster wins, and same-named clusters merge. Keywords no
//! cluster claims land in the uncategorized bucket.
//!
//! Any failure (call, decode, or a response that does not fit the input)
//! degrades the whole step: every keyword is uncategorized and no clusters
//! are returned.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{info, instrument, warn};

use openkeywords_shared::{
    AiRequest, AiTask, Cluster, ClusteredKeyword, CompanyContext, ScoredKeyword,
};

use crate::ai::AiSession;
use crate::dedup::normalize;
use crate::prompts;

#[derive(Debug, Deserialize)]
struct ClusteringResponse {
    clusters: Vec<RawCluster>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCluster {
    name: String,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Clustered keywords in input order, plus the clusters that partition them.
#[derive(Debug, Clone, Default)]
pub struct ClusteringOutcome {
    pub keywords: Vec<ClusteredKeyword>,
    pub clusters: Vec<Cluster>,
    /// Why clustering fell back to all-uncategorized, if it did.
    pub failure: Option<String>,
}

impl ClusteringOutcome {
    /// Every keyword uncategorized, no clusters.
    pub fn uncategorized(keywords: Vec<ScoredKeyword>, failure: Option<String>) -> Self {
        Self {
            keywords: keywords.into_iter().map(ClusteredKeyword::uncategorized).collect(),
            clusters: Vec::new(),
            failure,
        }
    }
}

pub struct SemanticClusterer<'a> {
    ai: &'a AiSession,
    cluster_count: usize,
}

impl<'a> SemanticClusterer<'a> {
    pub fn new(ai: &'a AiSession, cluster_count: usize) -> Self {
        Self { ai, cluster_count }
    }

    #[instrument(skip_all, fields(keywords = keywords.len(), cluster_count = self.cluster_count))]
    pub async fn cluster(
        &self,
        ctx: &CompanyContext,
        keywords: Vec<ScoredKeyword>,
    ) -> ClusteringOutcome {
        if keywords.is_empty() {
            return ClusteringOutcome::default();
        }

        let texts: Vec<&str> = keywords.iter().map(|k| k.keyword()).collect();
        let request = AiRequest::new(
            AiTask::Clustering,
            prompts::clustering(ctx, &texts, self.cluster_count),
        )
        .with_schema(prompts::clustering_schema())
        .with_temperature(0.3);

        let response = match self.ai.call_typed::<ClusteringResponse>(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "clustering call failed, using uncategorized");
                return ClusteringOutcome::uncategorized(keywords, Some(err.to_string()));
            }
        };

        match assign(&keywords, response.clusters, self.cluster_count) {
            Ok((assignment, clusters)) => {
                let keywords = keywords
                    .into_iter()
                    .zip(assignment)
                    .map(|(scored, cluster_name)| ClusteredKeyword {
                        scored,
                        cluster_name,
                    })
                    .collect::<Vec<_>>();
                let uncategorized = keywords.iter().filter(|k| k.cluster_name.is_none()).count();
                info!(clusters = clusters.len(), uncategorized, "clustering complete");
                ClusteringOutcome {
                    keywords,
                    clusters,
                    failure: None,
                }
            }
            Err(reason) => {
                warn!(%reason, "clustering response rejected, using uncategorized");
                ClusteringOutcome::uncategorized(keywords, Some(reason))
            }
        }
    }
}

/// Map a clustering response onto the input keywords.
///
/// Returns the cluster name per input keyword and the non-empty clusters in
/// order of first appearance.
fn assign(
    keywords: &[ScoredKeyword],
    raw: Vec<RawCluster>,
    cluster_count: usize,
) -> Result<(Vec<Option<String>>, Vec<Cluster>), String> {
    if raw.iter().any(|c| c.name.trim().is_empty()) {
        return Err("response contains a cluster without a name".into());
    }
    let claims: usize = raw.iter().map(|c| c.keywords.len()).sum();
    if claims > keywords.len() {
        return Err(format!(
            "response claims {claims} keywords for {} inputs",
            keywords.len()
        ));
    }

    let mut position: HashMap<String, usize> = HashMap::with_capacity(keywords.len());
    for (i, k) in keywords.iter().enumerate() {
        position.entry(normalize(k.keyword())).or_insert(i);
    }

    // Merge clusters by case-insensitive name, first spelling wins.
    let mut names: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut owner: Vec<Option<usize>> = vec![None; keywords.len()];

    for cluster in raw {
        let name = cluster.name.trim().to_string();
        let id = *by_name.entry(name.to_lowercase()).or_insert_with(|| {
            names.push(name);
            names.len() - 1
        });
        for claim in &cluster.keywords {
            if let Some(&i) = position.get(&normalize(claim)) {
                owner[i].get_or_insert(id);
            }
        }
    }

    let mut members: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    for (i, id) in owner.iter().enumerate() {
        if let Some(id) = id {
            members[*id].push(keywords[i].keyword().to_string());
        }
    }

    let non_empty = members.iter().filter(|m| !m.is_empty()).count();
    let expected = cluster_count.min(keywords.len());
    if non_empty != expected {
        return Err(format!(
            "expected {expected} clusters, response produced {non_empty}"
        ));
    }

    let assignment = owner
        .iter()
        .map(|id| id.map(|id| names[id].clone()))
        .collect();
    let clusters = names
        .into_iter()
        .zip(members)
        .filter(|(_, m)| !m.is_empty())
        .map(|(name, keywords)| Cluster { name, keywords })
        .collect();

    Ok((assignment, clusters))
}
