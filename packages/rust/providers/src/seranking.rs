//! SE Ranking keyword volume client implementing [`KeywordMetricsSource`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use openkeywords_shared::{
    KeywordMetrics, KeywordMetricsSource, MetricsError, Result, SeRankingConfig,
};

use crate::{build_client, trim_base};

/// Keywords per batch request.
const BATCH_SIZE: usize = 100;

/// Region id used when a region code is not mapped.
const DEFAULT_REGION_ID: u32 = 2840;

/// Map a two-letter region code to an SE Ranking region id.
pub fn region_id(region: &str) -> u32 {
    match region.to_ascii_lowercase().as_str() {
        "us" => 2840,
        "uk" | "gb" => 2826,
        "de" => 2276,
        "fr" => 2250,
        "es" => 2724,
        "it" => 2380,
        "nl" => 2528,
        "au" => 2036,
        "ca" => 2124,
        "br" => 2076,
        "in" => 2356,
        "jp" => 2392,
        _ => DEFAULT_REGION_ID,
    }
}

#[derive(Debug, Clone)]
pub struct SeRankingOptions {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Pause between consecutive batch requests.
    pub batch_pause: Duration,
}

impl SeRankingOptions {
    pub fn from_config(config: &SeRankingConfig, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            batch_pause: Duration::from_millis(500),
        }
    }
}

pub struct SeRankingClient {
    http: Client,
    opts: SeRankingOptions,
}

#[derive(Debug, Deserialize)]
struct VolumeItem {
    #[serde(default)]
    keyword: String,
    #[serde(default)]
    search_volume: Option<u64>,
    #[serde(default)]
    difficulty: Option<f64>,
}

impl VolumeItem {
    /// Items without a volume carry no data for the keyword.
    fn into_metrics(self) -> Option<KeywordMetrics> {
        let volume = self.search_volume?;
        Some(KeywordMetrics {
            volume,
            difficulty: self.difficulty.unwrap_or_default().round().clamp(0.0, 100.0) as u8,
            ..KeywordMetrics::default()
        })
    }
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    data: Vec<VolumeItem>,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    keywords: &'a [String],
    region_id: u32,
}

impl SeRankingClient {
    pub fn new(opts: SeRankingOptions) -> Result<Self> {
        Ok(Self {
            http: build_client()?,
            opts,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", trim_base(&self.opts.base_url))
    }

    fn auth(&self) -> String {
        format!("Token {}", self.opts.api_key)
    }

    async fn fetch_batch(
        &self,
        keywords: &[String],
        region_id: u32,
    ) -> std::result::Result<HashMap<String, KeywordMetrics>, MetricsError> {
        let response = self
            .http
            .post(self.url("/keywords/volume/batch"))
            .header("Authorization", self.auth())
            .timeout(self.opts.timeout)
            .json(&BatchRequest {
                keywords,
                region_id,
            })
            .send()
            .await
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?;

        let body: BatchResponse = read_json(response).await?;
        Ok(body
            .data
            .into_iter()
            .filter_map(|item| {
                let key = item.keyword.trim().to_lowercase();
                item.into_metrics().map(|m| (key, m))
            })
            .collect())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: Response,
) -> std::result::Result<T, MetricsError> {
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => Err(MetricsError::RateLimited),
        StatusCode::NOT_FOUND => Err(MetricsError::NotFound),
        status if !status.is_success() => {
            Err(MetricsError::Unavailable(format!("HTTP {status}")))
        }
        _ => response
            .json()
            .await
            .map_err(|e| MetricsError::Unavailable(format!("bad response body: {e}"))),
    }
}

#[async_trait]
impl KeywordMetricsSource for SeRankingClient {
    #[instrument(skip(self))]
    async fn lookup(
        &self,
        keyword: &str,
        region: &str,
        _language: &str,
    ) -> std::result::Result<KeywordMetrics, MetricsError> {
        let response = self
            .http
            .get(self.url("/keywords/volume"))
            .header("Authorization", self.auth())
            .query(&[
                ("keyword", keyword.to_string()),
                ("region_id", region_id(region).to_string()),
            ])
            .timeout(self.opts.timeout)
            .send()
            .await
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?;

        let item: VolumeItem = read_json(response).await?;
        item.into_metrics().ok_or(MetricsError::NotFound)
    }

    #[instrument(skip_all, fields(keywords = keywords.len(), region = %region))]
    async fn lookup_many(
        &self,
        keywords: &[String],
        region: &str,
        _language: &str,
    ) -> Vec<std::result::Result<KeywordMetrics, MetricsError>> {
        let region_id = region_id(region);
        let mut out = Vec::with_capacity(keywords.len());

        for (i, batch) in keywords.chunks(BATCH_SIZE).enumerate() {
            if i > 0 && !self.opts.batch_pause.is_zero() {
                tokio::time::sleep(self.opts.batch_pause).await;
            }
            match self.fetch_batch(batch, region_id).await {
                Ok(mut found) => out.extend(batch.iter().map(|k| {
                    found
                        .remove(&k.trim().to_lowercase())
                        .ok_or(MetricsError::NotFound)
                })),
                Err(e) => {
                    warn!(error = %e, batch = i, "SE Ranking batch failed");
                    out.extend(batch.iter().map(|_| Err(e.clone())));
                }
            }
        }

        let found = out.iter().filter(|r| r.is_ok()).count();
        info!(found, total = keywords.len(), "SE Ranking volumes fetched");
        out
    }
}
