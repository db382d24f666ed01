
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use super::{IndexedPoint, PointPayload, filter_valid_ids, validate_points};
use crate::config::VectorStoreConfig;
use crate::http::{self, HttpResponse, JsonMethod, run_blocking};
use crate::{RagError, Result};

/// Qdrant collection reached through its REST API
#[derive(Debug, Clone)]
pub struct QdrantStore {
    base_url: String,
    collection: String,
    dimension: usize,
    score_threshold: Option<f32>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct UpsertPoint<'a> {
    id: &'a str,
    vector: &'a [f32],
    payload: &'a PointPayload,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    top: usize,
    with_payload: bool,
    with_vector: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    payload: Option<PointPayload>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

impl QdrantStore {
    #[inline]
    pub fn new(config: &VectorStoreConfig, dimension: usize) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            dimension,
            score_threshold: (config.score_threshold > 0.0).then_some(config.score_threshold),
            agent: http::build_agent(Duration::from_secs(config.timeout_secs)),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub async fn ensure_collection(&self) -> Result<bool> {
        let url = self.collection_url("");
        let response = self.get(url.clone()).await?;

        match response.status {
            404 => {
                let body = json!({
                    "vectors": { "size": self.dimension, "distance": "Cosine" }
                });
                let created = self.send(JsonMethod::Put, url, body.to_string()).await?;
                expect_success(created)?;
                info!(
                    "Created Qdrant collection '{}' ({} dimensions, cosine)",
                    self.collection, self.dimension
                );
                Ok(true)
            }
            _ => {
                expect_success(response)?;
                debug!("Qdrant collection '{}' already exists", self.collection);
                Ok(false)
            }
        }
    }

    #[inline]
    pub async fn add_documents(&self, points: &[IndexedPoint]) -> Result<()> {
        if points.is_empty() {
            debug!("No points to upsert");
            return Ok(());
        }
        validate_points(points, self.dimension)?;

        let body = json!({
            "points": points
                .iter()
                .map(|p| UpsertPoint {
                    id: &p.id,
                    vector: &p.vector,
                    payload: &p.payload,
                })
                .collect::<Vec<_>>()
        });

        let url = self.collection_url("/points?wait=true");
        let response = self.send(JsonMethod::Put, url, body.to_string()).await?;
        expect_success(response)?;

        debug!(
            "Upserted {} points into '{}'",
            points.len(),
            self.collection
        );
        Ok(())
    }

    #[inline]
    pub async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<IndexedPoint>> {
        let request = SearchRequest {
            vector: query_vector,
            top: top_k,
            with_payload: true,
            with_vector: false,
            score_threshold: self.score_threshold,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| RagError::vector_store(format!("Failed to serialize search: {}", e)))?;

        let url = self.collection_url("/points/search");
        let response = expect_success(self.send(JsonMethod::Post, url, body).await?)?;
        let parsed: QdrantResponse<Vec<ScoredPoint>> = parse_body(&response)?;

        let mut points: Vec<IndexedPoint> = parsed.result.into_iter().map(into_point).collect();
        points.truncate(top_k);

        debug!("Search returned {} points", points.len());
        Ok(points)
    }

    #[inline]
    pub async fn fetch_existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        let ids = filter_valid_ids(ids);
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let body = json!({ "ids": ids, "with_payload": false, "with_vector": false });
        let url = self.collection_url("/points");
        let response = self.send(JsonMethod::Post, url, body.to_string()).await?;

        if response.status == 404 {
            debug!("Collection '{}' not found, no ids exist", self.collection);
            return Ok(HashSet::new());
        }

        let response = expect_success(response)?;
        let parsed: QdrantResponse<Vec<ScoredPoint>> = parse_body(&response)?;

        Ok(parsed.result.into_iter().map(|p| id_to_string(p.id)).collect())
    }

    #[inline]
    pub async fn clear(&self) -> Result<()> {
        let url = self.collection_url("/points/delete?wait=true");
        let body = json!({ "filter": {} });
        expect_success(self.send(JsonMethod::Post, url, body.to_string()).await?)?;

        info!("Cleared all points from '{}'", self.collection);
        Ok(())
    }

    #[inline]
    pub async fn count(&self) -> Result<u64> {
        let url = self.collection_url("/points/count");
        let body = json!({ "exact": true });
        let response = self.send(JsonMethod::Post, url, body.to_string()).await?;

        if response.status == 404 {
            return Ok(0);
        }

        let response = expect_success(response)?;
        let parsed: QdrantResponse<CountResult> = parse_body(&response)?;
        Ok(parsed.result.count)
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    async fn send(&self, method: JsonMethod, url: String, body: String) -> Result<HttpResponse> {
        let agent = self.agent.clone();
        run_blocking(move || {
            http::send_json(&agent, method, &url, &body).map_err(|e| {
                RagError::vector_store(format!("Request to {} failed: {}", url, e))
            })
        })
        .await
    }

    async fn get(&self, url: String) -> Result<HttpResponse> {
        let agent = self.agent.clone();
        run_blocking(move || {
            http::get(&agent, &url).map_err(|e| {
                RagError::vector_store(format!("Request to {} failed: {}", url, e))
            })
        })
        .await
    }
}

fn expect_success(response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(RagError::VectorStore {
            status: Some(response.status),
            message: response.body,
        })
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_str(&response.body).map_err(|e| RagError::VectorStore {
        status: Some(response.status),
        message: format!("Invalid Qdrant response: {}", e),
    })
}

fn id_to_string(id: Value) -> String {
    match id {
        Value::String(id) => id,
        other => other.to_string(),
    }
}

fn into_point(scored: ScoredPoint) -> IndexedPoint {
    IndexedPoint {
        id: id_to_string(scored.id),
        vector: Vec::new(),
        payload: scored.payload.unwrap_or_default(),
        score: scored.score,
    }
}
