//! HTTP client for a remote vision analysis endpoint

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Serialize;
use soulbrowser_core_types::{ActionKind, BoundingBox, LocatorHint};

use crate::errors::HealError;
use crate::providers::RemoteAnalyzer;
use crate::types::{AnalysisQuery, AnalysisResult, Snapshot};

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    image: String,
    mime: &'a str,
    width: u32,
    height: u32,
    target_label: &'a str,
    element_kind: ActionKind,
    expected_bounds: Option<BoundingBox>,
    hints: &'a [LocatorHint],
}

pub struct HttpVisionAnalyzer {
    client: Client,
    endpoint: String,
    api_key: RwLock<Option<String>>,
}

impl HttpVisionAnalyzer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, HealError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| HealError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: RwLock::new(None),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body<'a>(snapshot: &'a Snapshot, query: &'a AnalysisQuery) -> AnalyzeRequest<'a> {
        AnalyzeRequest {
            image: STANDARD.encode(&snapshot.bytes),
            mime: &snapshot.mime,
            width: snapshot.width,
            height: snapshot.height,
            target_label: &query.target_label,
            element_kind: query.element_kind,
            expected_bounds: query.expected_bounds,
            hints: &query.hints,
        }
    }
}

#[async_trait]
impl RemoteAnalyzer for HttpVisionAnalyzer {
    /// Usable once credentials are set.
    async fn is_available(&self) -> bool {
        self.api_key.read().is_some()
    }

    async fn analyze(
        &self,
        snapshot: &Snapshot,
        query: &AnalysisQuery,
    ) -> Result<AnalysisResult, HealError> {
        let api_key = self
            .api_key
            .read()
            .clone()
            .ok_or_else(|| HealError::provider("remote_vision", "missing API key"))?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&Self::body(snapshot, query))
            .send()
            .await
            .map_err(|err| HealError::Transport(format!("vision request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(HealError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<AnalysisResult>()
            .await
            .map_err(|err| HealError::Decode(err.to_string()))
    }

    fn set_api_key(&self, api_key: Option<String>) {
        *self.api_key.write() = api_key.filter(|key| !key.trim().is_empty());
    }
}
