use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::core::tags::{CodeEvaluator, EvalError, EvalOutput};

/// Client for a snekbox-style sandbox: `POST {"input": source}` answers
/// with `{"stdout": ..., "returncode": ...}`.
pub struct HttpCodeEvaluator {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct EvalRequest<'a> {
    input: &'a str,
}

impl HttpCodeEvaluator {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, EvalError> {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("User-Agent", HeaderValue::from_static("LambdaBot/1.0"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EvalError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl CodeEvaluator for HttpCodeEvaluator {
    async fn evaluate(&self, source: &str) -> Result<EvalOutput, EvalError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&EvalRequest { input: source })
            .send()
            .await
            .map_err(|e| EvalError::Request(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EvalError::Request(
                "the evaluation service is busy, try again later".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(EvalError::InvalidResponse(format!("HTTP {}", status)));
        }

        resp.json::<EvalOutput>()
            .await
            .map_err(|e| EvalError::InvalidResponse(e.to_string()))
    }
}
