use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{KbsyncError, Result};
use super::{Classification, Classifier, IndustrySelection};

/// Request body expected by the classification service
#[derive(Serialize)]
struct ClassifyRequest<'a> {
    company_list: &'a [String],
    industry_list: &'a IndustrySelection,
}

/// Response body: one inner list per requested company
#[derive(Deserialize)]
struct ClassifyResponse {
    body: Vec<Vec<Classification>>,
}

/// HTTP client for the company industry classifier.
///
/// Each call carries a client-side timeout so a hung request only stalls the worker
/// that made it. 429 and 5xx responses are retried with exponential backoff.
pub struct HttpClassifier {
    client: Client,
    url: String,
    industries: IndustrySelection,
    max_retries: usize,
}

impl HttpClassifier {
    pub fn new(url: String, industries: IndustrySelection, timeout: Duration, max_retries: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KbsyncError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            industries,
            max_retries,
        })
    }

    async fn post_once(&self, names: &[String]) -> std::result::Result<Vec<Vec<Classification>>, Attempt> {
        let request = ClassifyRequest {
            company_list: names,
            industry_list: &self.industries,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Attempt::Retryable(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            let message = format!("Classifier error {}: {}", status, body);
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                Attempt::Retryable(message)
            } else {
                Attempt::Fatal(message)
            });
        }

        let parsed: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| Attempt::Fatal(format!("Failed to parse response: {}", e)))?;

        if parsed.body.len() != names.len() {
            return Err(Attempt::Fatal(format!(
                "Expected {} result lists, got {}",
                names.len(),
                parsed.body.len()
            )));
        }

        Ok(parsed.body)
    }
}

enum Attempt {
    Retryable(String),
    Fatal(String),
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify_batch(&self, names: &[String]) -> Result<Vec<Vec<Classification>>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        let mut delay = Duration::from_millis(500);

        loop {
            match self.post_once(names).await {
                Ok(lists) => return Ok(lists),
                Err(Attempt::Retryable(message)) if attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!("Classifier retry {}/{} after error: {}", attempt, self.max_retries, message);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(Attempt::Retryable(message)) | Err(Attempt::Fatal(message)) => {
                    return Err(KbsyncError::ClassificationUnavailable(message));
                }
            }
        }
    }
}
