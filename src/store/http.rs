//! HTTP-backed [`DestinationStore`].
//!
//! Talks to the headless store's versioned HTTP API:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | query | `GET  /v<ver>/data/query/<dataset>?query=<groq>&$param=<json>` |
//! | create / patch | `POST /v<ver>/data/mutate/<dataset>` |
//! | asset upload | `POST /v<ver>/assets/images/<dataset>?filename=<name>` |
//!
//! All requests carry `Authorization: Bearer <DESTINATION_TOKEN>`.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff
//! - other 4xx → returned to the caller immediately (409 on create is a
//!   slug conflict, not an error)
//! - network errors → retry
//!
//! Retrying a mutation is safe: patches only `set` fields and creations use
//! deterministic ids, so a replay converges on the same document.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::config::{DestinationConfig, TOKEN_ENV};
use crate::models::{
    ArticleField, ArticleRef, AssetHandle, DestinationAuthor, NewAuthor, Transaction, DRAFT_PREFIX,
};
use crate::outcome::{truncate_reason, MAX_REASON_CHARS};

use super::{CreateOutcome, DestinationStore};

const AUTHOR_PROJECTION: &str = r#"{_id, "name": coalesce(name, ""), "slug": slug.current, bio}"#;

fn authors_query() -> String {
    format!(r#"*[_type == "author" && defined(slug.current)]{}"#, AUTHOR_PROJECTION)
}

fn author_by_slug_query() -> String {
    format!(r#"*[_type == "author" && slug.current == $slug][0]{}"#, AUTHOR_PROJECTION)
}

/// Published articles still missing `field`. Drafts share their published
/// article's slug and are left to the editor.
fn missing_field_query(field: ArticleField) -> String {
    format!(
        concat!(
            r#"*[_type == "article" && defined(slug.current) && !defined({field})"#,
            r#" && !(_id in path("{drafts}**"))]{{_id, "slug": slug.current}}"#,
        ),
        field = field.as_str(),
        drafts = DRAFT_PREFIX,
    )
}

#[derive(Deserialize)]
struct QueryResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct UploadResponse {
    document: UploadedDocument,
}

#[derive(Deserialize)]
struct UploadedDocument {
    #[serde(rename = "_id")]
    id: String,
}

pub struct HttpStore {
    client: reqwest::Client,
    base: String,
    dataset: String,
    token: String,
    max_retries: u32,
    backoff: Duration,
}

impl HttpStore {
    /// Build a store client from configuration.
    ///
    /// # Errors
    ///
    /// Fails when the bearer token is missing; that is a configuration
    /// error and must stop the run before any work starts.
    pub fn new(config: &DestinationConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| anyhow!("{} environment variable not set", TOKEN_ENV))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base: config.api_base(),
            dataset: config.dataset.clone(),
            token,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Send a request, retrying on 429, 5xx, and transport errors.
    ///
    /// `build` is called once per attempt because a `RequestBuilder` is
    /// consumed by `send`.
    async fn execute<F>(&self, what: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff * (1u32 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match build().bearer_auth(&self.token).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        warn!(what, %status, attempt, "destination busy, retrying");
                        last_err = Some(anyhow!(
                            "{} failed (HTTP {}): {}",
                            what,
                            status,
                            truncate_reason(&body, MAX_REASON_CHARS)
                        ));
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(what, attempt, error = %e, "destination request failed, retrying");
                    last_err =
                        Some(anyhow::Error::new(e).context(format!("{} request failed", what)));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("{} failed after retries", what)))
    }

    async fn query<T: DeserializeOwned>(&self, groq: &str, params: &[(&str, Value)]) -> Result<T> {
        let url = format!("{}/data/query/{}", self.base, self.dataset);
        let mut pairs: Vec<(String, String)> = vec![("query".to_string(), groq.to_string())];
        for (name, value) in params {
            pairs.push((format!("${}", name), value.to_string()));
        }

        let response = self
            .execute("query", || self.client.get(&url).query(&pairs))
            .await?;
        let response = expect_success(response, "query").await?;
        let body: QueryResponse<T> = response
            .json()
            .await
            .context("Failed to decode query response")?;
        Ok(body.result)
    }

    async fn mutate(&self, what: &str, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/data/mutate/{}", self.base, self.dataset);
        self.execute(what, || self.client.post(&url).json(body)).await
    }
}

async fn expect_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!(
        "{} failed (HTTP {}): {}",
        what,
        status,
        truncate_reason(&body, MAX_REASON_CHARS)
    )
}

/// MIME type for an uploaded image, from its file extension.
fn detect_image_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl DestinationStore for HttpStore {
    async fn list_authors(&self) -> Result<Vec<DestinationAuthor>> {
        self.query(&authors_query(), &[]).await
    }

    async fn find_author_by_slug(&self, slug: &str) -> Result<Option<DestinationAuthor>> {
        self.query(&author_by_slug_query(), &[("slug", Value::from(slug))]).await
    }

    async fn create_author(&self, author: &NewAuthor) -> Result<CreateOutcome> {
        let body = serde_json::json!({ "mutations": [ { "create": author.to_document() } ] });
        let response = self.mutate("create author", &body).await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(CreateOutcome::SlugTaken);
        }
        expect_success(response, "create author").await?;
        Ok(CreateOutcome::Created(author.id.clone()))
    }

    async fn articles_missing(&self, field: ArticleField) -> Result<Vec<ArticleRef>> {
        self.query(&missing_field_query(field), &[]).await
    }

    async fn commit(&self, tx: &Transaction) -> Result<()> {
        let mut body = tx.to_mutations();
        body["transactionId"] = Value::from(uuid::Uuid::new_v4().to_string());
        let response = self.mutate("commit", &body).await?;
        expect_success(response, "commit").await?;
        Ok(())
    }

    async fn upload_image(&self, bytes: Vec<u8>, filename: &str) -> Result<AssetHandle> {
        let url = format!("{}/assets/images/{}", self.base, self.dataset);
        let content_type = detect_image_type(filename);

        let response = self
            .execute("asset upload", || {
                self.client
                    .post(&url)
                    .query(&[("filename", filename)])
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .body(bytes.clone())
            })
            .await?;
        let response = expect_success(response, "asset upload").await?;
        let body: UploadResponse = response
            .json()
            .await
            .context("Failed to decode asset upload response")?;
        Ok(AssetHandle(body.document.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_types_follow_extension() {
        assert_eq!(detect_image_type("cover.JPG"), "image/jpeg");
        assert_eq!(detect_image_type("a.b.webp"), "image/webp");
        assert_eq!(detect_image_type("image"), "application/octet-stream");
    }

    #[test]
    fn missing_query_names_the_field() {
        let q = missing_field_query(ArticleField::MainImage);
        assert!(q.contains("!defined(mainImage)"));
        assert!(q.starts_with(r#"*[_type == "article""#));
        assert!(q.contains(r#"!(_id in path("drafts.**"))"#));
    }

    #[test]
    fn new_requires_token() {
        let cfg = DestinationConfig::default();
        let err = HttpStore::new(&cfg).err().unwrap();
        assert!(err.to_string().contains(TOKEN_ENV));
    }
}
