//! WordPress REST source.
//!
//! [`SourceClient`] owns the HTTP client (declared user-agent, per-request
//! timeout) and hands out [`Paginator`]s over list endpoints plus one-off
//! media lookups.
//!
//! # Pagination
//!
//! A [`Paginator`] requests one page per call to
//! [`next_page`](Paginator::next_page) and ends the sequence on the first
//! of: non-success status, undecodable payload, empty page, transport error,
//! the configured page cap, or the `X-WP-TotalPages` bound. Failures are
//! logged and end the walk; they never surface as errors, so callers keep
//! whatever pages they already received.

use anyhow::Result;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::models::{MediaItem, SourceRecord, SourceUser};

const POST_FIELDS: &str = "slug,author,featured_media,_links,_embedded";

#[derive(Clone)]
pub struct SourceClient {
    http: reqwest::Client,
    base_url: String,
    per_page: u32,
    max_pages: u32,
    page_delay: Duration,
}

impl SourceClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            per_page: config.per_page,
            max_pages: config.max_pages,
            page_delay: Duration::from_millis(config.page_delay_ms),
        })
    }

    /// The underlying client, shared with the asset transcoder so binary
    /// fetches carry the same user-agent and timeout.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Posts with their embedded author.
    pub fn posts(&self) -> Paginator<SourceRecord> {
        Paginator::new(
            self.clone(),
            "posts",
            vec![
                ("_fields".to_string(), POST_FIELDS.to_string()),
                ("_embed".to_string(), "author".to_string()),
            ],
        )
    }

    /// Users, for the author-name cache.
    pub fn users(&self) -> Paginator<SourceUser> {
        Paginator::new(
            self.clone(),
            "users",
            vec![("_fields".to_string(), "id,name".to_string())],
        )
    }

    /// Look up a media item. `None` means the id did not resolve, for any reason.
    pub async fn fetch_media(&self, id: u64) -> Option<MediaItem> {
        let url = format!("{}/media/{}", self.base_url, id);
        let response = match self
            .http
            .get(&url)
            .query(&[("_fields", "source_url,media_details")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(media_id = id, error = %e, "media lookup failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(media_id = id, %status, "media lookup returned non-success");
            return None;
        }

        match response.json::<MediaItem>().await {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(media_id = id, error = %e, "media payload did not decode");
                None
            }
        }
    }
}

/// Lazy, finite walk over a paginated list endpoint.
pub struct Paginator<T> {
    client: SourceClient,
    endpoint: &'static str,
    extra_query: Vec<(String, String)>,
    next_page: u32,
    total_pages: Option<u32>,
    finished: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Paginator<T> {
    fn new(
        client: SourceClient,
        endpoint: &'static str,
        extra_query: Vec<(String, String)>,
    ) -> Self {
        Self {
            client,
            endpoint,
            extra_query,
            next_page: 1,
            total_pages: None,
            finished: false,
            _record: PhantomData,
        }
    }

    /// Number of pages successfully yielded so far.
    pub fn pages_fetched(&self) -> u32 {
        self.next_page - 1
    }

    /// Fetch the next page, or `None` once the walk is over.
    pub async fn next_page(&mut self) -> Option<Vec<T>> {
        if self.finished {
            return None;
        }

        let page = self.next_page;
        let capped = self.client.max_pages > 0 && page > self.client.max_pages;
        let past_total = self.total_pages.is_some_and(|total| page > total);
        if capped || past_total {
            self.finished = true;
            return None;
        }

        if page > 1 && !self.client.page_delay.is_zero() {
            tokio::time::sleep(self.client.page_delay).await;
        }

        let url = format!("{}/{}", self.client.base_url, self.endpoint);
        let response = match self
            .client
            .http
            .get(&url)
            .query(&[
                ("per_page", self.client.per_page.to_string()),
                ("page", page.to_string()),
            ])
            .query(&self.extra_query)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    endpoint = self.endpoint,
                    page,
                    error = %e,
                    "source request failed, stopping"
                );
                return self.finish();
            }
        };

        let status = response.status();
        if !status.is_success() {
            // WordPress answers 400 rest_post_invalid_page_number one page past the end.
            info!(endpoint = self.endpoint, page, %status, "source returned non-success, stopping");
            return self.finish();
        }

        if let Some(total) = response
            .headers()
            .get("x-wp-totalpages")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
        {
            self.total_pages = Some(total);
        }

        let records: Vec<T> = match response.json().await {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    endpoint = self.endpoint,
                    page,
                    error = %e,
                    "source page did not decode, stopping"
                );
                return self.finish();
            }
        };

        if records.is_empty() {
            debug!(endpoint = self.endpoint, page, "empty page, stopping");
            return self.finish();
        }

        self.next_page += 1;
        debug!(endpoint = self.endpoint, page, count = records.len(), "fetched page");
        Some(records)
    }

    fn finish(&mut self) -> Option<Vec<T>> {
        self.finished = true;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn config_for(server: &Server) -> SourceConfig {
        SourceConfig {
            base_url: server.url(),
            user_agent: "press-sync-test/1.0".to_string(),
            per_page: 2,
            max_pages: 0,
            page_delay_ms: 0,
            timeout_secs: 5,
        }
    }

    fn page(n: u32) -> Matcher {
        Matcher::UrlEncoded("page".into(), n.to_string())
    }

    #[tokio::test]
    async fn walks_until_empty_page() {
        let mut server = Server::new_async().await;
        let p1 = server
            .mock("GET", "/posts")
            .match_query(page(1))
            .match_header("user-agent", "press-sync-test/1.0")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"slug":"a","featured_media":5},{"slug":"b"}]"#)
            .create_async()
            .await;
        let p2 = server
            .mock("GET", "/posts")
            .match_query(page(2))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = SourceClient::new(&config_for(&server)).unwrap();
        let mut posts = client.posts();

        let first = posts.next_page().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].slug, "a");
        assert!(posts.next_page().await.is_none());
        assert!(posts.next_page().await.is_none());
        assert_eq!(posts.pages_fetched(), 1);

        p1.assert_async().await;
        p2.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_ends_the_walk() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/posts")
            .match_query(page(1))
            .with_status(400)
            .with_body(r#"{"code":"rest_post_invalid_page_number"}"#)
            .create_async()
            .await;

        let client = SourceClient::new(&config_for(&server)).unwrap();
        let mut posts = client.posts();
        assert!(posts.next_page().await.is_none());
    }

    #[tokio::test]
    async fn malformed_payload_ends_the_walk() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/posts")
            .match_query(page(1))
            .with_status(200)
            .with_body(r#"{"not":"a list"}"#)
            .create_async()
            .await;

        let client = SourceClient::new(&config_for(&server)).unwrap();
        assert!(client.posts().next_page().await.is_none());
    }

    #[tokio::test]
    async fn max_pages_caps_requests() {
        let mut server = Server::new_async().await;
        let p1 = server
            .mock("GET", "/posts")
            .match_query(page(1))
            .with_status(200)
            .with_body(r#"[{"slug":"a"}]"#)
            .create_async()
            .await;
        let p2 = server
            .mock("GET", "/posts")
            .match_query(page(2))
            .with_status(200)
            .with_body(r#"[{"slug":"b"}]"#)
            .expect(0)
            .create_async()
            .await;

        let mut cfg = config_for(&server);
        cfg.max_pages = 1;
        let client = SourceClient::new(&cfg).unwrap();
        let mut posts = client.posts();
        assert!(posts.next_page().await.is_some());
        assert!(posts.next_page().await.is_none());

        p1.assert_async().await;
        p2.assert_async().await;
    }

    #[tokio::test]
    async fn total_pages_header_stops_without_extra_request() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/users")
            .match_query(page(1))
            .with_status(200)
            .with_header("X-WP-TotalPages", "1")
            .with_body(r#"[{"id":3,"name":"Jane Doe"}]"#)
            .create_async()
            .await;
        let p2 = server
            .mock("GET", "/users")
            .match_query(page(2))
            .with_status(200)
            .with_body("[]")
            .expect(0)
            .create_async()
            .await;

        let client = SourceClient::new(&config_for(&server)).unwrap();
        let mut users = client.users();
        let first = users.next_page().await.unwrap();
        assert_eq!(first[0].name, "Jane Doe");
        assert!(users.next_page().await.is_none());
        p2.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_media_is_none() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/media/99")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"code":"rest_post_invalid_id"}"#)
            .create_async()
            .await;

        let client = SourceClient::new(&config_for(&server)).unwrap();
        assert!(client.fetch_media(99).await.is_none());
    }
}
