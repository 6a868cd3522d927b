//! Asset transcoding: fetch an image from the source, upload it to the
//! destination, hand back the asset handle.
//!
//! Nothing here is fatal. A non-success fetch, a transport error, or an
//! upload rejection all become a [`SkipReason`] so the caller counts the
//! record and moves on.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::AssetHandle;
use crate::outcome::{truncate_reason, SkipReason, MAX_REASON_CHARS};
use crate::store::DestinationStore;

/// Filename used when the URL has no usable last segment.
pub const GENERIC_FILENAME: &str = "image";

pub struct AssetTranscoder {
    http: reqwest::Client,
    store: Arc<dyn DestinationStore>,
}

impl AssetTranscoder {
    /// `http` should be the source client so fetches carry its user-agent.
    pub fn new(http: reqwest::Client, store: Arc<dyn DestinationStore>) -> Self {
        Self { http, store }
    }

    pub async fn transcode(&self, image_url: &str) -> Result<AssetHandle, SkipReason> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await
            .map_err(|e| SkipReason::AssetFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SkipReason::AssetFetch(format!("HTTP {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SkipReason::AssetFetch(e.to_string()))?;

        let filename = filename_from_url(image_url);
        debug!(url = image_url, %filename, size = bytes.len(), "uploading asset");

        match self.store.upload_image(bytes.to_vec(), &filename).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                let reason = truncate_reason(&format!("{:#}", e), MAX_REASON_CHARS);
                warn!(url = image_url, %reason, "asset upload failed");
                Err(SkipReason::AssetUpload(reason))
            }
        }
    }
}

/// Last path segment of `url`, without query string or fragment.
pub fn filename_from_url(url: &str) -> String {
    let segment = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        Err(_) => url
            .split(|c| c == '?' || c == '#')
            .next()
            .and_then(|path| path.rsplit('/').next())
            .map(str::to_string),
    };

    segment
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| GENERIC_FILENAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use mockito::Server;

    #[test]
    fn filename_strips_query() {
        assert_eq!(
            filename_from_url("https://x/wp-content/uploads/2021/03/cover.jpg?resize=300%2C200"),
            "cover.jpg"
        );
    }

    #[test]
    fn filename_falls_back_when_empty() {
        assert_eq!(filename_from_url("https://x/"), GENERIC_FILENAME);
        assert_eq!(filename_from_url("https://x"), GENERIC_FILENAME);
    }

    #[test]
    fn filename_from_unparseable_url() {
        assert_eq!(filename_from_url("uploads/pic.png?x=1#top"), "pic.png");
        assert_eq!(filename_from_url("uploads/?x=1"), GENERIC_FILENAME);
    }

    #[tokio::test]
    async fn uploads_fetched_bytes() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/img.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body(vec![0xFF, 0xD8, 0xFF, 0xE0])
            .create_async()
            .await;

        let store = Arc::new(InMemoryStore::new());
        let transcoder = AssetTranscoder::new(reqwest::Client::new(), store.clone());

        let handle = transcoder
            .transcode(&format!("{}/img.jpg", server.url()))
            .await
            .unwrap();
        assert!(handle.as_str().starts_with("image-"));
        assert_eq!(store.asset_count(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_is_a_skip() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/gone.jpg")
            .with_status(404)
            .create_async()
            .await;

        let store = Arc::new(InMemoryStore::new());
        let transcoder = AssetTranscoder::new(reqwest::Client::new(), store.clone());

        let err = transcoder
            .transcode(&format!("{}/gone.jpg", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, SkipReason::AssetFetch(ref m) if m.contains("404")));
        assert_eq!(store.asset_count(), 0);
    }

    #[tokio::test]
    async fn upload_failure_is_a_skip() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/img.jpg")
            .with_status(200)
            .with_body("bytes")
            .create_async()
            .await;

        let store = Arc::new(InMemoryStore::new());
        store.fail_uploads(true);
        let transcoder = AssetTranscoder::new(reqwest::Client::new(), store.clone());

        let err = transcoder
            .transcode(&format!("{}/img.jpg", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, SkipReason::AssetUpload(_)));
    }
}
