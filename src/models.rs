//! Core data models used throughout press-sync.
//!
//! Source-side types mirror the WordPress REST payloads; destination-side
//! types mirror the documents the headless store holds.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A post as returned by `GET /posts?_embed`.
///
/// Only the fields the pipelines need are decoded; everything else in the
/// payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRecord {
    pub slug: String,
    #[serde(default)]
    pub author: Option<u64>,
    #[serde(default)]
    pub featured_media: Option<u64>,
    #[serde(default, rename = "_embedded")]
    pub embedded: Option<Embedded>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Embedded {
    #[serde(default)]
    pub author: Vec<EmbeddedAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddedAuthor {
    #[serde(default)]
    pub name: Option<String>,
}

impl SourceRecord {
    /// Name of the first embedded author, if the source inlined one.
    pub fn embedded_author_name(&self) -> Option<&str> {
        self.embedded
            .as_ref()
            .and_then(|e| e.author.first())
            .and_then(|a| a.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    /// Featured media id; WordPress encodes "none" as `0`.
    pub fn media_id(&self) -> Option<u64> {
        self.featured_media.filter(|id| *id != 0)
    }
}

/// A media item as returned by `GET /media/<id>?_fields=source_url,media_details`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaItem {
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub media_details: Option<MediaDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaDetails {
    #[serde(default)]
    pub sizes: std::collections::BTreeMap<String, Rendition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rendition {
    pub source_url: String,
    #[serde(default)]
    pub width: u64,
    #[serde(default)]
    pub height: u64,
}

impl MediaItem {
    /// Direct URL, or the largest declared rendition when the direct URL is missing.
    pub fn best_url(&self) -> Option<String> {
        if let Some(url) = self.source_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        self.media_details
            .as_ref()?
            .sizes
            .values()
            .filter(|r| !r.source_url.is_empty())
            .max_by_key(|r| r.width.saturating_mul(r.height.max(1)))
            .map(|r| r.source_url.clone())
    }
}

/// A user as returned by `GET /users?_fields=id,name`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceUser {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Typed reference to another destination document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "_type")]
    pub kind: String,
    #[serde(rename = "_ref")]
    pub target: String,
}

impl Reference {
    pub fn to(id: &str) -> Self {
        Self {
            kind: "reference".to_string(),
            target: id.to_string(),
        }
    }
}

/// Identifier of an uploaded binary asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetHandle(pub String);

impl AssetHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The article fields a pipeline can fill in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleField {
    Author,
    MainImage,
}

impl ArticleField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleField::Author => "author",
            ArticleField::MainImage => "mainImage",
        }
    }
}

impl std::fmt::Display for ArticleField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Id prefix the destination uses for unpublished drafts.
pub const DRAFT_PREFIX: &str = "drafts.";

/// Minimal projection of a destination article: enough to join on slug.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArticleRef {
    #[serde(rename = "_id")]
    pub id: String,
    pub slug: String,
}

/// Full destination article, as held by the in-memory store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestinationArticle {
    pub id: String,
    pub slug: String,
    pub author: Option<Reference>,
    pub main_image: Option<Value>,
    pub hero_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DestinationAuthor {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub bio: Option<String>,
}

/// A new author about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuthor {
    pub id: String,
    pub name: String,
    pub slug: String,
}

impl NewAuthor {
    /// Document body in the destination's wire shape.
    pub fn to_document(&self) -> Value {
        serde_json::json!({
            "_id": self.id,
            "_type": "author",
            "name": self.name,
            "slug": { "_type": "slug", "current": self.slug },
            "bio": "",
        })
    }
}

/// One `patch(id).set(fields)` operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub id: String,
    pub set: Map<String, Value>,
}

/// An ordered group of patches committed atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    patches: Vec<Patch>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a patch. A later patch for the same id overrides earlier fields.
    pub fn patch(&mut self, id: &str, set: Map<String, Value>) -> &mut Self {
        self.patches.push(Patch {
            id: id.to_string(),
            set,
        });
        self
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Wire body for the mutate endpoint.
    pub fn to_mutations(&self) -> Value {
        let mutations: Vec<Value> = self
            .patches
            .iter()
            .map(|p| serde_json::json!({ "patch": { "id": p.id, "set": p.set } }))
            .collect();
        serde_json::json!({ "mutations": mutations })
    }
}
