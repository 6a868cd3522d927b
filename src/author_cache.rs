//! Persisted author-id → name map.
//!
//! Posts reference their author by numeric id; when the source does not
//! inline the author under `_embedded`, the name is looked up here. The
//! file is a flat JSON object, `{ "12": "Jane Doe" }`, written by
//! `press-sync author-cache` and read at the start of every authors run.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::source::SourceClient;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorNames {
    names: BTreeMap<String, String>,
}

impl AuthorNames {
    /// Load the cache file. A missing file is an empty cache.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read author cache: {}", path.display()))?;
        let names: BTreeMap<String, String> = serde_json::from_str(&content)
            .with_context(|| {
                format!("Author cache is not a flat JSON object: {}", path.display())
            })?;
        Ok(Self { names })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.names)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write author cache: {}", path.display()))?;
        Ok(())
    }

    pub fn insert(&mut self, id: u64, name: &str) {
        self.names.insert(id.to_string(), name.to_string());
    }

    pub fn name_for(&self, id: u64) -> Option<&str> {
        self.names
            .get(&id.to_string())
            .map(String::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Walk `/users` and rebuild the cache file. Returns the number of names stored.
pub async fn run_author_cache(source: &SourceClient, path: &Path) -> Result<usize> {
    let mut names = AuthorNames::default();
    let mut users = source.users();

    while let Some(page) = users.next_page().await {
        for user in page {
            names.insert(user.id, &user.name);
        }
    }

    names.save(path)?;
    info!(
        path = %path.display(),
        authors = names.len(),
        pages = users.pages_fetched(),
        "author cache written"
    );
    Ok(names.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty_cache() {
        let tmp = TempDir::new().unwrap();
        let cache = AuthorNames::load(&tmp.path().join("nope.json")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn file_is_a_flat_string_map() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("authors.json");

        let mut cache = AuthorNames::default();
        cache.insert(12, "Jane Doe");
        cache.insert(3, "  ");
        cache.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["12"], "Jane Doe");

        let loaded = AuthorNames::load(&path).unwrap();
        assert_eq!(loaded.name_for(12), Some("Jane Doe"));
        assert_eq!(loaded.name_for(3), None);
        assert_eq!(loaded.name_for(99), None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("authors.json");
        std::fs::write(&path, r#"{"12": {"name": "nested"}}"#).unwrap();
        assert!(AuthorNames::load(&path).is_err());
    }
}
