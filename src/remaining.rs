//! `press-sync remaining`: what is still waiting on a field.
//!
//! Re-queries the destination rather than trusting any local state, so the
//! answer reflects every run that has committed so far.

use anyhow::{Context, Result};

use crate::models::{ArticleField, ArticleRef};
use crate::store::DestinationStore;

/// Articles whose `field` is still unset, sorted by slug.
pub async fn list_remaining(
    store: &dyn DestinationStore,
    field: ArticleField,
) -> Result<Vec<ArticleRef>> {
    let mut articles = store
        .articles_missing(field)
        .await
        .with_context(|| format!("Failed to list articles missing {}", field))?;
    articles.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(articles)
}

/// One `slug  id` line per article, then a count.
pub fn render_remaining(
    field: ArticleField,
    articles: &[ArticleRef],
    limit: Option<usize>,
) -> String {
    let mut out = String::new();
    let shown = limit.unwrap_or(articles.len()).min(articles.len());
    for article in &articles[..shown] {
        out.push_str(&format!("{}  {}\n", article.slug, article.id));
    }
    if shown < articles.len() {
        out.push_str(&format!("... {} more\n", articles.len() - shown));
    }
    out.push_str(&format!("missing {}: {}\n", field, articles.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Transaction;
    use crate::pipeline::author_fields;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn lists_only_unset_articles() {
        let store = InMemoryStore::new();
        store.add_article("id-b", "b");
        store.add_article("id-a", "a");
        store.add_article("id-c", "c");

        let mut tx = Transaction::new();
        tx.patch("id-c", author_fields("author-x"));
        store.commit(&tx).await.unwrap();

        let missing = list_remaining(&store, ArticleField::Author).await.unwrap();
        let slugs: Vec<&str> = missing.iter().map(|a| a.slug.as_str()).collect();
        assert_eq!(slugs, vec!["a", "b"]);

        let images = list_remaining(&store, ArticleField::MainImage).await.unwrap();
        assert_eq!(images.len(), 3);
    }

    #[test]
    fn render_truncates_with_limit() {
        let articles = vec![
            ArticleRef { id: "1".into(), slug: "a".into() },
            ArticleRef { id: "2".into(), slug: "b".into() },
            ArticleRef { id: "3".into(), slug: "c".into() },
        ];
        let text = render_remaining(ArticleField::MainImage, &articles, Some(1));
        assert!(text.starts_with("a  1\n"));
        assert!(text.contains("... 2 more"));
        assert!(text.ends_with("missing mainImage: 3\n"));
    }
}
