//! Title-based article deduplication.
//!
//! MIND ships the same story under several ids. Articles are grouped by exact
//! title; the first id of each group (catalog order) becomes canonical and
//! every later id of the group maps to it.

use ahash::{AHashMap, AHashSet};
use tracing::info;

use crate::records::Article;

/// Single-hop mapping from duplicate article id to canonical id.
///
/// A canonical id is never a key, so one lookup always resolves an id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalMap {
    map: AHashMap<String, String>,
    /// Keys of `map`, kept as a set for the remapper's hot membership test.
    to_change: AHashSet<String>,
}

impl CanonicalMap {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether `id` is a duplicate that must be rewritten.
    #[inline]
    pub fn needs_change(&self, id: &str) -> bool {
        self.to_change.contains(id)
    }

    /// Canonical form of `id` (itself when it is not a duplicate).
    #[inline]
    pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        if self.needs_change(id) {
            self.map.get(id).map(String::as_str).unwrap_or(id)
        } else {
            id
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn insert(&mut self, duplicate: &str, canonical: &str) {
        self.to_change.insert(duplicate.to_string());
        self.map.insert(duplicate.to_string(), canonical.to_string());
    }
}

/// Deduplicated catalog together with the id remapping that produced it.
#[derive(Debug, Clone, Default)]
pub struct Deduplicated {
    pub catalog: Vec<Article>,
    pub canonical: CanonicalMap,
    /// Catalog rows dropped (duplicate title or repeated id).
    pub removed: usize,
}

/// Keep the first article per title and map every other id of that title to it.
///
/// Deterministic for a given catalog order; running it on its own output is a
/// no-op. A row whose id is already kept or already mapped is dropped without
/// touching the map, so ids in the output catalog are unique and every mapped
/// id resolves to a kept row.
pub fn dedup_catalog(articles: &[Article]) -> Deduplicated {
    // title -> id of the catalog row that heads it
    let mut head_by_title: AHashMap<&str, &str> = AHashMap::with_capacity(articles.len());
    let mut kept_ids: AHashSet<&str> = AHashSet::with_capacity(articles.len());
    let mut canonical = CanonicalMap::default();
    let mut catalog = Vec::with_capacity(articles.len());
    let mut removed = 0;

    for article in articles {
        let id = article.article_id.as_str();
        if kept_ids.contains(id) || canonical.needs_change(id) {
            removed += 1;
            continue;
        }
        match head_by_title.get(article.title.as_str()) {
            Some(&head) => {
                removed += 1;
                canonical.insert(id, head);
            }
            None => {
                head_by_title.insert(article.title.as_str(), id);
                kept_ids.insert(id);
                catalog.push(article.clone());
            }
        }
    }

    info!(
        input = articles.len(),
        kept = catalog.len(),
        duplicates = canonical.len(),
        "deduplicated article catalog"
    );

    Deduplicated {
        catalog,
        canonical,
        removed,
    }
}
