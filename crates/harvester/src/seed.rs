//! Seed list parsing
//!
//! Seed files hold one catalogue URL per line. Identifiers are taken from
//! the last path segment; blank lines and `#` comments are skipped.

use std::collections::HashSet;

use tracing::warn;

use crate::requirement::{entity_id_from_url, SubjectKind};

fn urls(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Person identifiers from a list of personage URLs, first occurrence wins
pub fn person_ids_from_urls(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    urls(text)
        .filter_map(|url| {
            let id = entity_id_from_url(url);
            if id.is_none() {
                warn!(%url, "Skipping URL without identifier");
            }
            id
        })
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Subject identifiers and kinds from a list of subject URLs
pub fn subjects_from_urls(text: &str) -> Vec<(String, SubjectKind)> {
    let mut seen = HashSet::new();
    urls(text)
        .filter_map(|url| match entity_id_from_url(url) {
            Some(id) => Some((id, SubjectKind::from_subject_url(url))),
            None => {
                warn!(%url, "Skipping URL without identifier");
                None
            }
        })
        .filter(|(id, _)| seen.insert(id.clone()))
        .collect()
}
