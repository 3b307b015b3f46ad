//! Tag normalization.
//!
//! A tag is a lowercase, trimmed token with no leading `#`. Tag strings
//! split on `,` and `;`; lists are taken element-wise. The normalized set
//! is sorted and duplicate-free, which makes normalization idempotent.

use crate::model::Frontmatter;

/// Normalizes a single raw tag token.
///
/// Lowercases, trims, and strips leading `#` marks. Returns `None` when
/// nothing remains.
#[must_use]
pub fn normalize_tag(raw: &str) -> Option<String> {
    let tag = raw.trim().trim_start_matches('#').trim().to_lowercase();
    if tag.is_empty() { None } else { Some(tag) }
}

/// Normalizes a collection of raw tag strings into the sorted unique set.
///
/// Each input string may itself contain several tags separated by `,`
/// or `;`.
#[must_use]
pub fn normalize_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<String> = raw
        .into_iter()
        .flat_map(|s| {
            s.as_ref()
                .split([',', ';'])
                .filter_map(normalize_tag)
                .collect::<Vec<_>>()
        })
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Reads and normalizes tags from front-matter.
///
/// Recognizes the `tags` and `tag` keys; each may hold a string (split on
/// `,`/`;`) or a list of strings.
#[must_use]
pub fn tags_from_frontmatter(frontmatter: &Frontmatter) -> Vec<String> {
    let value = frontmatter
        .get("tags")
        .or_else(|| frontmatter.get("tag"));

    let Some(value) = value else {
        return Vec::new();
    };

    match value {
        serde_json::Value::String(s) => normalize_tags([s.as_str()]),
        serde_json::Value::Array(items) => {
            let strings: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            normalize_tags(strings)
        }
        _ => Vec::new(),
    }
}
