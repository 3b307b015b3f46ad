//! YAML front-matter parsing.
//!
//! Documents are UTF-8 markdown with an optional YAML block delimited by
//! `---` fences at the very top. Recognized keys: `title`, `tags`/`tag`,
//! and `date`/`created`/`created_at`. Dates parse permissively and
//! normalize to UTC.

use crate::error::Result;
use crate::model::Frontmatter;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// A document split into front-matter and body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    /// Parsed front-matter map (empty when no fence block exists).
    pub frontmatter: Frontmatter,
    /// Body text after the closing fence.
    pub body: String,
}

impl ParsedDocument {
    /// Document title from front-matter, falling back to the path stem.
    #[must_use]
    pub fn title_or_stem(&self, path: &str) -> String {
        self.frontmatter
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| {
                std::path::Path::new(path)
                    .file_stem()
                    .map_or_else(|| path.to_string(), |s| s.to_string_lossy().to_string())
            })
    }

    /// Creation instant from `date`, `created`, or `created_at`.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        ["date", "created", "created_at"]
            .iter()
            .find_map(|key| self.frontmatter.get(*key))
            .and_then(|v| v.as_str())
            .and_then(parse_date_permissive)
    }
}

/// Splits a document into front-matter and body.
///
/// The front-matter block must start on the first line with `---` and end
/// at the next `---` line. A document without the opening fence has an
/// empty front-matter map.
///
/// # Errors
///
/// Returns `InvalidInput` when the fenced block is not valid YAML.
pub fn parse_document(raw: &str) -> Result<ParsedDocument> {
    let Some(rest) = raw.strip_prefix("---") else {
        return Ok(ParsedDocument {
            frontmatter: Frontmatter::new(),
            body: raw.to_string(),
        });
    };
    // The opening fence must be a full line.
    let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
        return Ok(ParsedDocument {
            frontmatter: Frontmatter::new(),
            body: raw.to_string(),
        });
    };

    let mut yaml_end = None;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            yaml_end = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }

    let Some((yaml_end, body_start)) = yaml_end else {
        // Unterminated fence: treat the whole document as body.
        return Ok(ParsedDocument {
            frontmatter: Frontmatter::new(),
            body: raw.to_string(),
        });
    };

    let yaml = &rest[..yaml_end];
    let frontmatter = if yaml.trim().is_empty() {
        Frontmatter::new()
    } else {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        match serde_json::to_value(value)? {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => Frontmatter::new(),
        }
    };

    Ok(ParsedDocument {
        frontmatter,
        body: rest[body_start..].to_string(),
    })
}

/// Parses a date or datetime string permissively, normalizing to UTC.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, and bare `YYYY-MM-DD`.
#[must_use]
pub fn parse_date_permissive(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| Utc.from_utc_datetime(&dt));
    }
    None
}
