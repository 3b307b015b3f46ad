//! Heading-boundary chunker for markdown bodies.
//!
//! Walks the body line by line. Any line whose first non-space character
//! is `#` closes the previous span and becomes the heading of the span
//! that follows it. Spans longer than the size limit are split further at
//! blank-line paragraph boundaries, each paragraph keeping a start line
//! relative to the original span. The pre-heading span, if non-empty,
//! carries no heading.

/// Default span size limit in characters before paragraph splitting.
pub const DEFAULT_MAX_SPAN_CHARS: usize = 1200;

/// A chunk span produced by the chunker, before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Heading of the section the span belongs to.
    pub heading: Option<String>,
    /// Markdown heading level (1-6), 0 for the pre-heading span.
    pub heading_level: u8,
    /// 1-based line number of the first body line of the span.
    pub start_line: u32,
    /// Trimmed, non-empty span text.
    pub text: String,
}

/// Heading-aware markdown chunker.
#[derive(Debug, Clone, Copy)]
pub struct HeadingChunker {
    max_span_chars: usize,
}

impl Default for HeadingChunker {
    fn default() -> Self {
        Self {
            max_span_chars: DEFAULT_MAX_SPAN_CHARS,
        }
    }
}

impl HeadingChunker {
    /// Creates a chunker with the default span size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chunker with a custom span size limit.
    #[must_use]
    pub const fn with_max_span_chars(max_span_chars: usize) -> Self {
        Self { max_span_chars }
    }

    /// Splits a markdown body into chunk spans.
    ///
    /// The produced spans cover disjoint line ranges whose union is
    /// exactly the non-empty body regions between headings.
    #[must_use]
    pub fn chunk(&self, body: &str) -> Vec<ChunkSpan> {
        let lines: Vec<&str> = body.lines().collect();
        let mut spans = Vec::new();

        let mut heading: Option<(String, u8)> = None;
        let mut span_start = 0usize;

        for (i, line) in lines.iter().enumerate() {
            if line.trim_start().starts_with('#') {
                self.emit(&mut spans, &lines, span_start, i, heading.as_ref());
                heading = parse_heading(line);
                span_start = i + 1;
            }
        }
        self.emit(&mut spans, &lines, span_start, lines.len(), heading.as_ref());

        spans
    }

    /// Emits the span covering `lines[start..end]`, splitting oversized
    /// spans at paragraph boundaries.
    #[allow(clippy::cast_possible_truncation)]
    fn emit(
        &self,
        spans: &mut Vec<ChunkSpan>,
        lines: &[&str],
        mut start: usize,
        end: usize,
        heading: Option<&(String, u8)>,
    ) {
        // Skip leading blank lines so start_line points at real content.
        while start < end && lines[start].trim().is_empty() {
            start += 1;
        }
        if start >= end {
            return;
        }

        let text = lines[start..end].join("\n");
        let trimmed = text.trim_end();
        if trimmed.trim().is_empty() {
            return;
        }

        let (heading_text, level) = heading
            .map(|(h, l)| (Some(h.clone()), *l))
            .unwrap_or((None, 0));
        let first_line = (start + 1) as u32;

        if trimmed.chars().count() <= self.max_span_chars {
            spans.push(ChunkSpan {
                heading: heading_text,
                heading_level: level,
                start_line: first_line,
                text: trimmed.to_string(),
            });
            return;
        }

        // Oversized span: each blank-line-separated paragraph becomes its
        // own chunk, start_line tracking the offset within the span.
        let mut offset = 0usize;
        for paragraph in trimmed.split("\n\n") {
            let para = paragraph.trim();
            if !para.is_empty() {
                // Count lines up to the paragraph's first non-blank char.
                let leading = paragraph.len() - paragraph.trim_start().len();
                let lines_before = trimmed[..offset + leading].matches('\n').count() as u32;
                spans.push(ChunkSpan {
                    heading: heading_text.clone(),
                    heading_level: level,
                    start_line: first_line + lines_before,
                    text: para.to_string(),
                });
            }
            offset += paragraph.len() + 2; // past the "\n\n" separator
        }
    }
}

/// Parses a heading line into its text and level.
///
/// Returns `None` text when the line is only `#` marks (the level is lost
/// with it, matching the behavior of a bare heading marker).
fn parse_heading(line: &str) -> Option<(String, u8)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count().min(6) as u8;
    let text = trimmed.trim_start_matches(['#', ' ']).trim();
    if text.is_empty() {
        None
    } else {
        Some((text.to_string(), level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_heading_split() {
        let body = "# Intro\nA test.\n\n## Deep\nMore text.\n";
        let spans = HeadingChunker::new().chunk(body);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].heading.as_deref(), Some("Intro"));
        assert_eq!(spans[0].heading_level, 1);
        assert_eq!(spans[0].start_line, 2);
        assert_eq!(spans[0].text, "A test.");
        assert_eq!(spans[1].heading.as_deref(), Some("Deep"));
        assert_eq!(spans[1].heading_level, 2);
        assert_eq!(spans[1].start_line, 5);
        assert_eq!(spans[1].text, "More text.");
    }

    #[test]
    fn test_preamble_has_no_heading() {
        let body = "Opening words.\n\n# First\nBody.\n";
        let spans = HeadingChunker::new().chunk(body);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].heading, None);
        assert_eq!(spans[0].heading_level, 0);
        assert_eq!(spans[0].start_line, 1);
        assert_eq!(spans[0].text, "Opening words.");
    }

    #[test]
    fn test_empty_sections_are_skipped() {
        let body = "# One\n\n# Two\nContent.\n";
        let spans = HeadingChunker::new().chunk(body);

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].heading.as_deref(), Some("Two"));
    }

    #[test]
    fn test_oversized_span_splits_at_paragraphs() {
        let long = "x".repeat(1300);
        let body = format!("# Big\nP1\n\n{long}\n\nP3\n");
        let spans = HeadingChunker::new().chunk(&body);

        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].text, "P1");
        assert_eq!(spans[0].start_line, 2);
        // Middle paragraph starts two lines into the span.
        assert_eq!(spans[1].start_line, 4);
        assert_eq!(spans[1].text, long);
        assert_eq!(spans[2].text, "P3");
        assert_eq!(spans[2].start_line, 6);
        for span in &spans {
            assert_eq!(span.heading.as_deref(), Some("Big"));
        }
    }

    #[test]
    fn test_spans_cover_disjoint_regions() {
        let body = "# A\nline one\nline two\n## B\nline three\n";
        let spans = HeadingChunker::new().chunk(body);

        assert_eq!(spans.len(), 2);
        // Sorted by start_line, each span's lines end before the next begins.
        assert!(spans[0].start_line < spans[1].start_line);
        let first_len = spans[0].text.lines().count() as u32;
        assert!(spans[0].start_line + first_len <= spans[1].start_line);
    }

    #[test]
    fn test_heading_level_capped_at_six() {
        let body = "####### Over\ntext\n";
        let spans = HeadingChunker::new().chunk(body);
        assert_eq!(spans[0].heading_level, 6);
    }

    #[test]
    fn test_bare_marks_give_no_heading() {
        let body = "###\ntext after bare marks\n";
        let spans = HeadingChunker::new().chunk(body);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].heading, None);
    }

    #[test]
    fn test_indented_heading_recognized() {
        let body = "  # Indented\ntext\n";
        let spans = HeadingChunker::new().chunk(body);
        assert_eq!(spans[0].heading.as_deref(), Some("Indented"));
    }

    #[test]
    fn test_body_is_non_empty_after_trim() {
        let body = "# H\n\n\n# I\nreal\n";
        for span in HeadingChunker::new().chunk(body) {
            assert!(!span.text.trim().is_empty());
        }
    }
}
