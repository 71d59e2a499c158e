//! Conflict marker parsing.
//!
//! Scans file text for `<<<<<<<` / `=======` / `>>>>>>>` blocks and produces
//! [`ConflictRegion`]s with a window of surrounding lines on each side. Diff3
//! style ancestor sections (`|||||||`) are kept apart from both sides.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::errors::ConflictError;

pub const BASE_MARKER: &str = "<<<<<<<";
pub const ANCESTOR_MARKER: &str = "|||||||";
pub const SEPARATOR_MARKER: &str = "=======";
pub const INCOMING_MARKER: &str = ">>>>>>>";

/// Context lines captured on each side of a region unless configured otherwise.
pub const DEFAULT_CONTEXT_LINES: usize = 10;

/// One conflict block as it appeared in the original file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRegion {
    /// 1-based line of the `<<<<<<<` marker.
    pub start_line: usize,
    /// 1-based line of the `>>>>>>>` marker.
    pub end_line: usize,
    pub base_label: String,
    pub incoming_label: String,
    pub base_content: String,
    pub incoming_content: String,
    /// Common ancestor lines, present only in diff3-style conflicts.
    pub ancestor_content: Option<String>,
    pub context_before: String,
    pub context_after: String,
    /// The full block, markers included, exactly as it appeared.
    #[serde(skip)]
    pub raw_block: Vec<String>,
}

impl ConflictRegion {
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

enum Section {
    Base,
    Ancestor,
    Incoming,
}

struct OpenRegion {
    start: usize,
    base_label: String,
    section: Section,
    base: Vec<String>,
    ancestor: Option<Vec<String>>,
    incoming: Vec<String>,
}

/// Split text into lines the same way everywhere in the crate.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

/// Parse all conflict regions in `text`, in ascending line order.
pub fn parse(text: &str, context_lines: usize) -> Result<Vec<ConflictRegion>, ConflictError> {
    parse_lines(&split_lines(text), context_lines)
}

/// Parse all conflict regions in pre-split `lines`.
pub fn parse_lines(
    lines: &[&str],
    context_lines: usize,
) -> Result<Vec<ConflictRegion>, ConflictError> {
    let mut regions = Vec::new();
    let mut open: Option<OpenRegion> = None;

    for (idx, line) in lines.iter().enumerate() {
        let mut closing: Option<&str> = None;
        let Some(region) = open.as_mut() else {
            if let Some(label) = line.strip_prefix(BASE_MARKER) {
                open = Some(OpenRegion {
                    start: idx,
                    base_label: label.trim().to_string(),
                    section: Section::Base,
                    base: Vec::new(),
                    ancestor: None,
                    incoming: Vec::new(),
                });
            }
            continue;
        };

        match region.section {
            Section::Base | Section::Ancestor if line.starts_with(SEPARATOR_MARKER) => {
                region.section = Section::Incoming;
            }
            Section::Base if line.starts_with(ANCESTOR_MARKER) => {
                region.section = Section::Ancestor;
                region.ancestor = Some(Vec::new());
            }
            Section::Base | Section::Ancestor if line.starts_with(INCOMING_MARKER) => {
                // Closing marker before any separator.
                return Err(ConflictError::MalformedRegion {
                    start_line: region.start + 1,
                });
            }
            Section::Base => region.base.push(line.to_string()),
            Section::Ancestor => {
                if let Some(ref mut ancestor) = region.ancestor {
                    ancestor.push(line.to_string());
                }
            }
            Section::Incoming => match line.strip_prefix(INCOMING_MARKER) {
                Some(label) => closing = Some(label),
                None => region.incoming.push(line.to_string()),
            },
        }

        if let Some(label) = closing {
            if let Some(done) = open.take() {
                regions.push(close_region(done, idx, label, lines, context_lines));
            }
        }
    }

    if let Some(region) = open {
        return Err(ConflictError::MalformedRegion {
            start_line: region.start + 1,
        });
    }

    debug!(count = regions.len(), "parsed conflict regions");
    Ok(regions)
}

fn close_region(
    open: OpenRegion,
    end: usize,
    label: &str,
    lines: &[&str],
    context_lines: usize,
) -> ConflictRegion {
    let start = open.start;
    let before_from = start.saturating_sub(context_lines);
    let after_to = (end + 1 + context_lines).min(lines.len());

    ConflictRegion {
        start_line: start + 1,
        end_line: end + 1,
        base_label: open.base_label,
        incoming_label: label.trim().to_string(),
        base_content: open.base.join("\n"),
        incoming_content: open.incoming.join("\n"),
        ancestor_content: open.ancestor.map(|a| a.join("\n")),
        context_before: lines[before_from..start].join("\n"),
        context_after: lines[end + 1..after_to].join("\n"),
        raw_block: lines[start..=end].iter().map(|l| l.to_string()).collect(),
    }
}

/// Read `path` and parse it. Returns the file text alongside its regions.
#[instrument(fields(path = %path.display()))]
pub fn parse_file(
    path: &Path,
    context_lines: usize,
) -> Result<(String, Vec<ConflictRegion>), ConflictError> {
    let text = read_conflicted_file(path)?;
    let regions = parse(&text, context_lines)?;
    Ok((text, regions))
}

/// Validate that `path` is an existing regular file and read it.
pub fn read_conflicted_file(path: &Path) -> Result<String, ConflictError> {
    if !path.exists() {
        return Err(ConflictError::FileNotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(ConflictError::NotAFile(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "A\n<<<<<<< HEAD\nfoo=1\n=======\nfoo=2\n>>>>>>> br\nB\n";

    #[test]
    fn test_parse_simple_region() {
        let regions = parse(SIMPLE, DEFAULT_CONTEXT_LINES).unwrap();
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert_eq!((r.start_line, r.end_line), (2, 6));
        assert_eq!(r.base_label, "HEAD");
        assert_eq!(r.incoming_label, "br");
        assert_eq!(r.base_content, "foo=1");
        assert_eq!(r.incoming_content, "foo=2");
        assert_eq!(r.context_before, "A");
        assert_eq!(r.context_after, "B");
        assert_eq!(r.raw_block.len(), r.line_count());
        assert!(r.ancestor_content.is_none());
    }

    #[test]
    fn test_no_markers_yields_nothing() {
        assert!(parse("fn main() {}\n", 10).unwrap().is_empty());
        assert!(parse("", 10).unwrap().is_empty());
    }

    #[test]
    fn test_multiple_regions_ascending_non_overlapping() {
        let text = "\
<<<<<<< ours
a
=======
b
>>>>>>> theirs
mid
<<<<<<< ours
c
d
=======
>>>>>>> theirs
";
        let regions = parse(text, 1).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!((regions[0].start_line, regions[0].end_line), (1, 5));
        assert_eq!((regions[1].start_line, regions[1].end_line), (7, 11));
        assert!(regions[0].end_line < regions[1].start_line);
        assert_eq!(regions[1].base_content, "c\nd");
        assert_eq!(regions[1].incoming_content, "");
        // Context never crosses into the previous region beyond N lines.
        assert_eq!(regions[1].context_before, "mid");
    }

    #[test]
    fn test_context_is_clamped_to_file() {
        let text = "1\n2\n<<<<<<< a\nx\n=======\ny\n>>>>>>> b\n3\n";
        let r = &parse(text, 10).unwrap()[0];
        assert_eq!(r.context_before, "1\n2");
        assert_eq!(r.context_after, "3");

        let r = &parse(text, 1).unwrap()[0];
        assert_eq!(r.context_before, "2");
        assert_eq!(r.context_after, "3");

        let r = &parse(text, 0).unwrap()[0];
        assert_eq!(r.context_before, "");
        assert_eq!(r.context_after, "");
    }

    #[test]
    fn test_labels_are_trimmed_and_may_be_empty() {
        let text = "<<<<<<<\nx\n=======\ny\n>>>>>>>   feature/login  \n";
        let r = &parse(text, 3).unwrap()[0];
        assert_eq!(r.base_label, "");
        assert_eq!(r.incoming_label, "feature/login");
    }

    #[test]
    fn test_diff3_ancestor_is_separate() {
        let text = "<<<<<<< HEAD\nours\n||||||| merged common ancestors\nold\n=======\ntheirs\n>>>>>>> b\n";
        let r = &parse(text, 3).unwrap()[0];
        assert_eq!(r.base_content, "ours");
        assert_eq!(r.ancestor_content.as_deref(), Some("old"));
        assert_eq!(r.incoming_content, "theirs");
    }

    #[test]
    fn test_truncated_region_is_malformed() {
        let text = "ok\n<<<<<<< HEAD\nfoo\n=======\nbar\n";
        assert!(matches!(
            parse(text, 3),
            Err(ConflictError::MalformedRegion { start_line: 2 })
        ));
    }

    #[test]
    fn test_closing_without_separator_is_malformed() {
        let text = "<<<<<<< HEAD\nfoo\n>>>>>>> b\n";
        assert!(matches!(
            parse(text, 3),
            Err(ConflictError::MalformedRegion { start_line: 1 })
        ));
    }

    #[test]
    fn test_crlf_lines() {
        let text = "A\r\n<<<<<<< HEAD\r\nx\r\n=======\r\ny\r\n>>>>>>> b\r\n";
        let r = &parse(text, 3).unwrap()[0];
        assert_eq!(r.base_label, "HEAD");
        assert_eq!(r.base_content, "x");
    }

    #[test]
    fn test_parse_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.rs");
        assert!(matches!(
            parse_file(&missing, 3),
            Err(ConflictError::FileNotFound(_))
        ));
        assert!(matches!(
            parse_file(dir.path(), 3),
            Err(ConflictError::NotAFile(_))
        ));

        let path = dir.path().join("c.txt");
        std::fs::write(&path, SIMPLE).unwrap();
        let (text, regions) = parse_file(&path, 3).unwrap();
        assert_eq!(text, SIMPLE);
        assert_eq!(regions.len(), 1);
    }
}
