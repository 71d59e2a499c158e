//! Application of resolution results to the file text.
//!
//! Results are applied bottom-up to a single in-memory buffer, so earlier line
//! numbers stay valid while later regions change size. The file is then
//! written once, atomically, through a temp file in the same directory.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use super::engine::{Outcome, Replacement, ResolutionResult};
use super::parser::ConflictRegion;
use crate::errors::ConflictError;

/// File text split into lines. Each line keeps its own terminator, so
/// mixed line endings survive a rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    lines: Vec<String>,
    /// `"\r\n"`, `"\n"`, or `""` for a last line without one.
    endings: Vec<&'static str>,
}

impl Document {
    pub fn from_text(text: &str) -> Self {
        let (lines, endings): (Vec<String>, Vec<&'static str>) = text
            .split_inclusive('\n')
            .map(|piece| {
                if let Some(line) = piece.strip_suffix("\r\n") {
                    (line.to_string(), "\r\n")
                } else if let Some(line) = piece.strip_suffix('\n') {
                    (line.to_string(), "\n")
                } else {
                    (piece.to_string(), "")
                }
            })
            .unzip();
        Self { lines, endings }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn to_text(&self) -> String {
        self.lines
            .iter()
            .zip(&self.endings)
            .map(|(line, ending)| format!("{line}{ending}"))
            .collect()
    }

    /// Replace lines `start..end` with `merged`. New lines take the ending of
    /// the block's first line; the last one keeps the block's final ending.
    fn splice(&mut self, start: usize, end: usize, merged: &str) {
        let inner = self.endings[start];
        let last = self.endings[end - 1];
        let replacement: Vec<String> = merged.lines().map(String::from).collect();
        let count = replacement.len();
        let endings = (0..count).map(|i| if i + 1 == count { last } else { inner });

        self.lines.splice(start..end, replacement);
        self.endings.splice(start..end, endings);
    }
}

/// Counts of applied decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub accepted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Applied { document: Document, summary: Summary },
    /// At least one result was an abort; nothing may be written.
    Aborted,
}

/// Find the 0-based start of `region`'s original block in `lines`.
///
/// The parse-time position is checked first; otherwise the exact block is
/// searched for and the occurrence nearest the original position wins.
pub fn locate_block<S: AsRef<str>>(lines: &[S], region: &ConflictRegion) -> Option<usize> {
    let block = &region.raw_block;
    let len = block.len();
    if len == 0 || lines.len() < len {
        return None;
    }
    let matches_at = |start: usize| {
        lines[start..start + len]
            .iter()
            .zip(block)
            .all(|(a, b)| a.as_ref() == b)
    };

    let expected = region.start_line - 1;
    if expected + len <= lines.len() && matches_at(expected) {
        return Some(expected);
    }
    (0..=lines.len() - len)
        .filter(|&start| matches_at(start))
        .min_by_key(|&start| start.abs_diff(expected))
}

/// Apply `decisions` to `document`.
///
/// Decisions are processed from the bottom of the file upwards regardless
/// of the order given.
#[instrument(skip_all, fields(decisions = decisions.len()))]
pub fn apply(
    document: &Document,
    decisions: &[(&ConflictRegion, &ResolutionResult)],
) -> Result<Mutation, ConflictError> {
    if decisions
        .iter()
        .any(|(_, result)| result.outcome == Outcome::Aborted)
    {
        debug!("abort present, nothing to apply");
        return Ok(Mutation::Aborted);
    }

    let mut ordered: Vec<_> = decisions.to_vec();
    ordered.sort_by(|a, b| b.0.start_line.cmp(&a.0.start_line));

    let mut document = document.clone();
    let mut summary = Summary::default();

    for (region, result) in ordered {
        match (&result.outcome, &result.replacement) {
            (Outcome::Skipped, _) => summary.skipped += 1,
            (Outcome::Accepted, Some(Replacement::Text(merged))) => {
                let start = locate_block(document.lines(), region).ok_or(
                    ConflictError::RegionMismatch {
                        start_line: region.start_line,
                        end_line: region.end_line,
                    },
                )?;
                document.splice(start, start + region.raw_block.len(), merged);
                summary.accepted += 1;
            }
            (Outcome::Accepted, _) => summary.accepted += 1,
            (Outcome::Aborted, _) => return Ok(Mutation::Aborted),
        }
    }

    Ok(Mutation::Applied { document, summary })
}

/// Replace `path` with `contents` atomically. On failure the original file
/// is untouched.
#[instrument(skip(contents), fields(path = %path.display()))]
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), ConflictError> {
    let fail = |source: std::io::Error| ConflictError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let permissions = std::fs::metadata(path).map(|m| m.permissions()).ok();
    let mut tmp = NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(contents.as_bytes()).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    if let Some(permissions) = permissions {
        std::fs::set_permissions(tmp.path(), permissions).map_err(fail)?;
    }
    tmp.persist(path).map_err(|e| fail(e.error))?;

    info!(bytes = contents.len(), "wrote resolved file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::engine::ResolutionMethod;
    use crate::conflict::parser::parse;

    const TWO: &str = "top\n<<<<<<< a\n1\n=======\n2\n>>>>>>> b\nmid\n<<<<<<< a\n3\n=======\n4\n>>>>>>> b\nend\n";

    fn accept(code: &str) -> ResolutionResult {
        ResolutionResult::accepted(
            Replacement::Text(code.into()),
            "r",
            None,
            ResolutionMethod::LlmSuggestion,
        )
    }

    #[test]
    fn test_bottom_up_with_size_changes() {
        let regions = parse(TWO, 3).unwrap();
        let grow = accept("x\ny\nz");
        let shrink = accept("w");
        let doc = Document::from_text(TWO);
        // Results in reverse order, as the engine produces them.
        let decisions = vec![(&regions[1], &shrink), (&regions[0], &grow)];
        let Mutation::Applied { document, summary } = apply(&doc, &decisions).unwrap() else {
            panic!("expected applied");
        };
        assert_eq!(document.to_text(), "top\nx\ny\nz\nmid\nw\nend\n");
        assert_eq!(summary, Summary { accepted: 2, skipped: 0 });

        // Order given does not matter.
        let decisions = vec![(&regions[0], &grow), (&regions[1], &shrink)];
        let Mutation::Applied { document, .. } = apply(&doc, &decisions).unwrap() else {
            panic!("expected applied");
        };
        assert_eq!(document.to_text(), "top\nx\ny\nz\nmid\nw\nend\n");
    }

    #[test]
    fn test_skip_preserves_markers() {
        let regions = parse(TWO, 3).unwrap();
        let skip = ResolutionResult::skipped("later", None);
        let take = accept("3");
        let doc = Document::from_text(TWO);
        let decisions = vec![(&regions[1], &take), (&regions[0], &skip)];
        let Mutation::Applied { document, summary } = apply(&doc, &decisions).unwrap() else {
            panic!("expected applied");
        };
        assert_eq!(
            document.to_text(),
            "top\n<<<<<<< a\n1\n=======\n2\n>>>>>>> b\nmid\n3\nend\n"
        );
        assert_eq!(summary, Summary { accepted: 1, skipped: 1 });
    }

    #[test]
    fn test_any_abort_means_no_mutation() {
        let regions = parse(TWO, 3).unwrap();
        let take = accept("3");
        let abort = ResolutionResult::aborted("stop", None);
        let decisions = vec![(&regions[1], &take), (&regions[0], &abort)];
        assert_eq!(
            apply(&Document::from_text(TWO), &decisions).unwrap(),
            Mutation::Aborted
        );
    }

    #[test]
    fn test_on_disk_sentinel_leaves_text() {
        let edited = "top\nmanual\nmid\n<<<<<<< a\n3\n=======\n4\n>>>>>>> b\nend\n";
        let regions = parse(TWO, 3).unwrap();
        let manual = ResolutionResult::accepted(
            Replacement::AlreadyOnDisk,
            "edited",
            None,
            ResolutionMethod::ManualEdit,
        );
        let take = accept("4");
        // The bottom region moved up by four lines after the edit.
        let decisions = vec![(&regions[1], &take), (&regions[0], &manual)];
        let Mutation::Applied { document, summary } =
            apply(&Document::from_text(edited), &decisions).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(document.to_text(), "top\nmanual\nmid\n4\nend\n");
        assert_eq!(summary.accepted, 2);
    }

    #[test]
    fn test_missing_block_is_mismatch() {
        let regions = parse(TWO, 3).unwrap();
        let take = accept("x");
        let decisions = vec![(&regions[0], &take)];
        let err = apply(&Document::from_text("nothing here\n"), &decisions).unwrap_err();
        assert!(matches!(
            err,
            ConflictError::RegionMismatch { start_line: 2, end_line: 6 }
        ));
    }

    #[test]
    fn test_empty_merge_removes_block() {
        let text = "a\n<<<<<<< x\n1\n=======\n2\n>>>>>>> y\nb\n";
        let regions = parse(text, 3).unwrap();
        let take = accept("");
        let Mutation::Applied { document, .. } =
            apply(&Document::from_text(text), &[(&regions[0], &take)]).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(document.to_text(), "a\nb\n");
    }

    #[test]
    fn test_document_preserves_line_endings() {
        let doc = Document::from_text("a\r\nb\r\n");
        assert_eq!(doc.to_text(), "a\r\nb\r\n");
        let doc = Document::from_text("a\nb");
        assert_eq!(doc.to_text(), "a\nb");
        assert_eq!(Document::from_text("").to_text(), "");
    }

    #[test]
    fn test_mixed_line_endings_untouched_outside_region() {
        let text = "A\r\nkeep\n<<<<<<< HEAD\nfoo=1\n=======\nfoo=2\n>>>>>>> br\nB\n";
        let regions = parse(text, 3).unwrap();
        let take = accept("foo=3\nbar=3");
        let Mutation::Applied { document, .. } =
            apply(&Document::from_text(text), &[(&regions[0], &take)]).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(document.to_text(), "A\r\nkeep\nfoo=3\nbar=3\nB\n");

        let take = accept("foo=3");
        let Mutation::Applied { document, .. } =
            apply(&Document::from_text(text), &[(&regions[0], &take)]).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(document.to_text(), "A\r\nkeep\nfoo=3\nB\n");
    }

    #[test]
    fn test_crlf_block_gets_crlf_replacement() {
        let text = "a\n<<<<<<< x\r\n1\r\n=======\r\n2\r\n>>>>>>> y\r\nb\n";
        let regions = parse(text, 3).unwrap();
        let take = accept("1\n2");
        let Mutation::Applied { document, .. } =
            apply(&Document::from_text(text), &[(&regions[0], &take)]).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(document.to_text(), "a\n1\r\n2\r\nb\n");
    }

    #[test]
    fn test_block_at_end_without_newline() {
        let text = "a\n<<<<<<< x\n1\n=======\n2\n>>>>>>> y";
        let regions = parse(text, 3).unwrap();
        let take = accept("12");
        let Mutation::Applied { document, .. } =
            apply(&Document::from_text(text), &[(&regions[0], &take)]).unwrap()
        else {
            panic!("expected applied");
        };
        assert_eq!(document.to_text(), "a\n12");
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "old").unwrap();
        write_atomic(&path, "new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        // No stray temp files remain.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_atomic_failure_reports_path() {
        let err = write_atomic(Path::new("/nonexistent-dir/f.txt"), "x").unwrap_err();
        assert!(matches!(err, ConflictError::WriteFailed { .. }));
    }
}
