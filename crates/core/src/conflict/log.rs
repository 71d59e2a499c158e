//! JSON resolution logs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::engine::{Outcome, Replacement, ResolutionMethod, ResolutionResult};
use super::parser::ConflictRegion;

/// One region's final decision. Written once and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionLogEntry {
    pub file: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
    pub base_label: String,
    pub incoming_label: String,
    pub outcome: Outcome,
    pub method: ResolutionMethod,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// The applied text; `None` for skips, aborts and manual edits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ResolutionLogEntry {
    pub fn new(file: &Path, region: &ConflictRegion, result: &ResolutionResult) -> Self {
        let merged_code = match result.replacement {
            Some(Replacement::Text(ref text)) => Some(text.clone()),
            _ => None,
        };
        Self {
            file: file.to_path_buf(),
            start_line: region.start_line,
            end_line: region.end_line,
            base_label: region.base_label.clone(),
            incoming_label: region.incoming_label.clone(),
            outcome: result.outcome,
            method: result.method,
            reason: result.reason.clone(),
            comment: result.comment.clone(),
            merged_code,
            timestamp: Utc::now(),
        }
    }
}

/// Overall outcome recorded for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Written,
    DryRun,
    Aborted,
    NoConflicts,
}

/// All entries of one resolution session over one file.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionLog {
    pub session_id: Uuid,
    pub file: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: Option<SessionStatus>,
    pub entries: Vec<ResolutionLogEntry>,
}

impl ResolutionLog {
    pub fn new(file: &Path) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            file: file.to_path_buf(),
            started_at: Utc::now(),
            finished_at: None,
            status: None,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: ResolutionLogEntry) {
        self.entries.push(entry);
    }

    pub fn finish(&mut self, status: SessionStatus) {
        self.status = Some(status);
        self.finished_at = Some(Utc::now());
    }

    /// Write the log as `<file-stem>-<timestamp>.json` into `dir`.
    pub fn write_to_dir(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let stem = self
            .file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "conflict".to_string());
        let name = format!(
            "{stem}-{}.json",
            self.started_at.format("%Y%m%dT%H%M%S%.3fZ")
        );
        let path = dir.join(name);
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;
        debug!(path = %path.display(), entries = self.entries.len(), "wrote resolution log");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::parser::parse;

    #[test]
    fn test_write_log() {
        let regions = parse("<<<<<<< HEAD\na\n=======\nb\n>>>>>>> br\n", 3).unwrap();
        let result = ResolutionResult::accepted(
            Replacement::Text("ab".into()),
            "kept both",
            Some("merge them".into()),
            ResolutionMethod::LlmSuggestion,
        );
        let file = Path::new("src/config.rs");
        let mut log = ResolutionLog::new(file);
        log.push(ResolutionLogEntry::new(file, &regions[0], &result));
        log.finish(SessionStatus::Written);

        let dir = tempfile::tempdir().unwrap();
        let path = log.write_to_dir(&dir.path().join("logs")).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("config-"));
        assert!(name.ends_with(".json"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["status"], "written");
        assert_eq!(value["entries"][0]["method"], "LLM Suggestion");
        assert_eq!(value["entries"][0]["outcome"], "accepted");
        assert_eq!(value["entries"][0]["merged_code"], "ab");
        assert_eq!(value["entries"][0]["base_label"], "HEAD");
        assert!(value["session_id"].as_str().unwrap().len() == 36);
    }

    #[test]
    fn test_skipped_entry_has_no_code() {
        let regions = parse("<<<<<<< a\nx\n=======\ny\n>>>>>>> b\n", 3).unwrap();
        let result = ResolutionResult::skipped("not sure", None);
        let entry = ResolutionLogEntry::new(Path::new("f"), &regions[0], &result);
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("merged_code").is_none());
        assert!(value.get("comment").is_none());
        assert_eq!(value["method"], "Skipped");
    }
}
