//! Run metadata under the runs root.
//!
//! Each pipeline invocation gets its own directory
//! (`<runs_root>/<run_id>/`) holding the staging area and a
//! `run-manifest.json` recording how far the run got.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

const RUN_MANIFEST_FILENAME: &str = "run-manifest.json";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunMetadata {
    pub run_id: String,
    /// "running", "success" or "failed".
    pub status: String,
    /// Last pipeline state the run reached.
    pub state: String,
    pub created_at_utc: String,
    pub finished_at_utc: Option<String>,
    /// sha256 digests of the staged artifacts, keyed by file name.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default)]
    pub image_tag: Option<String>,
    #[serde(default)]
    pub failed_step: Option<String>,
}

pub fn manifest_path(run_dir: &Path) -> PathBuf {
    run_dir.join(RUN_MANIFEST_FILENAME)
}

/// Write a run manifest atomically (temporary file + rename).
pub fn write_manifest(run_dir: &Path, meta: &RunMetadata) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(meta).context("serializing run manifest")?;
    let path = manifest_path(run_dir);
    let tmp = run_dir.join(format!(".{}.tmp", RUN_MANIFEST_FILENAME));
    fs::write(&tmp, bytes)
        .with_context(|| format!("writing run manifest '{}'", tmp.display()))?;
    fs::rename(&tmp, &path)
        .with_context(|| format!("moving run manifest into '{}'", path.display()))?;
    Ok(())
}

pub fn load_runs_metadata(runs_root: &Path) -> Result<Vec<RunMetadata>> {
    if !runs_root.is_dir() {
        return Ok(Vec::new());
    }
    let mut runs = Vec::new();
    for entry in fs::read_dir(runs_root)
        .with_context(|| format!("reading runs directory '{}'", runs_root.display()))?
    {
        let entry = entry
            .with_context(|| format!("iterating runs directory '{}'", runs_root.display()))?;
        let run_dir = entry.path();
        if !run_dir.is_dir() {
            continue;
        }
        let Some(run_name) = run_dir.file_name().and_then(|part| part.to_str()) else {
            continue;
        };
        if run_name.starts_with('.') {
            continue;
        }
        let path = manifest_path(&run_dir);
        if !path.is_file() {
            continue;
        }
        let bytes = fs::read(&path)
            .with_context(|| format!("reading run metadata '{}'", path.display()))?;
        let parsed: RunMetadata = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing run metadata '{}'", path.display()))?;
        runs.push(parsed);
    }
    Ok(runs)
}

pub fn latest_successful_run_id(runs_root: &Path) -> Result<Option<String>> {
    let mut runs = load_runs_metadata(runs_root)?;
    runs.retain(|run| run.status == "success");
    runs.sort_by_key(|run| Reverse(run_sort_key(run)));
    Ok(runs.first().map(|r| r.run_id.clone()))
}

/// Delete all but the newest `keep` recorded runs.
pub fn prune_old_runs(runs_root: &Path, keep: usize) -> Result<()> {
    if keep == 0 {
        bail!("keep must be >= 1");
    }
    let mut runs = load_runs_metadata(runs_root)?;
    runs.sort_by_key(|run| Reverse(run_sort_key(run)));
    for run in runs.into_iter().skip(keep) {
        let path = runs_root.join(&run.run_id);
        fs::remove_dir_all(&path)
            .with_context(|| format!("removing expired run directory '{}'", path.display()))?;
    }
    Ok(())
}

fn run_sort_key(run: &RunMetadata) -> String {
    run.finished_at_utc
        .clone()
        .unwrap_or_else(|| run.created_at_utc.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(runs_root: &Path, run_id: &str, status: &str, finished: &str) {
        let run_dir = runs_root.join(run_id);
        fs::create_dir_all(&run_dir).unwrap();
        let meta = RunMetadata {
            run_id: run_id.to_string(),
            status: status.to_string(),
            state: "image-assembled".to_string(),
            created_at_utc: finished.to_string(),
            finished_at_utc: Some(finished.to_string()),
            artifacts: BTreeMap::new(),
            image_tag: None,
            failed_step: None,
        };
        write_manifest(&run_dir, &meta).unwrap();
    }

    #[test]
    fn test_manifest_roundtrip() {
        let temp = TempDir::new().unwrap();
        record(temp.path(), "run-1", "success", "2026-01-01T00:00:00Z");

        let runs = load_runs_metadata(temp.path()).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "run-1");
        assert_eq!(runs[0].status, "success");
    }

    #[test]
    fn test_latest_successful_ignores_failures() {
        let temp = TempDir::new().unwrap();
        record(temp.path(), "run-1", "success", "2026-01-01T00:00:00Z");
        record(temp.path(), "run-2", "failed", "2026-01-02T00:00:00Z");
        record(temp.path(), "run-3", "success", "2026-01-01T12:00:00Z");

        let latest = latest_successful_run_id(temp.path()).unwrap();
        assert_eq!(latest.as_deref(), Some("run-3"));
    }

    #[test]
    fn test_prune_keeps_newest() {
        let temp = TempDir::new().unwrap();
        record(temp.path(), "run-1", "success", "2026-01-01T00:00:00Z");
        record(temp.path(), "run-2", "success", "2026-01-02T00:00:00Z");
        record(temp.path(), "run-3", "failed", "2026-01-03T00:00:00Z");

        prune_old_runs(temp.path(), 2).unwrap();

        assert!(!temp.path().join("run-1").exists());
        assert!(temp.path().join("run-2").exists());
        assert!(temp.path().join("run-3").exists());
    }

    #[test]
    fn test_prune_zero_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(prune_old_runs(temp.path(), 0).is_err());
    }

    #[test]
    fn test_empty_runs_root_is_fine() {
        let temp = TempDir::new().unwrap();
        let runs = load_runs_metadata(&temp.path().join("missing")).unwrap();
        assert!(runs.is_empty());
    }
}
