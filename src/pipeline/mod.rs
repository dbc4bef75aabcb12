//! Pipeline orchestration.
//!
//! One invocation walks the linear state machine
//!
//! ```text
//! source-ready -> built -> spec-generated -> staged -> image-assembled
//! ```
//!
//! strictly sequentially: each step's output is the next step's required
//! input, and a failed step halts the run in its current state. Nothing is
//! retried and nothing is rolled back; the operator re-runs after fixing
//! the cause, and the new invocation gets a fresh run directory.
//!
//! Every run stages under `<runs_root>/<run_id>/staging/`, so concurrent
//! runs never race on staged files. The runs root itself (manifests,
//! pruning) is still shared, so an exclusive advisory lock is held for the
//! duration of a run.

pub mod builder;
pub mod chain_spec;
pub mod runs;
pub mod stage;

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::image::assemble::{assemble_image, AssembledImage};
use crate::image::ImageManifest;

/// States of one pipeline invocation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    SourceReady,
    Built,
    SpecGenerated,
    Staged,
    ImageAssembled,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::SourceReady => write!(f, "source-ready"),
            PipelineState::Built => write!(f, "built"),
            PipelineState::SpecGenerated => write!(f, "spec-generated"),
            PipelineState::Staged => write!(f, "staged"),
            PipelineState::ImageAssembled => write!(f, "image-assembled"),
        }
    }
}

/// Everything a successful run leaves behind.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub staged: stage::StagedArtifacts,
    pub image: AssembledImage,
}

struct StepOutputs {
    staged: stage::StagedArtifacts,
    image: AssembledImage,
}

/// The build-and-containerize pipeline for one configuration.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the full pipeline once.
    ///
    /// The reached state, artifact digests and failure step (if any) are
    /// recorded in the run's `run-manifest.json` either way.
    pub fn run(&self) -> Result<RunOutcome> {
        let runs_root = &self.config.runs.root;
        fs::create_dir_all(runs_root)
            .with_context(|| format!("creating runs root '{}'", runs_root.display()))?;
        let _lock = RunsLock::acquire(runs_root)?;

        let run_id = new_run_id();
        let run_dir = runs_root.join(&run_id);
        let staging_dir = run_dir.join("staging");
        fs::create_dir_all(&staging_dir)
            .with_context(|| format!("creating staging directory '{}'", staging_dir.display()))?;

        let mut meta = runs::RunMetadata {
            run_id: run_id.clone(),
            status: "running".to_string(),
            state: PipelineState::SourceReady.to_string(),
            created_at_utc: now_utc()?,
            finished_at_utc: None,
            artifacts: Default::default(),
            image_tag: None,
            failed_step: None,
        };
        runs::write_manifest(&run_dir, &meta)?;
        println!("[run {}] pipeline starting", run_id);

        let result = self.execute(&run_dir, &staging_dir, &mut meta);

        meta.finished_at_utc = Some(now_utc()?);
        match &result {
            Ok(_) => meta.status = "success".to_string(),
            Err(err) => {
                meta.status = "failed".to_string();
                meta.failed_step = Some(err.step().to_string());
            }
        }
        runs::write_manifest(&run_dir, &meta)?;

        let outputs = result.map_err(anyhow::Error::new)?;
        println!("[run {}] pipeline finished: {}", run_id, outputs.image.tag);
        Ok(RunOutcome {
            run_id,
            run_dir,
            staged: outputs.staged,
            image: outputs.image,
        })
    }

    fn execute(
        &self,
        run_dir: &Path,
        staging_dir: &Path,
        meta: &mut runs::RunMetadata,
    ) -> Result<StepOutputs, PipelineError> {
        let built = builder::build_release(&self.config.source).map_err(PipelineError::Build)?;
        meta.state = PipelineState::Built.to_string();

        let spec = chain_spec::generate_spec(&built, &self.config.chain_spec, run_dir)
            .map_err(PipelineError::SpecGeneration)?;
        meta.state = PipelineState::SpecGenerated.to_string();

        let staged = stage::stage_artifacts(&built, &spec, staging_dir)
            .map_err(PipelineError::Staging)?;
        for path in [&staged.binary, &staged.spec] {
            let digest = sha256_file(path).map_err(PipelineError::Staging)?;
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            meta.artifacts.insert(name, digest);
        }
        meta.state = PipelineState::Staged.to_string();

        let manifest = ImageManifest::from_config(
            &self.config.image,
            staged.binary_file_name(),
            staged.spec_file_name(),
        )
        .map_err(PipelineError::ImageAssembly)?;
        let image = assemble_image(self.config.image.engine, &manifest, &staged)
            .map_err(PipelineError::ImageAssembly)?;
        meta.state = PipelineState::ImageAssembled.to_string();
        meta.image_tag = Some(image.tag.clone());

        Ok(StepOutputs { staged, image })
    }
}

/// RAII guard: exclusive advisory lock on the runs root.
///
/// Unlocks and removes the lock file on drop.
pub struct RunsLock {
    _file: File,
    path: PathBuf,
}

impl RunsLock {
    pub fn acquire(runs_root: &Path) -> Result<Self> {
        let path = runs_root.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("creating lock file '{}'", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            bail!(
                "runs root is locked by another pipeline invocation: {}",
                path.display()
            );
        }

        Ok(Self { _file: file, path })
    }
}

impl Drop for RunsLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn new_run_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("run-{}-{:09}", now.as_secs(), now.subsec_nanos())
}

fn now_utc() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("formatting run timestamp")
}

pub(crate) fn sha256_file(path: &Path) -> Result<String> {
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
