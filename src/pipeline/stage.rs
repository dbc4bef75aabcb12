//! Artifact staging step.
//!
//! Copies the release binary and the frozen chain specification into the
//! run's staging directory, which later becomes the image build context.
//! Staged copies are replaced wholesale on every run (last run wins) and
//! written via temporary files, so an interrupted copy never masquerades
//! as a staged artifact.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::pipeline::builder::BuiltBinary;
use crate::pipeline::chain_spec::GeneratedSpec;

/// The staged build context for image assembly.
#[derive(Debug, Clone)]
pub struct StagedArtifacts {
    pub dir: PathBuf,
    pub binary: PathBuf,
    pub spec: PathBuf,
}

impl StagedArtifacts {
    pub fn binary_file_name(&self) -> &str {
        file_name_str(&self.binary)
    }

    pub fn spec_file_name(&self) -> &str {
        file_name_str(&self.spec)
    }
}

fn file_name_str(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
}

/// Copy the binary and the specification into the staging directory.
pub fn stage_artifacts(
    binary: &BuiltBinary,
    spec: &GeneratedSpec,
    staging_dir: &Path,
) -> Result<StagedArtifacts> {
    if !binary.path.is_file() {
        bail!("release binary not found: {}", binary.path.display());
    }
    if !spec.path.is_file() {
        bail!("chain specification not found: {}", spec.path.display());
    }

    fs::create_dir_all(staging_dir)
        .with_context(|| format!("creating staging directory '{}'", staging_dir.display()))?;

    let staged_binary = copy_into(&binary.path, staging_dir)?;
    make_executable(&staged_binary)?;
    let staged_spec = copy_into(&spec.path, staging_dir)?;

    let staged = StagedArtifacts {
        dir: staging_dir.to_path_buf(),
        binary: staged_binary,
        spec: staged_spec,
    };
    verify_staging(&staged)?;

    println!(
        "[stage] staged {} and {} into {}",
        staged.binary_file_name(),
        staged.spec_file_name(),
        staging_dir.display()
    );
    Ok(staged)
}

/// Copy a file into a directory, replacing any previous copy.
fn copy_into(src: &Path, dir: &Path) -> Result<PathBuf> {
    let file_name = src
        .file_name()
        .with_context(|| format!("source has no file name: {}", src.display()))?;
    let dst = dir.join(file_name);

    // Last run wins: clear the stale copy before writing the new one.
    if dst.exists() || dst.is_symlink() {
        fs::remove_file(&dst)
            .with_context(|| format!("removing stale staged copy '{}'", dst.display()))?;
    }

    let tmp = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));
    fs::copy(src, &tmp)
        .with_context(|| format!("copying {} to {}", src.display(), tmp.display()))?;
    fs::rename(&tmp, &dst)
        .with_context(|| format!("moving staged copy into '{}'", dst.display()))?;
    Ok(dst)
}

/// Make a file executable (chmod +x).
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o111);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

/// Check that the staging directory holds exactly the two artifacts, both
/// readable, with the executable bit intact on the binary.
pub fn verify_staging(staged: &StagedArtifacts) -> Result<()> {
    let mut found = Vec::new();
    for entry in WalkDir::new(&staged.dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        found.push(entry.file_name().to_string_lossy().into_owned());
    }
    found.sort();

    let mut expected = vec![
        staged.binary_file_name().to_string(),
        staged.spec_file_name().to_string(),
    ];
    expected.sort();

    if found != expected {
        bail!(
            "staging directory '{}' must contain exactly the binary and the specification, found: {}",
            staged.dir.display(),
            found.join(", ")
        );
    }

    for path in [&staged.binary, &staged.spec] {
        fs::File::open(path)
            .with_context(|| format!("staged artifact not readable: {}", path.display()))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&staged.binary)?.permissions().mode();
        if mode & 0o111 == 0 {
            bail!(
                "staged binary lost its executable bit: {}",
                staged.binary.display()
            );
        }
    }

    Ok(())
}
