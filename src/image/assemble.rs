//! Image assembly step.
//!
//! Checks the staged build context, emits the rendered build file into it,
//! and drives the external container engine. No container is started; the
//! only side effect outside the engine's build context is the image itself.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::config::ContainerEngine;
use crate::image::{dockerfile, ImageManifest};
use crate::pipeline::stage::StagedArtifacts;
use crate::process::Cmd;

pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// The assembled, tagged container image.
#[derive(Debug, Clone)]
pub struct AssembledImage {
    pub tag: String,
    pub engine: ContainerEngine,
}

/// Render the build file into the staging context.
pub fn write_build_file(
    manifest: &ImageManifest,
    staged: &StagedArtifacts,
) -> Result<PathBuf> {
    let rendered = dockerfile::render(manifest);
    let path = staged.dir.join(DOCKERFILE_NAME);
    let tmp = staged.dir.join(format!(".{}.tmp", DOCKERFILE_NAME));
    fs::write(&tmp, rendered)
        .with_context(|| format!("writing build file '{}'", tmp.display()))?;
    fs::rename(&tmp, &path)
        .with_context(|| format!("moving build file into '{}'", path.display()))?;
    Ok(path)
}

/// Assemble the container image from the staged context.
///
/// An unavailable base layer or a failing account-creation step surfaces
/// through the engine's exit status and stderr, reported verbatim.
pub fn assemble_image(
    engine: ContainerEngine,
    manifest: &ImageManifest,
    staged: &StagedArtifacts,
) -> Result<AssembledImage> {
    manifest.validate()?;

    for artifact in &manifest.artifacts {
        let path = staged.dir.join(&artifact.file_name);
        if !path.is_file() {
            bail!(
                "staged artifact missing from build context: {}",
                path.display()
            );
        }
    }

    let build_file = write_build_file(manifest, staged)?;

    println!(
        "[image] assembling {} with {}...",
        manifest.tag,
        engine.command()
    );
    Cmd::new(engine.command())
        .args(["build", "--tag"])
        .arg(&manifest.tag)
        .arg("--file")
        .arg_path(&build_file)
        .arg(".")
        .current_dir(&staged.dir)
        .error_msg("container image build failed")
        .run()?;

    println!("  Assembled: {}", manifest.tag);
    Ok(AssembledImage {
        tag: manifest.tag.clone(),
        engine,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::tests::test_manifest;
    use tempfile::TempDir;

    fn staged_context(temp: &TempDir, with_artifacts: bool) -> StagedArtifacts {
        let dir = temp.path().join("staging");
        fs::create_dir_all(&dir).unwrap();
        let binary = dir.join("polkadot");
        let spec = dir.join("kusama-local.json");
        if with_artifacts {
            fs::write(&binary, b"\x7fELF fake node").unwrap();
            fs::write(&spec, b"{\"name\":\"Kusama Local\"}").unwrap();
        }
        StagedArtifacts { dir, binary, spec }
    }

    #[test]
    fn test_write_build_file_lands_in_context() {
        let temp = TempDir::new().unwrap();
        let staged = staged_context(&temp, true);

        let path = write_build_file(&test_manifest(), &staged).unwrap();
        assert_eq!(path, staged.dir.join("Dockerfile"));

        let rendered = fs::read_to_string(&path).unwrap();
        assert!(rendered.starts_with("FROM "));
    }

    #[test]
    fn test_missing_staged_artifact_fails_before_engine_runs() {
        let temp = TempDir::new().unwrap();
        let staged = staged_context(&temp, false);

        let err = assemble_image(ContainerEngine::Docker, &test_manifest(), &staged).unwrap_err();
        assert!(err.to_string().contains("staged artifact missing"));
        assert!(
            !staged.dir.join("Dockerfile").exists(),
            "no build file is written for an incomplete context"
        );
    }
}
