//! Chain specification export step.
//!
//! Runs the built binary in spec-export mode and freezes its standard
//! output as the chain specification document. The captured bytes are
//! written verbatim (no re-serialization), so for a fixed binary and fixed
//! inputs two exports produce byte-identical files.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ChainSpecConfig;
use crate::pipeline::builder::BuiltBinary;
use crate::process::Cmd;

/// A frozen chain specification document.
#[derive(Debug, Clone)]
pub struct GeneratedSpec {
    pub path: PathBuf,
    /// Display name of the chain, when the document carries one.
    pub name: Option<String>,
}

/// Export the chain specification for the configured profile.
///
/// The export is a pure transformation: the binary is run with
/// `build-spec --chain <profile>` (plus `--disable-default-bootnode` when
/// configured), its stdout is required to be a JSON object, and exactly
/// those bytes are written to `<out_dir>/<file_name>` via a temporary file
/// and rename. An interrupted export leaves no partial document behind.
pub fn generate_spec(
    binary: &BuiltBinary,
    config: &ChainSpecConfig,
    out_dir: &Path,
) -> Result<GeneratedSpec> {
    if !binary.is_valid() {
        bail!(
            "release binary is missing or not executable: {}",
            binary.path.display()
        );
    }

    println!(
        "[spec] exporting chain specification for '{}'...",
        config.profile
    );

    let mut cmd = Cmd::new(&binary.path)
        .args(["build-spec", "--chain"])
        .arg(&config.profile);
    if config.disable_default_bootnode {
        cmd = cmd.arg("--disable-default-bootnode");
    }
    let result = cmd
        .error_msg("chain specification export failed")
        .run()?;

    let value: serde_json::Value = serde_json::from_str(&result.stdout)
        .context("specification output is not well-formed JSON")?;
    if !value.is_object() {
        bail!("specification output is not a JSON object");
    }
    let name = value
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory '{}'", out_dir.display()))?;
    let path = out_dir.join(config.spec_file_name());
    let tmp = out_dir.join(format!(".{}.tmp", config.spec_file_name()));
    fs::write(&tmp, result.stdout.as_bytes())
        .with_context(|| format!("writing specification to '{}'", tmp.display()))?;
    fs::rename(&tmp, &path)
        .with_context(|| format!("moving specification into '{}'", path.display()))?;

    if let Some(name) = &name {
        println!("  Chain: {}", name);
    }
    println!("  Wrote: {}", path.display());

    Ok(GeneratedSpec { path, name })
}
