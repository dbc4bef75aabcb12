//! Pipeline configuration.
//!
//! Every path, profile name and flag the pipeline uses flows in through
//! [`PipelineConfig`], loaded from a TOML file. Nothing is resolved from
//! the ambient environment, so one host can run several differently
//! configured pipelines side by side.
//!
//! ```toml
//! [source]
//! manifest_dir = "node"
//! package = "polkadot"
//!
//! [chain_spec]
//! profile = "kusama-local"
//!
//! [image]
//! tag = "relaychain/node:latest"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Container engine used to assemble the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerEngine {
    Docker,
    Podman,
}

impl Default for ContainerEngine {
    fn default() -> Self {
        ContainerEngine::Docker
    }
}

impl ContainerEngine {
    /// Command name of the engine on the host.
    pub fn command(&self) -> &'static str {
        match self {
            ContainerEngine::Docker => "docker",
            ContainerEngine::Podman => "podman",
        }
    }
}

/// Source tree and cargo package to build.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Directory holding the workspace `Cargo.toml`.
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,
    /// Cargo package to build with the release profile.
    pub package: String,
    /// Binary name, when it differs from the package name.
    pub binary: Option<String>,
}

impl SourceConfig {
    pub fn binary_name(&self) -> &str {
        self.binary.as_deref().unwrap_or(&self.package)
    }
}

/// Chain-specification export inputs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSpecConfig {
    /// Named chain profile passed to `build-spec --chain`.
    pub profile: String,
    /// Suppress the default network bootstrap peers in the exported
    /// specification.
    #[serde(default = "default_true")]
    pub disable_default_bootnode: bool,
    /// File name of the frozen specification, when it differs from
    /// `<profile>.json`.
    pub file_name: Option<String>,
}

impl ChainSpecConfig {
    pub fn spec_file_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| format!("{}.json", self.profile))
    }
}

/// Where pipeline runs keep their staging directories and manifests.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunsConfig {
    #[serde(default = "default_runs_root")]
    pub root: PathBuf,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            root: default_runs_root(),
        }
    }
}

/// Non-root service account the node runs as inside the image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    #[serde(default = "default_account_name")]
    pub name: String,
    #[serde(default = "default_account_id")]
    pub uid: u32,
    #[serde(default = "default_account_id")]
    pub gid: u32,
    #[serde(default = "default_account_shell")]
    pub shell: String,
    #[serde(default = "default_account_home")]
    pub home: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            name: default_account_name(),
            uid: default_account_id(),
            gid: default_account_id(),
            shell: default_account_shell(),
            home: default_account_home(),
        }
    }
}

/// Image-assembly manifest inputs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    /// Tag applied to the assembled image.
    pub tag: String,
    /// Base filesystem image reference.
    #[serde(default = "default_base_image")]
    pub base: String,
    #[serde(default)]
    pub engine: ContainerEngine,
    #[serde(default)]
    pub account: AccountConfig,
    /// In-container mount point for the externally managed data volume.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Path under the account home symlinked to `data_dir`.
    #[serde(default = "default_local_data_path")]
    pub local_data_path: String,
    /// System paths removed from the image to shrink attack surface.
    #[serde(default = "default_remove_paths")]
    pub remove_paths: Vec<String>,
    /// Ports the node listens on.
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
}

/// Complete configuration of one pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub chain_spec: ChainSpecConfig,
    #[serde(default)]
    pub runs: RunsConfig,
    pub image: ImageConfig,
}

impl PipelineConfig {
    /// Load a configuration file, resolving relative paths against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config '{}'", path.display()))?;
        let mut config: PipelineConfig = toml::from_str(&bytes)
            .with_context(|| format!("parsing pipeline config '{}'", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.source.manifest_dir = resolve_path(base, &config.source.manifest_dir);
        config.runs.root = resolve_path(base, &config.runs.root);

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a valid image.
    pub fn validate(&self) -> Result<()> {
        if self.source.package.trim().is_empty() {
            bail!("source.package must not be empty");
        }
        if self.chain_spec.profile.trim().is_empty() {
            bail!("chain_spec.profile must not be empty");
        }
        if self.image.tag.trim().is_empty() {
            bail!("image.tag must not be empty");
        }
        if self.image.ports.is_empty() {
            bail!("image.ports must declare at least one listened-on port");
        }

        let account = &self.image.account;
        if account.name == "root" || account.uid == 0 || account.gid == 0 {
            bail!(
                "image.account must be an unprivileged identity, got '{}' ({}:{})",
                account.name,
                account.uid,
                account.gid
            );
        }
        if !account.home.starts_with('/') {
            bail!("image.account.home must be absolute, got '{}'", account.home);
        }
        if !self.image.data_dir.starts_with('/') {
            bail!(
                "image.data_dir must be absolute, got '{}'",
                self.image.data_dir
            );
        }
        if self.image.local_data_path.starts_with('/') {
            bail!(
                "image.local_data_path must be relative to the account home, got '{}'",
                self.image.local_data_path
            );
        }
        Ok(())
    }
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_runs_root() -> PathBuf {
    PathBuf::from(".pipeline-runs")
}

fn default_account_name() -> String {
    "polkadot".to_string()
}

fn default_account_id() -> u32 {
    1000
}

fn default_account_shell() -> String {
    "/bin/sh".to_string()
}

fn default_account_home() -> String {
    "/polkadot".to_string()
}

fn default_base_image() -> String {
    "phusion/baseimage:0.10.0".to_string()
}

fn default_data_dir() -> String {
    "/data".to_string()
}

fn default_local_data_path() -> String {
    ".local/share/polkadot".to_string()
}

fn default_remove_paths() -> Vec<String> {
    vec!["/usr/bin".to_string(), "/usr/sbin".to_string()]
}

fn default_ports() -> Vec<u16> {
    vec![30333, 9933, 9944]
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [source]
        package = "polkadot"

        [chain_spec]
        profile = "kusama-local"

        [image]
        tag = "relaychain/node:latest"
    "#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: PipelineConfig = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.source.binary_name(), "polkadot");
        assert!(config.chain_spec.disable_default_bootnode);
        assert_eq!(config.chain_spec.spec_file_name(), "kusama-local.json");
        assert_eq!(config.image.engine, ContainerEngine::Docker);
        assert_eq!(config.image.account.name, "polkadot");
        assert_eq!(config.image.account.uid, 1000);
        assert_eq!(config.image.data_dir, "/data");
        assert_eq!(config.image.local_data_path, ".local/share/polkadot");
        assert_eq!(config.image.remove_paths, vec!["/usr/bin", "/usr/sbin"]);
        assert_eq!(config.image.ports, vec![30333, 9933, 9944]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml_str = format!("{}\nnot_a_field = 1\n", MINIMAL);
        assert!(toml::from_str::<PipelineConfig>(&toml_str).is_err());
    }

    #[test]
    fn test_root_account_rejected() {
        let toml_str = r#"
            [source]
            package = "polkadot"

            [chain_spec]
            profile = "kusama-local"

            [image]
            tag = "relaychain/node:latest"

            [image.account]
            name = "root"
            uid = 0
            gid = 0
        "#;
        let config: PipelineConfig = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unprivileged"));
    }

    #[test]
    fn test_relative_local_data_path_required() {
        let mut config: PipelineConfig = toml::from_str(MINIMAL).unwrap();
        config.image.local_data_path = "/absolute".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let temp = tempfile::TempDir::new().unwrap();
        let config_path = temp.path().join("pipeline.toml");
        std::fs::write(&config_path, MINIMAL).unwrap();

        let config = PipelineConfig::load(&config_path).unwrap();
        assert_eq!(config.source.manifest_dir, temp.path().join("."));
        assert_eq!(config.runs.root, temp.path().join(".pipeline-runs"));
    }

    #[test]
    fn test_empty_profile_rejected() {
        let toml_str = r#"
            [source]
            package = "polkadot"

            [chain_spec]
            profile = "  "

            [image]
            tag = "relaychain/node:latest"
        "#;
        let config: PipelineConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }
}
