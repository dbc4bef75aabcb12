//! Declarative container image manifest.
//!
//! The manifest describes WHAT the image contains - base layer, service
//! account, data volume, staged artifacts, ports, start command - and
//! [`ImageManifest::directives`] lowers it to an ordered sequence of
//! [`Directive`]s. Rendering ([`dockerfile`]) and assembly ([`assemble`])
//! interpret the directives; they never decide ordering themselves.
//!
//! Ordering rules encoded here:
//! - account and directory creation precede artifact copy, so ownership
//!   assignment on copy succeeds;
//! - attack-surface removal precedes artifact copy, so it can never delete
//!   a staged file;
//! - permission fixing follows artifact copy.

pub mod assemble;
pub mod dockerfile;

use anyhow::{bail, Result};

use crate::config::{AccountConfig, ImageConfig};

/// Non-root identity the node process runs as inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccount {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub shell: String,
    pub home: String,
}

impl ServiceAccount {
    /// `user:group` spec used for ownership assignment.
    pub fn owner(&self) -> String {
        format!("{}:{}", self.name, self.name)
    }
}

impl From<&AccountConfig> for ServiceAccount {
    fn from(config: &AccountConfig) -> Self {
        Self {
            name: config.name.clone(),
            uid: config.uid,
            gid: config.gid,
            shell: config.shell.clone(),
            home: config.home.clone(),
        }
    }
}

/// One staged file copied into the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// File name inside the staging directory (the build context).
    pub file_name: String,
    /// Absolute destination path inside the image.
    pub dest: String,
    pub executable: bool,
}

/// Ordered, engine-agnostic image-build operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    From(String),
    CreateAccount(ServiceAccount),
    CreateDir { path: String, owner: Option<String> },
    Symlink { link: String, target: String },
    RemovePaths(Vec<String>),
    CopyOwned { file_name: String, dest: String, owner: String },
    MarkExecutable(String),
    SwitchUser(String),
    Expose(Vec<u16>),
    Volume(String),
    Command(String),
}

/// Everything the image assembler needs to know.
#[derive(Debug, Clone)]
pub struct ImageManifest {
    pub base: String,
    pub tag: String,
    pub account: ServiceAccount,
    /// In-container mount point of the external data volume.
    pub data_dir: String,
    /// Path under the account home symlinked to `data_dir`.
    pub local_data_path: String,
    pub remove_paths: Vec<String>,
    pub artifacts: Vec<ArtifactSpec>,
    pub ports: Vec<u16>,
    /// Absolute path of the binary executed at container start.
    pub command: String,
}

impl ImageManifest {
    /// Build the manifest for a staged binary and specification.
    pub fn from_config(
        config: &ImageConfig,
        binary_file_name: &str,
        spec_file_name: &str,
    ) -> Result<Self> {
        if binary_file_name.is_empty() || spec_file_name.is_empty() {
            bail!("staged artifact file names must not be empty");
        }

        let account = ServiceAccount::from(&config.account);
        let home = account.home.trim_end_matches('/').to_string();
        let binary_dest = format!("{}/{}", home, binary_file_name);
        let spec_dest = format!("{}/{}", home, spec_file_name);

        let manifest = Self {
            base: config.base.clone(),
            tag: config.tag.clone(),
            account,
            data_dir: config.data_dir.clone(),
            local_data_path: config.local_data_path.clone(),
            remove_paths: config.remove_paths.clone(),
            artifacts: vec![
                ArtifactSpec {
                    file_name: binary_file_name.to_string(),
                    dest: binary_dest.clone(),
                    executable: true,
                },
                ArtifactSpec {
                    file_name: spec_file_name.to_string(),
                    dest: spec_dest,
                    executable: false,
                },
            ],
            ports: config.ports.clone(),
            command: binary_dest,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reject manifests that would violate the image invariants.
    pub fn validate(&self) -> Result<()> {
        if self.account.name == "root" || self.account.uid == 0 || self.account.gid == 0 {
            bail!(
                "service account must be unprivileged, got '{}' ({}:{})",
                self.account.name,
                self.account.uid,
                self.account.gid
            );
        }
        if !self.data_dir.starts_with('/') {
            bail!("data directory must be absolute, got '{}'", self.data_dir);
        }
        if !self.command.starts_with('/') {
            bail!("start command must be an absolute path, got '{}'", self.command);
        }
        if self.ports.is_empty() {
            bail!("at least one listened-on port must be declared");
        }
        if !self
            .artifacts
            .iter()
            .any(|a| a.executable && a.dest == self.command)
        {
            bail!(
                "start command '{}' does not match any executable staged artifact",
                self.command
            );
        }
        Ok(())
    }

    /// Lower the manifest to the ordered directive sequence.
    pub fn directives(&self) -> Vec<Directive> {
        let home = self.account.home.trim_end_matches('/');
        let link = format!("{}/{}", home, self.local_data_path);

        let mut ops = vec![
            Directive::From(self.base.clone()),
            Directive::CreateAccount(self.account.clone()),
        ];

        // The link's parent must exist; useradd -m already created the home.
        if let Some((parent, _)) = link.rsplit_once('/') {
            if parent != home {
                ops.push(Directive::CreateDir {
                    path: parent.to_string(),
                    owner: None,
                });
            }
        }
        ops.push(Directive::CreateDir {
            path: self.data_dir.clone(),
            owner: Some(self.account.owner()),
        });
        ops.push(Directive::Symlink {
            link,
            target: self.data_dir.clone(),
        });

        if !self.remove_paths.is_empty() {
            ops.push(Directive::RemovePaths(self.remove_paths.clone()));
        }

        for artifact in &self.artifacts {
            ops.push(Directive::CopyOwned {
                file_name: artifact.file_name.clone(),
                dest: artifact.dest.clone(),
                owner: self.account.owner(),
            });
        }
        for artifact in self.artifacts.iter().filter(|a| a.executable) {
            ops.push(Directive::MarkExecutable(artifact.dest.clone()));
        }

        ops.push(Directive::SwitchUser(self.account.name.clone()));
        ops.push(Directive::Expose(self.ports.clone()));
        ops.push(Directive::Volume(self.data_dir.clone()));
        ops.push(Directive::Command(self.command.clone()));
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_manifest() -> ImageManifest {
        let config = ImageConfig {
            tag: "relaychain/node:latest".to_string(),
            base: "phusion/baseimage:0.10.0".to_string(),
            engine: crate::config::ContainerEngine::Docker,
            account: AccountConfig::default(),
            data_dir: "/data".to_string(),
            local_data_path: ".local/share/polkadot".to_string(),
            remove_paths: vec!["/usr/bin".to_string(), "/usr/sbin".to_string()],
            ports: vec![30333, 9933, 9944],
        };
        ImageManifest::from_config(&config, "polkadot", "kusama-local.json").unwrap()
    }

    fn position(ops: &[Directive], pred: impl Fn(&Directive) -> bool) -> usize {
        ops.iter().position(pred).expect("directive present")
    }

    #[test]
    fn test_from_config_destinations() {
        let manifest = test_manifest();
        assert_eq!(manifest.command, "/polkadot/polkadot");
        assert_eq!(manifest.artifacts[1].dest, "/polkadot/kusama-local.json");
    }

    #[test]
    fn test_account_creation_precedes_copy() {
        let ops = test_manifest().directives();
        let account = position(&ops, |d| matches!(d, Directive::CreateAccount(_)));
        let copy = position(&ops, |d| matches!(d, Directive::CopyOwned { .. }));
        assert!(account < copy);
    }

    #[test]
    fn test_removal_precedes_copy() {
        let ops = test_manifest().directives();
        let removal = position(&ops, |d| matches!(d, Directive::RemovePaths(_)));
        let copy = position(&ops, |d| matches!(d, Directive::CopyOwned { .. }));
        assert!(removal < copy, "removal after copy could delete staged files");
    }

    #[test]
    fn test_permission_fix_follows_copy() {
        let ops = test_manifest().directives();
        let chmod = position(&ops, |d| matches!(d, Directive::MarkExecutable(_)));
        let last_copy = ops
            .iter()
            .rposition(|d| matches!(d, Directive::CopyOwned { .. }))
            .unwrap();
        assert!(chmod > last_copy);
    }

    #[test]
    fn test_exactly_one_volume() {
        let ops = test_manifest().directives();
        let volumes: Vec<_> = ops
            .iter()
            .filter(|d| matches!(d, Directive::Volume(_)))
            .collect();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0], &Directive::Volume("/data".to_string()));
    }

    #[test]
    fn test_data_symlink_points_at_volume() {
        let ops = test_manifest().directives();
        assert!(ops.contains(&Directive::Symlink {
            link: "/polkadot/.local/share/polkadot".to_string(),
            target: "/data".to_string(),
        }));
    }

    #[test]
    fn test_declared_ports() {
        let ops = test_manifest().directives();
        assert!(ops.contains(&Directive::Expose(vec![30333, 9933, 9944])));
    }

    #[test]
    fn test_root_account_rejected() {
        let mut manifest = test_manifest();
        manifest.account.uid = 0;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_command_must_be_executable_artifact() {
        let mut manifest = test_manifest();
        manifest.command = "/polkadot/other".to_string();
        assert!(manifest.validate().is_err());
    }
}
