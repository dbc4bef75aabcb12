//! Build-and-containerize pipeline for relay-chain node images.
//!
//! The pipeline turns a node source tree into a hardened container image
//! in four sequential steps:
//!
//! - **Build** - compile the node package with the release profile.
//! - **Spec generation** - run the built binary in spec-export mode and
//!   freeze its output as the chain specification document.
//! - **Staging** - copy binary and specification into a per-run staging
//!   directory, the image build context.
//! - **Image assembly** - render a build file from a declarative manifest
//!   (non-root service account, data volume, attack-surface removal,
//!   exposed ports, fixed start command) and drive the container engine.
//!
//! # Architecture
//!
//! ```text
//! PipelineConfig (TOML)
//!     |
//!     v
//! Pipeline::run -- fs lock, per-run staging, run-manifest.json
//!     |
//!     +-- pipeline::builder      cargo build --release   -> BuiltBinary
//!     +-- pipeline::chain_spec   <binary> build-spec     -> GeneratedSpec
//!     +-- pipeline::stage        copy + verify           -> StagedArtifacts
//!     +-- image::assemble        render + engine build   -> AssembledImage
//! ```
//!
//! Multi-node deployment of the assembled image (volumes, networking,
//! topology) belongs to external orchestration tooling, not to this crate.

pub mod config;
pub mod error;
pub mod image;
pub mod pipeline;
pub mod preflight;
pub mod process;

pub use config::{ContainerEngine, PipelineConfig};
pub use error::PipelineError;
pub use image::{ArtifactSpec, Directive, ImageManifest, ServiceAccount};
pub use pipeline::{Pipeline, PipelineState, RunOutcome};
