//! Pipeline failure kinds.

use thiserror::Error;

/// Terminal failure of one pipeline step.
///
/// Every kind halts the pipeline in its current state; nothing is retried
/// and nothing is rolled back. The wrapped error carries the external
/// command line, its exit status and its stderr.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("release build failed")]
    Build(#[source] anyhow::Error),

    #[error("chain specification generation failed")]
    SpecGeneration(#[source] anyhow::Error),

    #[error("artifact staging failed")]
    Staging(#[source] anyhow::Error),

    #[error("image assembly failed")]
    ImageAssembly(#[source] anyhow::Error),
}

impl PipelineError {
    /// Name of the failing step, for run manifests and operator logs.
    pub fn step(&self) -> &'static str {
        match self {
            PipelineError::Build(_) => "build",
            PipelineError::SpecGeneration(_) => "spec-generation",
            PipelineError::Staging(_) => "staging",
            PipelineError::ImageAssembly(_) => "image-assembly",
        }
    }
}
