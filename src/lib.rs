//! A slice of a Bazel-like build tool: the per-target analysis environment
//! that tracks artifacts and actions, and the boot-time option processor
//! that turns `.blazerc` files and argv into a server-bound argument vector.

#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::clone_on_ref_ptr)]

pub mod action;
pub mod analysis;
pub mod artifact;
pub mod error;
pub mod options;
pub mod skyframe;
pub mod workspace_status;

pub use action::Action;
pub use analysis::{
    AnalysisEnvironmentConfig, ArtifactOrigin, CachingAnalysisEnvironment, ErrorSink,
    TargetDescriptor,
};
pub use artifact::{Artifact, ArtifactFactory, ArtifactOwner, InterningArtifactFactory, Root};
pub use error::{ExitCode, OptionsError};
pub use options::{OptionProcessor, ProcessEnvironment, TerminalInfo};
pub use skyframe::{MissingDependency, SkyframeEnvironment};
pub use workspace_status::WorkspaceStatusProvider;
