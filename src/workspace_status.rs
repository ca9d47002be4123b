//! External collaborator (C3): the eager alternative to a Skyframe lookup
//! for build-info artifacts. When one of these is supplied at construction,
//! the analysis environment never has to ask Skyframe (and so can never be
//! told to restart) for the stable/volatile workspace-status artifacts.

use crate::artifact::Artifact;
use crate::skyframe::BuildInfoCollection;

pub trait WorkspaceStatusProvider: Send + Sync {
    /// The artifact holding stable workspace status (rarely changes across
    /// builds: workspace name, stable env vars, etc).
    fn stable_artifact(&self) -> Artifact;
    /// The artifact holding volatile workspace status (changelist, build
    /// timestamp, user, anything that makes two otherwise-identical builds
    /// produce different bytes when stamped).
    fn volatile_artifact(&self) -> Artifact;
    /// The pre-computed stamped/redacted artifact lists for `(key,
    /// configuration)`, used by `get-build-info(rule-context, key)` when an
    /// eager provider is wired up instead of Skyframe.
    fn build_info_collection(&self, key: &str, configuration: &str) -> BuildInfoCollection;
}
