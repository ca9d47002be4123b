//! External collaborator (C2): a lazy, memoizing dependency-graph evaluator
//! that may answer a lookup with "not yet computed" rather than a value.
//! That's a first-class control signal, not a failure (see spec.md §5 and
//! the design note in §9), so lookups return [`SkyLookup`], and build-info
//! retrieval through it returns `Result<T, MissingDependency>`.

use crate::artifact::Artifact;

/// Keys the analysis environment asks Skyframe for. The two variants it
/// actually needs, per spec.md §4.1: the workspace-status node, and a
/// `BuildInfoCollection` node for a given rule-provided key and
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SkyKey {
    WorkspaceStatus,
    BuildInfoCollection { key: String, configuration: String },
}

/// A `BuildInfoCollection` node's payload: the stamped list embeds volatile
/// data (user, date, changelist); the redacted list omits it for
/// reproducibility. Which one the caller wants is a rule-context-derived
/// flag (spec.md §4.1, `get-build-info(rule-context, key)`).
#[derive(Debug, Clone)]
pub struct BuildInfoCollection {
    pub stamped: Vec<Artifact>,
    pub redacted: Vec<Artifact>,
}

impl BuildInfoCollection {
    pub fn select(&self, stamp: bool) -> &[Artifact] {
        if stamp {
            &self.stamped
        } else {
            &self.redacted
        }
    }
}

#[derive(Debug, Clone)]
pub enum SkyValue {
    WorkspaceStatus { stable: Artifact, volatile: Artifact },
    BuildInfoCollection(BuildInfoCollection),
}

/// The outcome of a single Skyframe lookup.
pub enum SkyLookup {
    Value(SkyValue),
    NotYetComputed,
}

/// Marker that a Skyframe-backed operation needs to restart once the
/// dependency it names has been computed. Not an error: callers must handle
/// it as a retry signal, never as a fatal failure (spec.md §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    pub key: SkyKey,
}

impl MissingDependency {
    pub fn new(key: SkyKey) -> MissingDependency {
        MissingDependency { key }
    }
}

pub trait SkyframeEnvironment: Send + Sync {
    fn get_value(&self, key: &SkyKey) -> SkyLookup;
}
