//! Build actions, as seen from the analysis environment's side: just enough
//! to drive the orphan-artifact check and local-generating-action lookups.
//! Execution semantics are a Non-goal (spec.md §1).

use crate::artifact::Artifact;

/// A declared build step. Output sets of distinct actions are disjoint; that
/// invariant is enforced elsewhere (by whatever registers actions into the
/// graph) and simply relied upon here.
#[derive(Debug, Clone)]
pub struct Action {
    mnemonic: String,
    class_name: String,
    outputs: Vec<Artifact>,
}

impl Action {
    pub fn new(
        class_name: impl Into<String>,
        mnemonic: impl Into<String>,
        outputs: Vec<Artifact>,
    ) -> Action {
        Action { class_name: class_name.into(), mnemonic: mnemonic.into(), outputs }
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn outputs(&self) -> &[Artifact] {
        &self.outputs
    }
}
