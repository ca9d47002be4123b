//! Artifact identity: the opaque file handles rule logic trades in.
//!
//! Artifacts are interned by an [`ArtifactFactory`] and compared structurally
//! on `(path, root, owner)`; the analysis environment never constructs one
//! directly, it only asks the factory for one and remembers that it did.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A root a path is relative to. `Source` artifacts live under the source
/// tree; derived roots are opaque handles minted by whatever owns the output
/// tree layout (out of scope here, per spec.md's Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Root {
    Source,
    Derived(u32),
}

/// Identity of the configured target that produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactOwner(pub String);

impl fmt::Display for ArtifactOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct ArtifactData {
    path: PathBuf,
    root: Root,
    owner: ArtifactOwner,
    is_source: bool,
}

/// Canonical identity of a file known to the build, source or derived.
///
/// Cloning an `Artifact` is cheap (it's `Arc`-backed); equality and hashing
/// are structural on the inner data, which is what lets two independently
/// produced handles to the "same" artifact compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Artifact(Arc<ArtifactData>);

impl Artifact {
    fn new(path: PathBuf, root: Root, owner: ArtifactOwner, is_source: bool) -> Artifact {
        Artifact(Arc::new(ArtifactData { path, root, owner, is_source }))
    }

    pub fn root_relative_path(&self) -> &Path {
        &self.0.path
    }

    pub fn root(&self) -> Root {
        self.0.root
    }

    pub fn owner(&self) -> &ArtifactOwner {
        &self.0.owner
    }

    pub fn is_source(&self) -> bool {
        self.0.is_source
    }

    /// Execution path, used only in diagnostic output (spec.md's
    /// `a.exec-path`). For this slice that's just the root-relative path.
    pub fn exec_path(&self) -> &Path {
        &self.0.path
    }
}

/// External collaborator (C1): canonicalizes `(path, root, owner) ->
/// Artifact` identity. Real implementations live outside this crate's scope
/// (package/output-tree layout is a Non-goal); this module only pins the
/// contract and ships one reference implementation used by tests and by
/// small standalone tools that don't have a real factory to plug in.
pub trait ArtifactFactory: Send + Sync {
    fn derived_artifact(&self, path: &Path, root: Root, owner: &ArtifactOwner) -> Artifact;
    fn fileset_artifact(&self, path: &Path, root: Root, owner: &ArtifactOwner) -> Artifact;
    fn special_metadata_artifact(
        &self,
        path: &Path,
        root: Root,
        owner: &ArtifactOwner,
        force_constant_metadata: bool,
        force_digest: bool,
    ) -> Artifact;
    fn source_artifact(&self, path: &Path, owner: &ArtifactOwner) -> Artifact;
}

/// Reference [`ArtifactFactory`] that interns artifacts behind a mutex, the
/// same shape as the path -> package cache `PackageMap` keeps in the
/// teacher's build-plan code: a plain `Mutex<HashMap<..>>` guarding a
/// canonicalizing lookup, nothing fancier is needed since this is only ever
/// consulted through the narrow contract above.
#[derive(Default)]
pub struct InterningArtifactFactory {
    interned: Mutex<HashMap<(PathBuf, Root, ArtifactOwner, bool), Artifact>>,
}

impl InterningArtifactFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(
        &self,
        path: &Path,
        root: Root,
        owner: &ArtifactOwner,
        is_source: bool,
        // special-metadata artifacts are deliberately excluded from the
        // intern table: spec.md says their provenance is managed
        // externally, so every call mints a fresh handle.
        track: bool,
    ) -> Artifact {
        if !track {
            return Artifact::new(path.to_path_buf(), root, owner.clone(), is_source);
        }
        let key = (path.to_path_buf(), root, owner.clone(), is_source);
        let mut interned = self.interned.lock().unwrap();
        interned
            .entry(key)
            .or_insert_with(|| Artifact::new(path.to_path_buf(), root, owner.clone(), is_source))
            .clone()
    }
}

impl ArtifactFactory for InterningArtifactFactory {
    fn derived_artifact(&self, path: &Path, root: Root, owner: &ArtifactOwner) -> Artifact {
        self.intern(path, root, owner, false, true)
    }

    fn fileset_artifact(&self, path: &Path, root: Root, owner: &ArtifactOwner) -> Artifact {
        self.intern(path, root, owner, false, true)
    }

    fn special_metadata_artifact(
        &self,
        path: &Path,
        root: Root,
        owner: &ArtifactOwner,
        _force_constant_metadata: bool,
        _force_digest: bool,
    ) -> Artifact {
        self.intern(path, root, owner, false, false)
    }

    fn source_artifact(&self, path: &Path, owner: &ArtifactOwner) -> Artifact {
        self.intern(path, Root::Source, owner, true, true)
    }
}
