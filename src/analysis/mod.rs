//! Core §A: the per-configured-target facade rule implementations use to
//! pull artifacts and push actions, sealed exactly once at the end of
//! analysis.
//!
//! State is modeled as the sum type the design note in spec.md §9 asks for
//! (`EnvState::Active` / `EnvState::Sealed`) rather than nulled-out fields;
//! every mutating or artifact-producing operation dispatches on it, so
//! misuse after `seal` is a `match` arm away from a panic instead of a
//! runtime null check.

mod origin;

pub use origin::ArtifactOrigin;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::action::Action;
use crate::artifact::{Artifact, ArtifactFactory, ArtifactOwner, Root};
use crate::skyframe::{MissingDependency, SkyKey, SkyLookup, SkyValue, SkyframeEnvironment};
use crate::workspace_status::WorkspaceStatusProvider;

/// Where a target's buffered rule errors (or the system-env passthrough) go.
/// `is_system_env` forces `has_errors()` to `false` regardless of what a
/// `Global` sink has seen (spec.md invariant I4); the flag, not the sink
/// variant, is what callers should branch on.
pub enum ErrorSink {
    Global,
    Buffered(Arc<Mutex<Vec<String>>>),
}

impl ErrorSink {
    pub fn buffered() -> ErrorSink {
        ErrorSink::Buffered(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        match self {
            ErrorSink::Global => log::error!("{}", message),
            ErrorSink::Buffered(errors) => errors.lock().unwrap().push(message),
        }
    }

    fn has_buffered_errors(&self) -> bool {
        match self {
            ErrorSink::Global => false,
            ErrorSink::Buffered(errors) => !errors.lock().unwrap().is_empty(),
        }
    }
}

/// Identifies the target being analyzed, purely for the orphan-check
/// diagnostic (spec.md S1: the message must name the target kind and label).
pub struct TargetDescriptor<'a> {
    pub kind: &'a str,
    pub label: &'a str,
}

struct ActiveState {
    handed_out: HashMap<Artifact, ArtifactOrigin>,
    registered_actions: Vec<Action>,
    skyframe: Option<Arc<dyn SkyframeEnvironment>>,
}

enum EnvState {
    Active(ActiveState),
    Sealed { registered_actions: Vec<Action> },
}

/// Construction parameters bundled so `CachingAnalysisEnvironment::new`
/// doesn't grow an unreadable positional-argument list as the collaborator
/// set grows (spec.md §4.1's "takes references to: ...").
pub struct AnalysisEnvironmentConfig {
    pub owner: ArtifactOwner,
    pub artifact_factory: Arc<dyn ArtifactFactory>,
    pub embedded_tools: Option<Arc<dyn ArtifactFactory>>,
    pub workspace_status: Option<Arc<dyn WorkspaceStatusProvider>>,
    pub skyframe: Option<Arc<dyn SkyframeEnvironment>>,
    pub is_system_env: bool,
    pub extended_sanity_checks: bool,
    pub allow_register_actions: bool,
    pub error_sink: ErrorSink,
}

/// Core §A / C4: per-target artifact tracker, action collector, sealer, and
/// orphan checker.
pub struct CachingAnalysisEnvironment {
    owner: ArtifactOwner,
    artifact_factory: Arc<dyn ArtifactFactory>,
    embedded_tools: Option<Arc<dyn ArtifactFactory>>,
    workspace_status: Option<Arc<dyn WorkspaceStatusProvider>>,
    is_system_env: bool,
    extended_sanity_checks: bool,
    allow_register_actions: bool,
    error_sink: ErrorSink,
    state: EnvState,
}

impl CachingAnalysisEnvironment {
    pub fn new(config: AnalysisEnvironmentConfig) -> CachingAnalysisEnvironment {
        CachingAnalysisEnvironment {
            owner: config.owner,
            artifact_factory: config.artifact_factory,
            embedded_tools: config.embedded_tools,
            workspace_status: config.workspace_status,
            is_system_env: config.is_system_env,
            extended_sanity_checks: config.extended_sanity_checks,
            allow_register_actions: config.allow_register_actions,
            error_sink: config.error_sink,
            state: EnvState::Active(ActiveState {
                handed_out: HashMap::new(),
                registered_actions: Vec::new(),
                skyframe: config.skyframe,
            }),
        }
    }

    pub fn owner(&self) -> &ArtifactOwner {
        &self.owner
    }

    fn active(&self, op: &'static str) -> &ActiveState {
        match &self.state {
            EnvState::Active(state) => state,
            EnvState::Sealed { .. } => {
                panic!("{op} called on a sealed analysis environment for {}", self.owner)
            }
        }
    }

    fn active_mut(&mut self, op: &'static str) -> &mut ActiveState {
        match &mut self.state {
            EnvState::Active(state) => state,
            EnvState::Sealed { .. } => {
                panic!("{op} called on a sealed analysis environment for {}", self.owner)
            }
        }
    }

    fn record_handed_out(&mut self, op: &'static str, artifact: Artifact) {
        let extended_sanity_checks = self.extended_sanity_checks;
        // `entry().or_insert_with` makes re-requesting the same artifact
        // idempotent on the map key (spec.md R1): the first-captured origin
        // wins and is never overwritten by a later call. The closure form
        // also keeps the (expensive, per spec.md §9) backtrace capture lazy,
        // so a repeat request for an already-tracked artifact never pays for
        // one.
        self.active_mut(op).handed_out.entry(artifact).or_insert_with(|| {
            if extended_sanity_checks {
                ArtifactOrigin::capture()
            } else {
                ArtifactOrigin::sentinel()
            }
        });
    }

    pub fn get_derived_artifact(&mut self, path: &Path, root: Root) -> Artifact {
        let artifact = self.artifact_factory.derived_artifact(path, root, &self.owner);
        self.record_handed_out("get-derived-artifact", artifact.clone());
        artifact
    }

    pub fn get_fileset_artifact(&mut self, path: &Path, root: Root) -> Artifact {
        let artifact = self.artifact_factory.fileset_artifact(path, root, &self.owner);
        self.record_handed_out("get-fileset-artifact", artifact.clone());
        artifact
    }

    /// Not tracked in `handed_out`: spec.md says these artifacts' provenance
    /// is managed externally, so they're exempt from the orphan check.
    pub fn get_special_metadata_artifact(
        &mut self,
        path: &Path,
        root: Root,
        force_constant_metadata: bool,
        force_digest: bool,
    ) -> Artifact {
        self.active("get-special-metadata-artifact");
        self.artifact_factory.special_metadata_artifact(
            path,
            root,
            &self.owner,
            force_constant_metadata,
            force_digest,
        )
    }

    pub fn get_embedded_tool_artifact(&mut self, name: &str) -> Artifact {
        self.active("get-embedded-tool-artifact");
        let tools = self
            .embedded_tools
            .clone()
            .expect("no embedded-tools bundle was supplied at construction");
        let artifact = tools.source_artifact(Path::new(name), &self.owner);
        self.record_handed_out("get-embedded-tool-artifact", artifact.clone());
        artifact
    }

    pub fn register_action(&mut self, action: Action) {
        let allow = self.allow_register_actions;
        let state = self.active_mut("register-action");
        if allow {
            state.registered_actions.push(action);
        }
        // Silent drop when registration is disabled is deliberate: a
        // preliminary analysis pass may run actions that would collide with
        // the real pass (spec.md §4.1).
    }

    pub fn get_local_generating_action(&self, artifact: &Artifact) -> Option<&Action> {
        assert!(
            self.allow_register_actions,
            "get-local-generating-action called without action registration enabled for {}",
            self.owner
        );
        let actions = match &self.state {
            EnvState::Active(state) => &state.registered_actions,
            EnvState::Sealed { registered_actions } => registered_actions,
        };
        actions.iter().find(|action| action.outputs().contains(artifact))
    }

    pub fn get_registered_actions(&self) -> &[Action] {
        match &self.state {
            EnvState::Active(state) => &state.registered_actions,
            EnvState::Sealed { registered_actions } => registered_actions,
        }
    }

    pub fn has_errors(&self) -> bool {
        if self.is_system_env {
            return false;
        }
        self.error_sink.has_buffered_errors()
    }

    pub fn report_error(&self, message: impl Into<String>) {
        self.error_sink.report(message);
    }

    pub fn get_build_info(&mut self) -> Result<Artifact, MissingDependency> {
        if let Some(provider) = self.workspace_status.clone() {
            return Ok(provider.stable_artifact());
        }
        match self.workspace_status_value()? {
            SkyValue::WorkspaceStatus { stable, .. } => Ok(stable),
            other => unreachable!("skyframe returned {:?} for WorkspaceStatus", describe(&other)),
        }
    }

    pub fn get_build_changelist(&mut self) -> Result<Artifact, MissingDependency> {
        if let Some(provider) = self.workspace_status.clone() {
            return Ok(provider.volatile_artifact());
        }
        match self.workspace_status_value()? {
            SkyValue::WorkspaceStatus { volatile, .. } => Ok(volatile),
            other => unreachable!("skyframe returned {:?} for WorkspaceStatus", describe(&other)),
        }
    }

    fn workspace_status_value(&self) -> Result<SkyValue, MissingDependency> {
        let skyframe = self
            .active("get-build-info")
            .skyframe
            .clone()
            .expect("neither a workspace-status provider nor a Skyframe environment was supplied");
        match skyframe.get_value(&SkyKey::WorkspaceStatus) {
            SkyLookup::Value(value) => Ok(value),
            SkyLookup::NotYetComputed => Err(MissingDependency::new(SkyKey::WorkspaceStatus)),
        }
    }

    /// `get-build-info(rule-context, key)` from spec.md §4.1: returns the
    /// stamped or redacted artifact list for `key`, depending on `stamp`
    /// (derived by the caller from the rule context).
    pub fn get_build_info_artifacts(
        &mut self,
        key: &str,
        configuration: &str,
        stamp: bool,
    ) -> Result<Vec<Artifact>, MissingDependency> {
        if let Some(provider) = self.workspace_status.clone() {
            let collection = provider.build_info_collection(key, configuration);
            return Ok(collection.select(stamp).to_vec());
        }

        let skyframe = self
            .active("get-build-info")
            .skyframe
            .clone()
            .expect("neither a workspace-status provider nor a Skyframe environment was supplied");
        let sky_key =
            SkyKey::BuildInfoCollection { key: key.to_string(), configuration: configuration.to_string() };
        match skyframe.get_value(&sky_key) {
            SkyLookup::Value(SkyValue::BuildInfoCollection(collection)) => {
                Ok(collection.select(stamp).to_vec())
            }
            SkyLookup::Value(other) => {
                unreachable!("skyframe returned {:?} for a BuildInfoCollection key", describe(&other))
            }
            SkyLookup::NotYetComputed => Err(MissingDependency::new(sky_key)),
        }
    }

    /// Runs the orphan-artifact check (when applicable) and transitions to
    /// `Sealed`, dropping the Skyframe handle so it can be reclaimed.
    pub fn seal(&mut self, target: &TargetDescriptor<'_>) {
        let prior = std::mem::replace(&mut self.state, EnvState::Sealed { registered_actions: Vec::new() });
        let (handed_out, registered_actions) = match prior {
            EnvState::Active(state) => (state.handed_out, state.registered_actions),
            EnvState::Sealed { .. } => panic!("seal called twice for {}", self.owner),
        };

        if self.allow_register_actions && !self.has_errors() {
            check_no_orphans(&self.owner, target, &handed_out, &registered_actions);
        }

        self.state = EnvState::Sealed { registered_actions };
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.state, EnvState::Sealed { .. })
    }
}

fn describe(value: &SkyValue) -> &'static str {
    match value {
        SkyValue::WorkspaceStatus { .. } => "WorkspaceStatus",
        SkyValue::BuildInfoCollection(_) => "BuildInfoCollection",
    }
}

fn check_no_orphans(
    owner: &ArtifactOwner,
    target: &TargetDescriptor<'_>,
    handed_out: &HashMap<Artifact, ArtifactOrigin>,
    registered_actions: &[Action],
) {
    let produced: HashSet<&Artifact> =
        registered_actions.iter().flat_map(|action| action.outputs()).collect();

    let orphans: Vec<String> = handed_out
        .iter()
        .filter(|(artifact, _)| !artifact.is_source())
        .filter(|(artifact, _)| !produced.contains(artifact))
        .map(|(artifact, origin)| format!("{}\n{}", artifact.exec_path().display(), origin))
        .collect();

    if orphans.is_empty() {
        return;
    }

    let census: String = registered_actions
        .iter()
        .map(|action| {
            let outputs: Vec<String> =
                action.outputs().iter().map(|a| a.exec_path().display().to_string()).collect();
            format!("{} [{}] -> {}", action.class_name(), action.mnemonic(), outputs.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n");

    panic!(
        "{kind} {label} (owner {owner}): These artifacts miss a generating action:\n{orphans}\n\n\
         Registered actions:\n{census}",
        kind = target.kind,
        label = target.label,
        owner = owner,
        orphans = orphans.join("\n\n"),
        census = if census.is_empty() { "<none>".to_string() } else { census },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::InterningArtifactFactory;
    use crate::skyframe::BuildInfoCollection;

    fn env(allow_register_actions: bool) -> CachingAnalysisEnvironment {
        CachingAnalysisEnvironment::new(AnalysisEnvironmentConfig {
            owner: ArtifactOwner("//x:y".to_string()),
            artifact_factory: Arc::new(InterningArtifactFactory::new()),
            embedded_tools: None,
            workspace_status: None,
            skyframe: None,
            is_system_env: false,
            extended_sanity_checks: false,
            allow_register_actions,
            error_sink: ErrorSink::buffered(),
        })
    }

    #[test]
    #[should_panic(expected = "These artifacts miss a generating action")]
    fn s1_orphan_artifact_fails_seal() {
        let mut e = env(true);
        e.get_derived_artifact(Path::new("out/foo.o"), Root::Derived(0));
        e.seal(&TargetDescriptor { kind: "sh_binary", label: "//x:y" });
    }

    #[test]
    fn s1_message_names_target_and_artifact() {
        let mut e = env(true);
        e.get_derived_artifact(Path::new("out/foo.o"), Root::Derived(0));
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            e.seal(&TargetDescriptor { kind: "sh_binary", label: "//x:y" });
        }));
        let err = result.unwrap_err();
        let message = err.downcast_ref::<String>().cloned().unwrap_or_default();
        assert!(message.contains("//x:y"));
        assert!(message.contains("out/foo.o"));
        assert!(message.contains("These artifacts miss a generating action"));
    }

    #[test]
    fn s2_happy_seal() {
        let mut e = env(true);
        let artifact = e.get_derived_artifact(Path::new("out/foo.o"), Root::Derived(0));
        e.register_action(Action::new("CppCompile", "Compiling", vec![artifact]));
        e.seal(&TargetDescriptor { kind: "sh_binary", label: "//x:y" });
        assert_eq!(e.get_registered_actions().len(), 1);
    }

    #[test]
    fn p2_mutation_after_seal_panics() {
        let mut e = env(true);
        let artifact = e.get_derived_artifact(Path::new("out/foo.o"), Root::Derived(0));
        e.register_action(Action::new("CppCompile", "Compiling", vec![artifact]));
        e.seal(&TargetDescriptor { kind: "sh_binary", label: "//x:y" });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            e.get_derived_artifact(Path::new("out/bar.o"), Root::Derived(0));
        }));
        assert!(result.is_err());
    }

    #[test]
    fn p3_system_env_never_has_errors() {
        let mut e = CachingAnalysisEnvironment::new(AnalysisEnvironmentConfig {
            owner: ArtifactOwner("//x:y".to_string()),
            artifact_factory: Arc::new(InterningArtifactFactory::new()),
            embedded_tools: None,
            workspace_status: None,
            skyframe: None,
            is_system_env: true,
            extended_sanity_checks: false,
            allow_register_actions: true,
            error_sink: ErrorSink::buffered(),
        });
        e.report_error("boom");
        assert!(!e.has_errors());
    }

    #[test]
    fn errors_suppress_orphan_check_at_seal() {
        let mut e = env(true);
        e.get_derived_artifact(Path::new("out/foo.o"), Root::Derived(0));
        e.report_error("rule logic failed");
        // Would otherwise panic on the orphan check; errors suppress it.
        e.seal(&TargetDescriptor { kind: "sh_binary", label: "//x:y" });
        assert!(e.is_sealed());
    }

    #[test]
    fn r1_rerequesting_artifact_does_not_overwrite_origin() {
        let mut e = CachingAnalysisEnvironment::new(AnalysisEnvironmentConfig {
            owner: ArtifactOwner("//x:y".to_string()),
            artifact_factory: Arc::new(InterningArtifactFactory::new()),
            embedded_tools: None,
            workspace_status: None,
            skyframe: None,
            is_system_env: false,
            extended_sanity_checks: true,
            allow_register_actions: true,
            error_sink: ErrorSink::buffered(),
        });
        let a1 = e.get_derived_artifact(Path::new("out/foo.o"), Root::Derived(0));
        let origin1 = match &e.state {
            EnvState::Active(s) => s.handed_out.get(&a1).unwrap().to_string(),
            _ => unreachable!(),
        };
        let a2 = e.get_derived_artifact(Path::new("out/foo.o"), Root::Derived(0));
        let origin2 = match &e.state {
            EnvState::Active(s) => s.handed_out.get(&a2).unwrap().to_string(),
            _ => unreachable!(),
        };
        assert_eq!(a1, a2);
        assert_eq!(origin1, origin2);
    }

    #[test]
    fn special_metadata_artifacts_are_not_tracked() {
        let mut e = env(true);
        e.get_special_metadata_artifact(Path::new("out/meta"), Root::Derived(0), true, false);
        // Sealing must succeed: the untracked artifact can't trigger an
        // orphan failure.
        e.seal(&TargetDescriptor { kind: "sh_binary", label: "//x:y" });
    }

    struct AbsentWorkspaceStatus;
    impl SkyframeEnvironment for AbsentWorkspaceStatus {
        fn get_value(&self, _key: &SkyKey) -> SkyLookup {
            SkyLookup::NotYetComputed
        }
    }

    #[test]
    fn s6_missing_dependency_on_workspace_status() {
        let mut e = CachingAnalysisEnvironment::new(AnalysisEnvironmentConfig {
            owner: ArtifactOwner("//x:y".to_string()),
            artifact_factory: Arc::new(InterningArtifactFactory::new()),
            embedded_tools: None,
            workspace_status: None,
            skyframe: Some(Arc::new(AbsentWorkspaceStatus)),
            is_system_env: false,
            extended_sanity_checks: false,
            allow_register_actions: true,
            error_sink: ErrorSink::buffered(),
        });
        assert_eq!(e.get_build_info(), Err(MissingDependency::new(SkyKey::WorkspaceStatus)));
        // No observable state mutation: retrying is safe.
        assert_eq!(e.get_build_info(), Err(MissingDependency::new(SkyKey::WorkspaceStatus)));
    }

    struct EagerWorkspaceStatus {
        stable: Artifact,
        volatile: Artifact,
    }
    impl crate::workspace_status::WorkspaceStatusProvider for EagerWorkspaceStatus {
        fn stable_artifact(&self) -> Artifact {
            self.stable.clone()
        }
        fn volatile_artifact(&self) -> Artifact {
            self.volatile.clone()
        }
        fn build_info_collection(&self, _key: &str, _configuration: &str) -> BuildInfoCollection {
            BuildInfoCollection {
                stamped: vec![self.stable.clone(), self.volatile.clone()],
                redacted: vec![self.stable.clone()],
            }
        }
    }

    #[test]
    fn get_build_info_artifacts_uses_eager_provider_when_present() {
        let factory = InterningArtifactFactory::new();
        let owner = ArtifactOwner("//x:y".to_string());
        let stable = factory.source_artifact(Path::new("stable"), &owner);
        let volatile = factory.source_artifact(Path::new("volatile"), &owner);
        let mut e = CachingAnalysisEnvironment::new(AnalysisEnvironmentConfig {
            owner,
            artifact_factory: Arc::new(factory),
            embedded_tools: None,
            workspace_status: Some(Arc::new(EagerWorkspaceStatus { stable, volatile })),
            skyframe: None,
            is_system_env: false,
            extended_sanity_checks: false,
            allow_register_actions: true,
            error_sink: ErrorSink::buffered(),
        });

        let stamped = e.get_build_info_artifacts("BUILD_EMBED_LABEL", "target", true).unwrap();
        assert_eq!(stamped.len(), 2);
        let redacted = e.get_build_info_artifacts("BUILD_EMBED_LABEL", "target", false).unwrap();
        assert_eq!(redacted.len(), 1);
    }
}
