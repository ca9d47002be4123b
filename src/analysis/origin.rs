//! Diagnostic-only provenance for a handed-out artifact.
//!
//! Stack capture is gated behind `extended_sanity_checks` because it's
//! expensive (spec.md §9's design note); the stored representation is opaque
//! text, used only when the orphan check needs to tell the caller where a
//! leaked artifact came from.

use std::backtrace::Backtrace;
use std::fmt;

#[derive(Debug, Clone)]
pub enum ArtifactOrigin {
    Captured(String),
    Sentinel,
}

impl ArtifactOrigin {
    pub fn capture() -> ArtifactOrigin {
        ArtifactOrigin::Captured(Backtrace::force_capture().to_string())
    }

    pub fn sentinel() -> ArtifactOrigin {
        ArtifactOrigin::Sentinel
    }
}

impl fmt::Display for ArtifactOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactOrigin::Captured(trace) => f.write_str(trace),
            ArtifactOrigin::Sentinel => f.write_str("<origin not captured>"),
        }
    }
}
