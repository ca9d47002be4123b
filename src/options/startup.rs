//! C7: the typed startup-settings object, with per-option source
//! attribution so later tooling (or a user debugging their own rc files)
//! can tell where a value came from.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a startup option's current value came from. Absence of a key in
/// [`StartupOptions::sources`] means "default" (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributedSource {
    CommandLine,
    RcFile(PathBuf),
}

impl fmt::Display for AttributedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributedSource::CommandLine => f.write_str(""),
            AttributedSource::RcFile(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Hook for a distinct extension point modeled as the spec's `ProcessArgExtra`
/// / `AddExtraOptions`: rather than subclassing `StartupOptions`, an optional
/// strategy object held by value can claim options this crate doesn't know
/// about and contribute extra server argv entries.
pub trait StartupOptionsExtension: fmt::Debug {
    /// Mirrors `process_arg`'s contract: returns `true` if `next` was
    /// consumed as this option's value.
    fn process_arg(
        &mut self,
        name: &str,
        inline_value: Option<&str>,
        next: Option<&str>,
        source: &AttributedSource,
        sources: &mut HashMap<String, AttributedSource>,
    ) -> bool;

    fn add_extra_options(&self, _out: &mut Vec<String>) {}
}

#[derive(Debug)]
pub struct StartupOptions {
    pub output_base: Option<PathBuf>,
    pub install_base: PathBuf,
    pub batch: bool,
    pub max_idle_secs: u64,
    pub host_jvm_args: Vec<String>,
    pub sources: HashMap<String, AttributedSource>,
    extension: Option<Box<dyn StartupOptionsExtension>>,
}

impl StartupOptions {
    /// `InitDefaults(argv0)`: seeds defaults derived from the binary's own
    /// path, the way a real install-base is inferred from where the binary
    /// that's running actually lives.
    pub fn init_defaults(argv0: &Path) -> StartupOptions {
        let install_base =
            argv0.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        StartupOptions {
            output_base: None,
            install_base,
            batch: false,
            // 3 hours, the real default for this kind of long-lived server.
            max_idle_secs: 10_800,
            host_jvm_args: Vec::new(),
            sources: HashMap::new(),
            extension: None,
        }
    }

    pub fn with_extension(mut self, extension: Box<dyn StartupOptionsExtension>) -> StartupOptions {
        self.extension = Some(extension);
        self
    }

    fn record_source(&mut self, name: &str, source: AttributedSource) {
        self.sources.insert(name.to_string(), source);
    }

    /// `process-arg(arg, next, source)`: returns `true` if `arg` consumed
    /// `next` as its unary value.
    pub fn process_arg(&mut self, arg: &str, next: Option<&str>, source: AttributedSource) -> bool {
        let (name, inline_value) = split_inline_value(arg);

        match name {
            "--output_base" => {
                let (value, consumed) = unary_value(inline_value, next);
                self.output_base = Some(PathBuf::from(value));
                self.record_source("output_base", source);
                consumed
            }
            "--install_base" => {
                let (value, consumed) = unary_value(inline_value, next);
                self.install_base = PathBuf::from(value);
                self.record_source("install_base", source);
                consumed
            }
            "--max_idle_secs" => {
                let (value, consumed) = unary_value(inline_value, next);
                if let Ok(parsed) = value.parse() {
                    self.max_idle_secs = parsed;
                }
                self.record_source("max_idle_secs", source);
                consumed
            }
            "--host_jvm_args" => {
                let (value, consumed) = unary_value(inline_value, next);
                self.host_jvm_args.push(value.to_string());
                self.record_source("host_jvm_args", source);
                consumed
            }
            "--batch" => {
                self.batch = true;
                self.record_source("batch", source);
                false
            }
            "--nobatch" => {
                self.batch = false;
                self.record_source("batch", source);
                false
            }
            _ => match &mut self.extension {
                Some(extension) => {
                    extension.process_arg(name, inline_value, next, &source, &mut self.sources)
                }
                None => false,
            },
        }
    }

    pub fn extra_server_argv(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(extension) = &self.extension {
            extension.add_extra_options(&mut out);
        }
        out
    }
}

fn split_inline_value(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (arg, None),
    }
}

fn unary_value<'a>(inline_value: Option<&'a str>, next: Option<&'a str>) -> (&'a str, bool) {
    match inline_value {
        Some(value) => (value, false),
        None => (next.unwrap_or(""), next.is_some()),
    }
}

/// `starts with '-' and is not --help|-help|-h` (spec.md §4.3/§6).
pub fn looks_like_flag(arg: &str) -> bool {
    arg.starts_with('-') && !matches!(arg, "--help" | "-help" | "-h")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_value_does_not_consume_next() {
        let mut opts = StartupOptions::init_defaults(Path::new("/usr/bin/blaze-rc"));
        let consumed =
            opts.process_arg("--max_idle_secs=999", Some("build"), AttributedSource::CommandLine);
        assert!(!consumed);
        assert_eq!(opts.max_idle_secs, 999);
        assert_eq!(opts.sources.get("max_idle_secs"), Some(&AttributedSource::CommandLine));
    }

    #[test]
    fn separate_value_consumes_next() {
        let mut opts = StartupOptions::init_defaults(Path::new("/usr/bin/blaze-rc"));
        let consumed =
            opts.process_arg("--max_idle_secs", Some("42"), AttributedSource::CommandLine);
        assert!(consumed);
        assert_eq!(opts.max_idle_secs, 42);
    }

    #[test]
    fn s4_command_line_overrides_rc_source() {
        let mut opts = StartupOptions::init_defaults(Path::new("/usr/bin/blaze-rc"));
        opts.process_arg(
            "--max_idle_secs=10",
            None,
            AttributedSource::RcFile(PathBuf::from("/depot/tools/blaze.blazerc")),
        );
        opts.process_arg("--max_idle_secs=999", None, AttributedSource::CommandLine);
        assert_eq!(opts.max_idle_secs, 999);
        assert_eq!(opts.sources.get("max_idle_secs"), Some(&AttributedSource::CommandLine));
    }

    #[test]
    fn looks_like_flag_excludes_help_variants() {
        assert!(looks_like_flag("--batch"));
        assert!(!looks_like_flag("--help"));
        assert!(!looks_like_flag("-help"));
        assert!(!looks_like_flag("-h"));
        assert!(!looks_like_flag("build"));
    }
}
