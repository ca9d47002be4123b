//! C6: the boot-time option processor that turns raw argv plus whatever rc
//! files it can find into a server-bound argument vector.

pub mod rcfile;
pub mod startup;

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::error::OptionsError;
use rcfile::{parse_rc_file, RcFile, RcOptionMap};
use startup::{looks_like_flag, AttributedSource, StartupOptions};

/// Deterministically ordered snapshot of the process environment, used both
/// for `--client_env=` emission and for `$HOME`/`$EMACS` lookups. Grounded on
/// the teacher's `BTreeMap<String, Option<OsString>>` environment handling:
/// a `BTreeMap` gives the stable iteration order the spliced argv needs.
#[derive(Debug, Clone)]
pub struct ProcessEnvironment {
    vars: BTreeMap<String, OsString>,
}

impl ProcessEnvironment {
    pub fn capture() -> ProcessEnvironment {
        let vars =
            env::vars_os().map(|(key, value)| (key.to_string_lossy().into_owned(), value)).collect();
        ProcessEnvironment { vars }
    }

    pub fn get(&self, key: &str) -> Option<&OsString> {
        self.vars.get(key)
    }

    /// Iterates `KEY=VAL` pairs in the order `--client_env=` entries should
    /// be emitted in (lexicographic on key, via the backing `BTreeMap`).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OsString)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Terminal characteristics the server needs to reproduce the client's
/// display. Detected with the stable [`std::io::IsTerminal`] trait, filling
/// a gap the teacher's own environment handling doesn't cover (SPEC_FULL.md
/// §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalInfo {
    pub is_tty: bool,
    pub columns: u32,
}

impl TerminalInfo {
    pub fn detect() -> TerminalInfo {
        let is_tty = std::io::stdout().is_terminal();
        let columns = term_columns().unwrap_or(80);
        TerminalInfo { is_tty, columns }
    }
}

#[cfg(unix)]
fn term_columns() -> Option<u32> {
    // No ioctl dependency in the pack's stack for this; COLUMNS is the
    // portable fallback shells already export.
    env::var("COLUMNS").ok().and_then(|v| v.parse().ok())
}

#[cfg(not(unix))]
fn term_columns() -> Option<u32> {
    env::var("COLUMNS").ok().and_then(|v| v.parse().ok())
}

/// Probes a list of candidate paths in order, returning the first that's
/// readable.
fn first_readable(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

fn scan_blazerc_flags(argv: &[String]) -> Result<(Option<PathBuf>, bool), OptionsError> {
    let mut blazerc = None;
    let mut nomaster = false;
    let mut i = 0;
    while i < argv.len() {
        match argv[i].as_str() {
            "--nomaster_blazerc" => {
                nomaster = true;
                i += 1;
            }
            "--blazerc" => {
                let path = argv.get(i + 1).ok_or(OptionsError::BlazercMissingArgument)?;
                blazerc = Some(PathBuf::from(path));
                i += 2;
            }
            arg if arg.starts_with("--blazerc=") => {
                blazerc = Some(PathBuf::from(&arg["--blazerc=".len()..]));
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok((blazerc, nomaster))
}

/// The processed result of a boot-time argv: a fully layered [`StartupOptions`],
/// the discovered rc files, their folded [`RcOptionMap`], the command and its
/// arguments, and the context (environment, terminal, cwd) needed to build
/// the server argv.
#[derive(Debug)]
pub struct OptionProcessor {
    pub startup_options: StartupOptions,
    pub rc_files: Vec<RcFile>,
    pub option_map: RcOptionMap,
    pub command: String,
    pub command_arguments: Vec<String>,
    pub environment: ProcessEnvironment,
    pub terminal: TerminalInfo,
    pub cwd: PathBuf,
}

impl OptionProcessor {
    pub fn get_command(&self) -> &str {
        &self.command
    }

    pub fn get_command_arguments(&self) -> &[String] {
        &self.command_arguments
    }

    pub fn get_parsed_startup_options(&self) -> &StartupOptions {
        &self.startup_options
    }

    /// Runs discovery, C5 parsing, and startup-option layering over `argv`
    /// (argv\[0\] is the binary path, matching a real process argv). `workspace`
    /// is the workspace root used to probe for depot/user rc files.
    pub fn parse(
        argv: &[String],
        workspace: &Path,
        environment: ProcessEnvironment,
        terminal: TerminalInfo,
        cwd: PathBuf,
    ) -> Result<OptionProcessor, OptionsError> {
        let (blazerc_override, nomaster) = scan_blazerc_flags(argv)?;

        let mut rc_files = Vec::new();
        let mut option_map = RcOptionMap::new();
        let mut import_stack = Vec::new();

        if !nomaster {
            let depot_candidates = vec![
                workspace.join("tools/blaze.blazerc"),
                workspace.join("../READONLY/google3/tools/blaze.blazerc"),
            ];
            if let Some(depot) = first_readable(&depot_candidates) {
                parse_rc_file(&depot, &mut rc_files, &mut option_map, &mut import_stack)?;
            }
        }

        let user_rc = match &blazerc_override {
            Some(path) => {
                if !path.is_file() {
                    return Err(OptionsError::UnreadableBlazerc { path: path.clone() });
                }
                Some(path.clone())
            }
            None => {
                let mut candidates = vec![workspace.join(".blazerc")];
                if let Some(home) = environment.get("HOME") {
                    candidates.push(PathBuf::from(home).join(".blazerc"));
                }
                first_readable(&candidates)
            }
        };
        if let Some(user) = &user_rc {
            parse_rc_file(user, &mut rc_files, &mut option_map, &mut import_stack)?;
        }

        let argv0 = argv.first().map(Path::new).unwrap_or_else(|| Path::new("blaze-rc"));
        let mut startup_options = StartupOptions::init_defaults(argv0);

        if let Some(startup_entries) = option_map.get("startup") {
            walk_startup_pairs(&mut startup_options, startup_entries, &rc_files);
        }

        let startup_args_end = walk_argv_startup(&mut startup_options, argv);

        let command = argv.get(startup_args_end + 1).cloned().unwrap_or_default();
        let command_arguments =
            argv.get(startup_args_end + 2..).map(<[String]>::to_vec).unwrap_or_default();

        Ok(OptionProcessor {
            startup_options,
            rc_files,
            option_map,
            command,
            command_arguments,
            environment,
            terminal,
            cwd,
        })
    }

    /// `AddRcfileArgsAndOptions`: builds the full argv forwarded to the
    /// long-lived server, splicing internal options between the command name
    /// and the user's own command arguments.
    pub fn build_server_argv(&self) -> Vec<String> {
        let mut argv = Vec::new();
        argv.push(self.command.clone());

        for rc_file in &self.rc_files {
            argv.push(format!("--rc_source={}", rc_file.filename.display()));
        }

        for (command, options) in &self.option_map {
            if command == "startup" {
                continue;
            }
            for option in options {
                argv.push(format!(
                    "--default_override={}:{}={}",
                    option.rcfile_index, command, option.option_text
                ));
            }
        }

        argv.push(format!("--isatty={}", if self.terminal.is_tty { 1 } else { 0 }));
        argv.push(format!("--terminal_columns={}", self.terminal.columns));

        if self.startup_options.batch {
            argv.push("--ignore_client_env".to_string());
        } else {
            for (key, value) in self.environment.iter() {
                argv.push(format!("--client_env={}={}", key, value.to_string_lossy()));
            }
        }

        argv.push(format!("--client_cwd={}", self.cwd.display()));

        if self.environment.get("EMACS").map(|v| v == "t").unwrap_or(false) {
            argv.push("--emacs".to_string());
        }

        argv.extend(self.startup_options.extra_server_argv());
        argv.extend(self.command_arguments.iter().cloned());
        argv
    }
}

/// Walks the rc `"startup"` entries pairwise, feeding `process_arg` with the
/// owning rc file as the attributed source.
fn walk_startup_pairs(
    startup_options: &mut StartupOptions,
    entries: &[rcfile::RcOption],
    rc_files: &[RcFile],
) {
    let mut i = 0;
    while i < entries.len() {
        let arg = &entries[i].option_text;
        let rcfile_path = rc_files
            .iter()
            .find(|f| f.index == entries[i].rcfile_index)
            .map(|f| f.filename.clone())
            .unwrap_or_default();
        let source = AttributedSource::RcFile(rcfile_path);

        let next = entries.get(i + 1).map(|e| e.option_text.as_str());
        let consumed = startup_options.process_arg(arg, next, source);
        i += if consumed { 2 } else { 1 };
    }
}

/// Walks argv (skipping argv\[0\]) pairwise until the first non-flag
/// argument, returning the index of the last startup flag consumed (or 0 if
/// none, so the command sits at index 1).
fn walk_argv_startup(startup_options: &mut StartupOptions, argv: &[String]) -> usize {
    let mut i = 1;
    let mut last_consumed = 0;
    while i < argv.len() {
        let arg = &argv[i];
        if !looks_like_flag(arg) {
            break;
        }
        let next = argv.get(i + 1).map(String::as_str);
        let consumed = startup_options.process_arg(arg, next, AttributedSource::CommandLine);
        if consumed {
            last_consumed = i + 1;
            i += 2;
        } else {
            last_consumed = i;
            i += 1;
        }
    }
    last_consumed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as StdBTreeMap;

    fn empty_environment() -> ProcessEnvironment {
        ProcessEnvironment { vars: StdBTreeMap::new() }
    }

    #[test]
    fn s4_command_line_overrides_depot_startup_option() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("tools");
        std::fs::create_dir_all(&tools).unwrap();
        std::fs::write(tools.join("blaze.blazerc"), "startup --max_idle_secs=10\n").unwrap();

        let argv = vec![
            "blaze-rc".to_string(),
            "--max_idle_secs".to_string(),
            "999".to_string(),
            "build".to_string(),
            "//x".to_string(),
        ];
        let processor = OptionProcessor::parse(
            &argv,
            dir.path(),
            empty_environment(),
            TerminalInfo { is_tty: false, columns: 80 },
            PathBuf::from("/cwd"),
        )
        .unwrap();

        assert_eq!(processor.startup_options.max_idle_secs, 999);
        assert_eq!(
            processor.startup_options.sources.get("max_idle_secs"),
            Some(&AttributedSource::CommandLine)
        );
        assert_eq!(processor.command, "build");
        assert_eq!(processor.command_arguments, vec!["//x".to_string()]);
    }

    #[test]
    fn s5_argv_splicing_order() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("tools");
        std::fs::create_dir_all(&tools).unwrap();
        let depot = tools.join("blaze.blazerc");
        std::fs::write(&depot, "build --foo=1\n").unwrap();

        let argv =
            vec!["bazel".to_string(), "build".to_string(), "//x:y".to_string()];
        let processor = OptionProcessor::parse(
            &argv,
            dir.path(),
            empty_environment(),
            TerminalInfo { is_tty: true, columns: 80 },
            PathBuf::from("/cwd"),
        )
        .unwrap();

        let server_argv = processor.build_server_argv();
        assert_eq!(
            server_argv,
            vec![
                "build".to_string(),
                format!("--rc_source={}", depot.display()),
                "--default_override=0:build=--foo=1".to_string(),
                "--isatty=1".to_string(),
                "--terminal_columns=80".to_string(),
                "--client_cwd=/cwd".to_string(),
                "//x:y".to_string(),
            ]
        );
    }

    #[test]
    fn p8_default_override_indices_match_rc_file_index() {
        let dir = tempfile::tempdir().unwrap();
        let child = dir.path().join("child.blazerc");
        let parent = dir.path().join(".blazerc");
        std::fs::write(&child, "build --from_child\n").unwrap();
        std::fs::write(&parent, "import child.blazerc\nbuild --from_parent\n").unwrap();

        let argv = vec!["blaze-rc".to_string(), "build".to_string()];
        let processor = OptionProcessor::parse(
            &argv,
            dir.path(),
            empty_environment(),
            TerminalInfo { is_tty: false, columns: 80 },
            PathBuf::from("/cwd"),
        )
        .unwrap();

        assert_eq!(processor.rc_files.len(), 2);
        let server_argv = processor.build_server_argv();
        let rc_sources: Vec<&String> =
            server_argv.iter().filter(|a| a.starts_with("--rc_source=")).collect();
        assert_eq!(rc_sources.len(), 2);
        assert!(server_argv.contains(&"--default_override=1:build=--from_child".to_string()));
        assert!(server_argv.contains(&"--default_override=0:build=--from_parent".to_string()));
    }

    #[test]
    fn batch_emits_ignore_client_env_instead_of_entries() {
        let dir = tempfile::tempdir().unwrap();
        let argv = vec!["blaze-rc".to_string(), "--batch".to_string(), "build".to_string()];
        let processor = OptionProcessor::parse(
            &argv,
            dir.path(),
            empty_environment(),
            TerminalInfo { is_tty: false, columns: 80 },
            PathBuf::from("/cwd"),
        )
        .unwrap();
        let server_argv = processor.build_server_argv();
        assert!(server_argv.contains(&"--ignore_client_env".to_string()));
        assert!(!server_argv.iter().any(|a| a.starts_with("--client_env=")));
    }

    #[test]
    fn unreadable_blazerc_override_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let argv = vec![
            "blaze-rc".to_string(),
            "--blazerc".to_string(),
            dir.path().join("missing.blazerc").to_string_lossy().to_string(),
            "build".to_string(),
        ];
        let err = OptionProcessor::parse(
            &argv,
            dir.path(),
            empty_environment(),
            TerminalInfo { is_tty: false, columns: 80 },
            PathBuf::from("/cwd"),
        )
        .unwrap_err();
        assert!(matches!(err, OptionsError::UnreadableBlazerc { .. }));
    }

    #[test]
    fn trailing_bare_blazerc_flag_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let argv = vec!["blaze-rc".to_string(), "--blazerc".to_string()];
        let err = OptionProcessor::parse(
            &argv,
            dir.path(),
            empty_environment(),
            TerminalInfo { is_tty: false, columns: 80 },
            PathBuf::from("/cwd"),
        )
        .unwrap_err();
        assert!(matches!(err, OptionsError::BlazercMissingArgument));
    }
}
