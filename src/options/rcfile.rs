//! C5: tokenizes a single rc-file and follows its `import` directives, with
//! cycle detection, into a shared [`RcOptionMap`].

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::OptionsError;

/// `(rcfile_index, option_text)`, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcOption {
    pub rcfile_index: u32,
    pub option_text: String,
}

/// `index` is assigned monotonically in discovery order, across every rc
/// file seen (including ones reached only via `import`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcFile {
    pub filename: PathBuf,
    pub index: u32,
}

/// Command name (`"startup"`, `"build"`, `"test"`, ...) -> its options, in
/// the order produced by concatenating every parsed file in discovery order
/// with `import` expansions inlined at the directive's position.
pub type RcOptionMap = IndexMap<String, Vec<RcOption>>;

/// Joins backslash-newline continuations: a trailing `\` immediately before
/// `\r\n` or `\n` is removed along with the line terminator, merging the
/// next line into the current one. Runs once over a whole file's contents,
/// before line splitting.
pub fn join_continuations(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    let mut chars = contents.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('\r') => {
                    chars.next();
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    continue;
                }
                Some('\n') => {
                    chars.next();
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

/// Tokenizes a single, already-continuation-joined line: whitespace
/// delimits tokens, `#` starts a comment to end of line, single and double
/// quotes group tokens, and `\` escapes the next character.
///
/// Dangling trailing backslashes and unterminated quotes are accepted
/// silently rather than rejected, since spec.md flags this as possibly-buggy
/// upstream behavior and leaves the choice open; we keep it bug-compatible
/// (see DESIGN.md).
pub fn tokenize_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '#' => break,
            ' ' | '\t' => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' | '"' => {
                in_token = true;
                let quote = c;
                loop {
                    match chars.next() {
                        None => break, // unterminated quote: accept what we have
                        Some(c2) if c2 == quote => break,
                        Some('\\') => {
                            if let Some(escaped) = chars.next() {
                                current.push(escaped);
                            }
                            // dangling escape at end of quoted token: accepted
                        }
                        Some(c2) => current.push(c2),
                    }
                }
            }
            '\\' => {
                in_token = true;
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                // dangling trailing backslash: accepted, contributes nothing
            }
            _ => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

fn resolve_import_path(importing_file: &Path, raw: &str) -> PathBuf {
    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() {
        candidate
    } else {
        importing_file.parent().map(|dir| dir.join(&candidate)).unwrap_or(candidate)
    }
}

/// Parses `path`, appending to `rc_files` and folding options into
/// `option_map`, recursively inlining `import` directives. `import_stack`
/// carries the chain of files currently being parsed, for cycle detection.
pub fn parse_rc_file(
    path: &Path,
    rc_files: &mut Vec<RcFile>,
    option_map: &mut RcOptionMap,
    import_stack: &mut Vec<PathBuf>,
) -> Result<(), OptionsError> {
    if import_stack.iter().any(|p| p == path) {
        let mut cycle: Vec<String> =
            import_stack.iter().map(|p| p.display().to_string()).collect();
        cycle.push(path.display().to_string());
        return Err(OptionsError::ImportLoop { cycle });
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|source| OptionsError::InternalIo { path: path.to_path_buf(), source })?;

    let index = rc_files.len() as u32;
    rc_files.push(RcFile { filename: path.to_path_buf(), index });
    import_stack.push(path.to_path_buf());

    let joined = join_continuations(&contents);
    for raw_line in joined.split('\n') {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens = tokenize_line(line);
        let (command, rest) = match tokens.split_first() {
            Some(pair) => pair,
            None => continue,
        };

        if command == "import" {
            if rest.len() != 1 {
                import_stack.pop();
                return Err(OptionsError::BadImportArity { file: path.to_path_buf() });
            }
            let import_path = resolve_import_path(path, &rest[0]);
            if let Err(e) = parse_rc_file(&import_path, rc_files, option_map, import_stack) {
                import_stack.pop();
                return Err(e);
            }
            continue;
        }

        let entries = option_map.entry(command.clone()).or_default();
        for token in rest {
            entries.push(RcOption { rcfile_index: index, option_text: token.clone() });
        }

        if command == "startup" && !rest.is_empty() {
            log::info!(
                "Reading 'startup' options from {}: {}",
                path.display(),
                rest.join(" ")
            );
        }
    }

    import_stack.pop();
    Ok(())
}
