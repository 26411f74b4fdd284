//! Launch planning for `stdio` programs.
//!
//! Resolution runs in two phases so each can be tested without spawning:
//!
//! 1. [`EntryPath::classify`] decides what the manifest's `program` names:
//!    an absolute path, a file relative to the plugin directory (anything
//!    containing a path separator), or a bare command looked up on `PATH`.
//! 2. For plugin-relative files, [`sniff_interpreter`] reads the first line
//!    and [`parse_shebang`] extracts an interpreter, in which case the
//!    process is launched as `<interpreter> <script> <args...>`.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// What a manifest `program` refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPath {
    /// Absolute path, used as-is.
    Absolute(PathBuf),
    /// File inside the plugin directory, already joined onto it.
    PluginRelative(PathBuf),
    /// Bare command resolved through `PATH` at spawn time.
    SystemCommand(String),
}

impl EntryPath {
    /// Classifies `program` relative to `plugin_dir`.
    #[must_use]
    pub fn classify(program: &str, plugin_dir: &Path) -> Self {
        let path = Path::new(program);
        if path.is_absolute() {
            Self::Absolute(path.to_path_buf())
        } else if has_separator(program) {
            Self::PluginRelative(plugin_dir.join(path))
        } else {
            Self::SystemCommand(program.to_owned())
        }
    }

    /// Returns the program to hand to the OS.
    #[must_use]
    pub fn program(&self) -> PathBuf {
        match self {
            Self::Absolute(path) | Self::PluginRelative(path) => path.clone(),
            Self::SystemCommand(name) => PathBuf::from(name),
        }
    }
}

/// Fully resolved program and argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    program: PathBuf,
    args: Vec<OsString>,
    interpreter: Option<PathBuf>,
}

impl Launch {
    /// Returns the executable to spawn.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Returns the arguments following the executable.
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Returns the interpreter chosen from a shebang, if any.
    #[must_use]
    pub fn interpreter(&self) -> Option<&Path> {
        self.interpreter.as_deref()
    }
}

/// Plans how to start `program` with `args`.
#[must_use]
pub fn plan_launch(program: &str, args: &[String], plugin_dir: &Path) -> Launch {
    let entry = EntryPath::classify(program, plugin_dir);
    let interpreter = match &entry {
        EntryPath::PluginRelative(script) => sniff_interpreter(script),
        EntryPath::Absolute(_) | EntryPath::SystemCommand(_) => None,
    };
    let args_os = args.iter().map(OsString::from);
    match interpreter {
        Some(interpreter) => Launch {
            program: interpreter.clone(),
            args: std::iter::once(entry.program().into_os_string())
                .chain(args_os)
                .collect(),
            interpreter: Some(interpreter),
        },
        None => Launch {
            program: entry.program(),
            args: args_os.collect(),
            interpreter: None,
        },
    }
}

/// Reads the first line of `script` and resolves its shebang, looking up
/// `env`-style interpreters on `PATH`.
#[must_use]
pub fn sniff_interpreter(script: &Path) -> Option<PathBuf> {
    if !script.is_file() {
        return None;
    }
    let file = File::open(script).ok()?;
    let mut first_line = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut first_line).ok()?;
    let line = String::from_utf8_lossy(&first_line);
    parse_shebang(&line, |name| which::which(name).ok())
}

/// Extracts the interpreter from a shebang line.
///
/// `#!/abs/interp [flags]` yields `/abs/interp`; `#!/usr/bin/env name`
/// yields whatever `lookup` returns for `name` (leading `env` flags such as
/// `-S` are skipped). Relative interpreters and non-shebang lines yield
/// `None`.
pub fn parse_shebang(line: &str, lookup: impl FnOnce(&str) -> Option<PathBuf>) -> Option<PathBuf> {
    let rest = line.trim().strip_prefix("#!")?;
    let mut fields = rest.split_whitespace();
    let first = Path::new(fields.next()?);
    if first.file_name().is_some_and(|name| name == "env") {
        let name = fields.find(|field| !field.starts_with('-'))?;
        return lookup(name);
    }
    first.is_absolute().then(|| first.to_path_buf())
}

fn has_separator(program: &str) -> bool {
    program.contains('/') || program.contains(std::path::MAIN_SEPARATOR)
}
