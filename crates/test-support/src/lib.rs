#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! Stub client tools for exercising the external-tool driver without a
//! remote host. A [`StubToolbox`] is a temporary directory that tests
//! point the driver's `binary_path` option at; each installed stub is an
//! executable shell script that records how it was invoked (arguments,
//! the askpass environment, optionally one line of stdin) and then plays
//! back scripted output and an exit code. Tests read the invocation back
//! through [`Recording`].
//!
//! # Design
//!
//! - Recordings are line oriented: each line is a `kind`/`value` pair
//!   separated by a tab, so argument values containing spaces survive.
//! - Stubs never read stdin unless a prompt is configured. An unread
//!   terminal keeps no test hanging; a prompting stub consumes exactly
//!   one line, which matches both scripted answers and piped key
//!   material.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Quotes a value so it survives embedding in a single-quoted shell
/// string.
fn sh_single_quote(value: &str) -> String {
    let mut quoted = String::from("'");
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// Describes one stub tool to install into a [`StubToolbox`].
#[derive(Clone, Debug)]
pub struct StubSpec {
    name: String,
    stdout: String,
    stderr: String,
    exit_code: i32,
    prompt: Option<String>,
}

impl StubSpec {
    /// Creates a spec for a tool with the given file name that prints
    /// nothing and exits zero.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            prompt: None,
        }
    }

    /// Text the stub prints on stdout before exiting.
    #[must_use]
    pub fn stdout(mut self, text: &str) -> Self {
        self.stdout = text.to_owned();
        self
    }

    /// Text the stub prints on stderr before exiting.
    #[must_use]
    pub fn stderr(mut self, text: &str) -> Self {
        self.stderr = text.to_owned();
        self
    }

    /// Exit code the stub terminates with.
    #[must_use]
    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Makes the stub print the prompt, then read and record one line of
    /// stdin before producing its output.
    #[must_use]
    pub fn prompt(mut self, text: &str) -> Self {
        self.prompt = Some(text.to_owned());
        self
    }

    fn script(&self, record: &Path) -> String {
        let record = sh_single_quote(&record.to_string_lossy());
        let mut body = String::from("#!/bin/sh\n");
        body.push_str(&format!("record={record}\n"));
        body.push_str(": > \"$record\"\n");
        body.push_str("for a in \"$@\"; do printf 'arg\\t%s\\n' \"$a\" >> \"$record\"; done\n");
        body.push_str("printf 'env\\tDISPLAY=%s\\n' \"${DISPLAY-}\" >> \"$record\"\n");
        body.push_str("printf 'env\\tSSH_ASKPASS=%s\\n' \"${SSH_ASKPASS-}\" >> \"$record\"\n");
        if let Some(prompt) = &self.prompt {
            body.push_str(&format!("printf '%s' {}\n", sh_single_quote(prompt)));
            body.push_str("read -r answer\n");
            body.push_str("printf 'stdin\\t%s\\n' \"$answer\" >> \"$record\"\n");
        }
        body.push_str(&format!(
            "printf '%s' {}\n",
            sh_single_quote(&self.stdout)
        ));
        body.push_str(&format!(
            "printf '%s' {} >&2\n",
            sh_single_quote(&self.stderr)
        ));
        body.push_str(&format!("exit {}\n", self.exit_code));
        body
    }
}

/// Temporary directory of stub client tools.
pub struct StubToolbox {
    dir: TempDir,
}

impl StubToolbox {
    /// Creates an empty toolbox.
    ///
    /// # Errors
    ///
    /// Propagates temporary-directory creation failures.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Directory containing the installed stubs, suitable as the
    /// driver's `binary_path` option.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Installs a stub and returns the handle its invocation will be
    /// recorded through.
    ///
    /// # Errors
    ///
    /// Propagates script creation failures.
    pub fn install(&self, spec: &StubSpec) -> io::Result<Recording> {
        let record = self.dir.path().join(format!("{}.recorded", spec.name));
        let script = self.dir.path().join(&spec.name);
        fs::write(&script, spec.script(&record))?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
        Ok(Recording { path: record })
    }
}

/// Reads back how a stub tool was invoked.
pub struct Recording {
    path: PathBuf,
}

impl Recording {
    /// Whether the stub ran at all.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn entries(&self) -> io::Result<Vec<(String, String)>> {
        let text = fs::read_to_string(&self.path)?;
        Ok(text
            .lines()
            .filter_map(|line| {
                line.split_once('\t')
                    .map(|(kind, value)| (kind.to_owned(), value.to_owned()))
            })
            .collect())
    }

    /// The argument vector the stub received, in order.
    ///
    /// # Errors
    ///
    /// Fails when the stub never ran or the recording is unreadable.
    pub fn args(&self) -> io::Result<Vec<String>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|(kind, _)| kind == "arg")
            .map(|(_, value)| value)
            .collect())
    }

    /// The value one of the recorded environment variables held, or
    /// `None` when it was empty or unset.
    ///
    /// # Errors
    ///
    /// Fails when the stub never ran or the recording is unreadable.
    pub fn env(&self, name: &str) -> io::Result<Option<String>> {
        let prefix = format!("{name}=");
        Ok(self
            .entries()?
            .into_iter()
            .filter(|(kind, _)| kind == "env")
            .find_map(|(_, value)| value.strip_prefix(&prefix).map(str::to_owned))
            .filter(|value| !value.is_empty()))
    }

    /// The single line of stdin a prompting stub consumed.
    ///
    /// # Errors
    ///
    /// Fails when the stub never ran or the recording is unreadable.
    pub fn stdin_line(&self) -> io::Result<Option<String>> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|(kind, _)| kind == "stdin")
            .map(|(_, value)| value))
    }
}
