//! Command-line assembly for the OpenSSH client tools.
//!
//! Builders are pure: they read the option store and already-resolved
//! paths, and produce an ordered token list that renders to the single
//! string handed to `sh -c`. Every value interpolated from configuration
//! is shell-escaped individually; flag tokens and numeric literals are
//! emitted verbatim. The only filesystem access is the readable check
//! that decides whether an exec command names a local script file.

use std::path::Path;

use crate::error::{DriverError, Result};
use crate::options::{OptionKey, OptionStore};

/// Shell program the public-key installation runs on the remote side.
///
/// It idempotently ensures a secure-permission `.ssh` directory and
/// `authorized_keys` file before appending whatever arrives on stdin.
pub(crate) const REMOTE_INSTALL_PROGRAM: &str = "umask 077; test -d .ssh || mkdir .ssh && \
    touch .ssh/authorized_keys && chmod 600 .ssh/authorized_keys; \
    cat >> .ssh/authorized_keys";

/// Transfer direction for scp command lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScpDirection {
    /// Local path first, remote operand second.
    Send,
    /// Remote operand first, local path second.
    Receive,
}

/// Paths the driver resolved before a line can be assembled.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ToolInvocation<'a> {
    /// Absolute path of the client tool to invoke.
    pub(crate) binary: &'a Path,
    /// Askpass helper script, present when a password is configured.
    pub(crate) askpass: Option<&'a Path>,
    /// `setsid` utility, present when it was found on `PATH`.
    pub(crate) setsid: Option<&'a Path>,
}

/// One rendered tool invocation as an ordered list of shell tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CommandLine {
    tokens: Vec<String>,
}

impl CommandLine {
    fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    /// Joins the tokens into the string handed to `sh -c`.
    pub(crate) fn render(&self) -> String {
        self.tokens.join(" ")
    }

    #[cfg(test)]
    pub(crate) fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Quotes a value for safe interpolation into a shell command line.
///
/// Plain path-like values pass through untouched; anything else is
/// wrapped in single quotes with embedded quotes rewritten as `'\''`.
/// The empty string renders as `''`.
pub(crate) fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value.chars().all(|c| {
            c.is_alphanumeric()
                || c == '-'
                || c == '_'
                || c == '/'
                || c == '.'
                || c == ':'
                || c == '='
        })
    {
        return value.to_owned();
    }

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

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

fn required_string(store: &OptionStore, key: OptionKey) -> Result<String> {
    store
        .string(key)?
        .ok_or(DriverError::MissingRequiredOption { key: key.as_str() })
}

/// Pushes the environment prefix, the `setsid` detacher, and the tool
/// itself, in that order.
///
/// The `DISPLAY`/`SSH_ASKPASS` assignments combined with the session
/// detach are what make the tools consult the helper script instead of
/// prompting on a terminal.
fn push_launch_prefix(line: &mut CommandLine, tool: ToolInvocation<'_>) {
    if let Some(askpass) = tool.askpass {
        line.push("DISPLAY=none:0.0");
        line.push(format!("SSH_ASKPASS={}", quote_path(askpass)));
    }
    if let Some(setsid) = tool.setsid {
        line.push(quote_path(setsid));
    }
    line.push(quote_path(tool.binary));
}

/// Assembles the remote-execution line.
///
/// Flag order is fixed: identity file, login name, repeated `-o`
/// directives, port; then the host and finally the command. A command
/// naming a readable local file is fed through stdin redirection instead
/// of being passed as remote command text.
pub(crate) fn build_exec(store: &OptionStore, tool: ToolInvocation<'_>) -> Result<CommandLine> {
    let hostname = required_string(store, OptionKey::Hostname)?;

    let mut line = CommandLine::new();
    push_launch_prefix(&mut line, tool);

    if let Some(identity) = store.string(OptionKey::IdentityFile)? {
        line.push("-i");
        line.push(shell_quote(&identity));
    }
    if let Some(login) = store.string(OptionKey::LoginName)? {
        line.push("-l");
        line.push(shell_quote(&login));
    }
    for directive in store.list(OptionKey::SshOption)? {
        line.push("-o");
        line.push(shell_quote(&directive));
    }
    if let Some(port) = store.integer(OptionKey::Port)? {
        line.push("-p");
        line.push(port.to_string());
    }

    line.push(shell_quote(&hostname));

    if let Some(command) = store.string(OptionKey::Command)? {
        if Path::new(&command).is_file() {
            line.push("<");
            line.push(shell_quote(&command));
        } else {
            // Remote command text, interpreted by the remote shell.
            line.push(command);
        }
    }

    Ok(line)
}

/// Assembles an scp transfer line for either direction.
pub(crate) fn build_scp(
    store: &OptionStore,
    direction: ScpDirection,
    tool: ToolInvocation<'_>,
) -> Result<CommandLine> {
    let hostname = required_string(store, OptionKey::Hostname)?;
    let remote_path = required_string(store, OptionKey::RemotePath)?;
    let local_path = required_string(store, OptionKey::LocalPath)?;

    let mut line = CommandLine::new();
    push_launch_prefix(&mut line, tool);

    if store.boolean(OptionKey::Recursive)? {
        line.push("-r");
    }
    if let Some(identity) = store.string(OptionKey::IdentityFile)? {
        line.push("-i");
        line.push(shell_quote(&identity));
    }
    if let Some(port) = store.integer(OptionKey::Port)? {
        line.push("-P");
        line.push(port.to_string());
    }
    if let Some(limit) = store.integer(OptionKey::Limit)? {
        line.push("-l");
        line.push(limit.to_string());
    }
    for directive in store.list(OptionKey::SshOption)? {
        line.push("-o");
        line.push(shell_quote(&directive));
    }

    let mut remote = String::new();
    if let Some(login) = store.string(OptionKey::LoginName)? {
        remote.push_str(&shell_quote(&login));
        remote.push('@');
    }
    remote.push_str(&shell_quote(&hostname));
    remote.push(':');
    remote.push_str(&shell_quote(&remote_path));

    let local = shell_quote(&local_path);

    match direction {
        ScpDirection::Send => {
            line.push(local);
            line.push(remote);
        }
        ScpDirection::Receive => {
            line.push(remote);
            line.push(local);
        }
    }

    Ok(line)
}

/// Assembles the public-key installation pipeline.
///
/// The trimmed key material is echoed into an ssh invocation running
/// [`REMOTE_INSTALL_PROGRAM`]; a failed install exits 1 so the caller
/// sees a non-zero status even when the shell pipeline itself survives.
pub(crate) fn build_copy_id(
    store: &OptionStore,
    key_material: &str,
    tool: ToolInvocation<'_>,
) -> Result<CommandLine> {
    let hostname = required_string(store, OptionKey::Hostname)?;

    let mut line = CommandLine::new();
    line.push("echo");
    line.push(shell_quote(key_material.trim()));
    line.push("|");
    push_launch_prefix(&mut line, tool);

    if let Some(login) = store.string(OptionKey::LoginName)? {
        line.push("-l");
        line.push(shell_quote(&login));
    }
    if let Some(port) = store.integer(OptionKey::Port)? {
        line.push("-p");
        line.push(port.to_string());
    }

    line.push(shell_quote(&hostname));
    line.push(shell_quote(REMOTE_INSTALL_PROGRAM));
    line.push("||");
    line.push("exit");
    line.push("1");

    Ok(line)
}

/// Assembles the key-generation line.
///
/// `-N` is always present; the passphrase defaults to the empty string.
/// No environment prefix or session detach is applied, key generation is
/// purely local.
pub(crate) fn build_keygen(store: &OptionStore, binary: &Path) -> Result<CommandLine> {
    let mut line = CommandLine::new();
    line.push(quote_path(binary));

    if store.boolean(OptionKey::Silence)? {
        line.push("-q");
    }
    if let Some(bits) = store.integer(OptionKey::Bits)? {
        line.push("-b");
        line.push(bits.to_string());
    }
    if let Some(key_type) = store.string(OptionKey::KeyType)? {
        line.push("-t");
        line.push(shell_quote(&key_type));
    }

    line.push("-N");
    let passphrase = store.string(OptionKey::NewPassphrase)?.unwrap_or_default();
    line.push(shell_quote(&passphrase));

    if let Some(comment) = store.string(OptionKey::Comment)? {
        line.push("-C");
        line.push(shell_quote(&comment));
    }
    if let Some(keyfile) = store.string(OptionKey::OutputKeyfile)? {
        line.push("-f");
        line.push(shell_quote(&keyfile));
    }

    Ok(line)
}
