//! External-tool driver that shells out to the OpenSSH client binaries.
//!
//! Each operation resolves the tool it needs at call time, so a binary
//! installed after construction is picked up and a removed one is
//! reported per call. A configured password materialises a fresh askpass
//! helper before the command line is built; the helper handle lives on
//! the driver so the script outlives the launch and disappears when the
//! driver is dropped or the next call replaces it.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::askpass::AskpassScript;
use crate::binary::{locate_setsid, locate_tool};
use crate::command::{self, CommandLine, ScpDirection, ToolInvocation};
use crate::driver::{SshDriver, read_public_identity};
use crate::error::Result;
use crate::options::{OPENSSH_KEYS, OptionKey, OptionStore, OptionValue};
use crate::pty::{self, ExecRequest};

/// Per-call launch context assembled by [`OpenSshDriver::prepare`].
struct Prepared {
    binary: PathBuf,
    setsid: Option<PathBuf>,
    password_configured: bool,
}

/// Driver variant backed by the `ssh`, `scp`, and `ssh-keygen` tools.
pub struct OpenSshDriver {
    options: OptionStore,
    askpass: Option<AskpassScript>,
}

impl OpenSshDriver {
    /// Creates the driver, validating the constructor options against
    /// this variant's allowlist.
    ///
    /// # Errors
    ///
    /// [`crate::DriverError::InvalidOption`] for keys outside the
    /// allowlist.
    pub fn new(options: &[(OptionKey, OptionValue)]) -> Result<Self> {
        let mut store = OptionStore::new(OPENSSH_KEYS);
        store.apply(options)?;
        Ok(Self {
            options: store,
            askpass: None,
        })
    }

    fn binary_override(&self) -> Result<Option<PathBuf>> {
        Ok(self.options.string(OptionKey::BinaryPath)?.map(PathBuf::from))
    }

    /// Resolves the tool and refreshes the askpass helper for one call.
    ///
    /// The replacement script is created before the previous handle is
    /// dropped, so a password is available to the tools at every point
    /// in between.
    fn prepare(&mut self, tool_name: &str) -> Result<Prepared> {
        let override_dir = self.binary_override()?;
        let binary = locate_tool(tool_name, override_dir.as_deref())?;

        let password = self.options.string(OptionKey::Password)?;
        let password_configured = password.is_some();
        if let Some(password) = password {
            self.askpass = Some(AskpassScript::create(&password)?);
        }

        Ok(Prepared {
            binary,
            setsid: locate_setsid(),
            password_configured,
        })
    }

    fn invocation<'a>(&'a self, prepared: &'a Prepared) -> ToolInvocation<'a> {
        ToolInvocation {
            binary: &prepared.binary,
            askpass: if prepared.password_configured {
                self.askpass.as_ref().map(AskpassScript::path)
            } else {
                None
            },
            setsid: prepared.setsid.as_deref(),
        }
    }

    /// Common launch path: resolve, build, execute.
    fn run_tool(
        &mut self,
        tool_name: &str,
        input: Option<&str>,
        stdout: &mut String,
        stderr: &mut String,
        build: impl FnOnce(&OptionStore, ToolInvocation<'_>) -> Result<CommandLine>,
    ) -> Result<i32> {
        let prepared = self.prepare(tool_name)?;
        let line = build(&self.options, self.invocation(&prepared))?;
        pty::run(
            ExecRequest {
                command_line: &line.render(),
                input,
                password_configured: prepared.password_configured,
            },
            stdout,
            stderr,
        )
    }
}

/// Narrows a generated private key to owner-only access.
///
/// `ssh-keygen` already writes keys restrictively; this re-narrows the
/// file in case the process umask widened it. A failure here is logged
/// rather than raised so the generation exit code still reaches the
/// caller.
fn restrict_key_permissions(path: &Path) {
    if !path.is_file() {
        return;
    }
    if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!(path = %path.display(), error = %error, "could not restrict key file permissions");
    }
}

impl SshDriver for OpenSshDriver {
    fn ssh_exec(
        &mut self,
        stdout: &mut String,
        stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32> {
        self.options.apply(overrides)?;
        self.run_tool("ssh", None, stdout, stderr, command::build_exec)
    }

    fn ssh_copy_id(
        &mut self,
        stdout: &mut String,
        stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32> {
        self.options.apply(overrides)?;
        let key_material = read_public_identity(&self.options)?;
        self.run_tool("ssh", None, stdout, stderr, |store, tool| {
            command::build_copy_id(store, &key_material, tool)
        })
    }

    fn ssh_keygen(
        &mut self,
        stdout: &mut String,
        stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32> {
        self.options.apply(overrides)?;
        let override_dir = self.binary_override()?;
        let binary = locate_tool("ssh-keygen", override_dir.as_deref())?;
        let line = command::build_keygen(&self.options, &binary)?;

        // The scripted answer resolves the tool's overwrite prompt; when
        // no keyfile exists the prompt never appears and the answer is
        // discarded with the terminal.
        let answer = if self.options.boolean(OptionKey::OverwriteExistingKey)? {
            "y"
        } else {
            "n"
        };
        let code = pty::run(
            ExecRequest {
                command_line: &line.render(),
                input: Some(answer),
                password_configured: self.options.string(OptionKey::Password)?.is_some(),
            },
            stdout,
            stderr,
        )?;

        if let Some(keyfile) = self.options.string(OptionKey::OutputKeyfile)? {
            restrict_key_permissions(Path::new(&keyfile));
        }
        Ok(code)
    }

    fn scp_send(
        &mut self,
        stdout: &mut String,
        stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32> {
        self.options.apply(overrides)?;
        self.run_tool("scp", None, stdout, stderr, |store, tool| {
            command::build_scp(store, ScpDirection::Send, tool)
        })
    }

    fn scp_receive(
        &mut self,
        stdout: &mut String,
        stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32> {
        self.options.apply(overrides)?;
        self.run_tool("scp", None, stdout, stderr, |store, tool| {
            command::build_scp(store, ScpDirection::Receive, tool)
        })
    }
}
