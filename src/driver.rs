//! Driver surface: the operation trait, the variant set, and the factory.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{DriverError, Result};
use crate::openssh::OpenSshDriver;
use crate::options::{OptionKey, OptionStore, OptionValue};

#[cfg(feature = "libssh2")]
use crate::libssh2::LibSsh2Driver;

/// Uniform remote-operation surface implemented by every driver variant.
///
/// Operations append whatever the underlying process or session produced
/// to the two accumulators and return its exit status. Configuration and
/// precondition problems are raised before anything launches; failures
/// after that point land in the exit code and accumulators instead.
/// The override pairs are merged into the driver's options before the
/// operation runs and stay in effect for later calls, until overwritten
/// or cleared with [`OptionValue::Null`].
pub trait SshDriver {
    /// Runs a command on the remote host.
    fn ssh_exec(
        &mut self,
        stdout: &mut String,
        stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32>;

    /// Installs the configured public key in the remote account's
    /// authorized keys.
    fn ssh_copy_id(
        &mut self,
        stdout: &mut String,
        stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32>;

    /// Generates an authentication keypair.
    fn ssh_keygen(
        &mut self,
        stdout: &mut String,
        stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32>;

    /// Uploads a local file to the remote host.
    fn scp_send(
        &mut self,
        stdout: &mut String,
        stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32>;

    /// Downloads a remote file to the local host.
    fn scp_receive(
        &mut self,
        stdout: &mut String,
        stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32>;
}

/// The compiled-in driver variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// External OpenSSH client tools driven through pseudo-terminals.
    OpenSsh,
    /// In-process libssh2 sessions through the `ssh2` binding.
    LibSsh2,
}

impl DriverKind {
    /// Canonical variant name as it appears in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenSsh => "OpenSSH",
            Self::LibSsh2 => "LibSSH2",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = DriverError;

    fn from_str(name: &str) -> Result<Self> {
        if name.eq_ignore_ascii_case(Self::OpenSsh.as_str()) {
            Ok(Self::OpenSsh)
        } else if name.eq_ignore_ascii_case(Self::LibSsh2.as_str()) {
            Ok(Self::LibSsh2)
        } else {
            Err(DriverError::UnknownDriver {
                name: name.to_owned(),
            })
        }
    }
}

/// Creates a driver of the requested variant.
///
/// Constructor options are validated against the variant's allowlist and
/// seed the option store that per-call overrides later merge into.
///
/// # Errors
///
/// [`DriverError::InvalidOption`] for options outside the variant's
/// allowlist, and [`DriverError::ModuleNotFound`] when the library-bound
/// variant is requested in a build without the `libssh2` feature.
pub fn create_driver(
    kind: DriverKind,
    options: &[(OptionKey, OptionValue)],
) -> Result<Box<dyn SshDriver>> {
    match kind {
        DriverKind::OpenSsh => Ok(Box::new(OpenSshDriver::new(options)?)),
        #[cfg(feature = "libssh2")]
        DriverKind::LibSsh2 => Ok(Box::new(LibSsh2Driver::new(options)?)),
        #[cfg(not(feature = "libssh2"))]
        DriverKind::LibSsh2 => Err(DriverError::ModuleNotFound { module: "ssh2" }),
    }
}

/// Reads the configured public identity file for a copy-id operation.
///
/// # Errors
///
/// [`DriverError::MissingRequiredOption`] when the option is unset and
/// [`DriverError::PublicKeyUnavailable`] when the file cannot be read.
pub(crate) fn read_public_identity(store: &OptionStore) -> Result<String> {
    let path = store
        .string(OptionKey::PublicIdentityFile)?
        .ok_or(DriverError::MissingRequiredOption {
            key: OptionKey::PublicIdentityFile.as_str(),
        })?;
    fs::read_to_string(&path).map_err(|_| DriverError::PublicKeyUnavailable {
        path: PathBuf::from(path),
    })
}
