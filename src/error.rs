//! Driver error taxonomy and result alias.
//!
//! Every failure a driver can raise happens before an external process is
//! spawned or a library call begins: bad configuration, missing tools,
//! unreadable key material. Failures after that point are never raised;
//! they are captured into the exit code and output accumulators of the
//! operation that observed them.

use std::io;
use std::path::PathBuf;

/// Exit code reported when a library-bound operation fails after it has
/// begun (connection, authentication, or the primitive itself).
///
/// Mirrors the OpenSSH client convention of exiting with 255 on transport
/// errors, so callers see one value for "the operation never produced a
/// remote status" regardless of the driver variant.
pub const INTERNAL_FAILURE_EXIT: i32 = 255;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Pre-flight failures shared by both driver variants.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// An option key outside the driver's allowlist was read or written.
    #[error("unrecognized option \"{key}\"")]
    InvalidOption {
        /// The rejected key name.
        key: String,
    },

    /// An operation was invoked without an option it cannot run without.
    #[error("required option \"{key}\" is not set")]
    MissingRequiredOption {
        /// Canonical name of the missing key.
        key: &'static str,
    },

    /// One of the client tool binaries could not be resolved.
    #[error("unable to locate the \"{binary}\" binary")]
    BinaryNotFound {
        /// Name of the tool that was searched for.
        binary: String,
    },

    /// The backing library for the requested variant is not compiled in.
    #[error("the \"{module}\" binding is not available in this build")]
    ModuleNotFound {
        /// Name of the absent binding.
        module: &'static str,
    },

    /// The configured public identity file could not be read.
    #[error("public identity file \"{}\" is not readable", path.display())]
    PublicKeyUnavailable {
        /// Path that failed the readability check.
        path: PathBuf,
    },

    /// Pseudo-terminal allocation failed while a password was configured.
    ///
    /// Password delivery relies on the askpass mechanism, which requires
    /// the terminal plumbing; without it only key-based authentication
    /// can proceed.
    #[error("pseudo-terminal allocation failed and a password is configured: {reason}")]
    PtyUnsupported {
        /// Description of the allocation failure.
        reason: String,
    },

    /// The requested operation is not offered by this driver variant.
    #[error("operation \"{operation}\" is not supported by this driver")]
    Unsupported {
        /// Name of the refused operation.
        operation: &'static str,
    },

    /// A driver name handed to the factory did not match any variant.
    #[error("unknown driver \"{name}\"")]
    UnknownDriver {
        /// The unmatched name.
        name: String,
    },

    /// A pre-flight filesystem operation failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
