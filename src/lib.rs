#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `ssh2_kit` drives remote SSH operations (command execution, public-key
//! installation, keypair generation, and file transfer) through one uniform
//! driver surface with two interchangeable implementations. The OpenSSH
//! variant shells out to the locally installed `ssh`, `scp`, and
//! `ssh-keygen` tools, delivering passwords through an ephemeral askpass
//! helper and draining the tools through pseudo-terminals. The LibSSH2
//! variant performs the same operations in process through the `ssh2`
//! binding, opening one session per call. Callers pick a variant at
//! runtime and use the rest of the crate identically.
//!
//! # Design
//!
//! - [`create_driver`] builds a boxed [`SshDriver`] from a [`DriverKind`]
//!   and a list of constructor options. Every operation accepts further
//!   option overrides, which merge into the driver's options and stay in
//!   effect for later calls.
//! - Options are typed: [`OptionKey`] enumerates every recognised key,
//!   [`OptionValue`] the value shapes, and each variant accepts its own
//!   allowlist subset. Assigning [`OptionValue::Null`] clears a key back
//!   to its default, which is how callers reset `identity_file` to force
//!   password authentication.
//! - Operations report like processes: captured stdout and stderr are
//!   appended to caller-supplied accumulators and the exit status is
//!   returned. Failures after an operation has begun are folded into
//!   that report rather than raised; [`DriverError`] is reserved for
//!   problems detected before anything launches.
//!
//! # Invariants
//!
//! - Passwords never appear on a command line or in a process
//!   environment. The external-tool variant writes them to a short-lived
//!   helper script whose permissions are narrowed before the secret is
//!   written, and which is deleted when the driver is dropped or the
//!   next call replaces it.
//! - Option overrides pass the same allowlist validation as constructor
//!   options; a rejected override raises before anything launches.
//! - Every value interpolated into a generated command line is
//!   shell-escaped; the remote command text supplied by the caller is
//!   the single deliberate exception.
//!
//! # Errors
//!
//! All operations return [`Result`]. [`DriverError`] covers unrecognised
//! or missing options, unresolvable client tools, an absent library
//! binding, unreadable public key material, failed pseudo-terminal
//! allocation while a password is configured, and operations a variant
//! does not offer. Failures inside a launched operation surface as exit
//! code [`INTERNAL_FAILURE_EXIT`] with the message in the stdout
//! accumulator.
//!
//! # Examples
//!
//! Variant selection and option validation, with no remote host
//! involved:
//!
//! ```
//! use ssh2_kit::{DriverError, DriverKind, OptionKey, OptionValue, create_driver};
//!
//! let kind: DriverKind = "openssh".parse().unwrap();
//! assert_eq!(kind, DriverKind::OpenSsh);
//!
//! // create_mode belongs to the library variant's allowlist only.
//! let rejected = create_driver(kind, &[(OptionKey::CreateMode, OptionValue::Int(0o600))]);
//! assert!(matches!(rejected, Err(DriverError::InvalidOption { .. })));
//! ```
//!
//! Running a remote command through the external tools:
//!
//! ```no_run
//! use ssh2_kit::{DriverKind, OptionKey, create_driver};
//!
//! # fn demo() -> ssh2_kit::Result<()> {
//! let mut driver = create_driver(
//!     DriverKind::OpenSsh,
//!     &[
//!         (OptionKey::Hostname, "build.example.net".into()),
//!         (OptionKey::LoginName, "deploy".into()),
//!         (OptionKey::IdentityFile, "/home/deploy/.ssh/id_ed25519".into()),
//!     ],
//! )?;
//!
//! let mut stdout = String::new();
//! let mut stderr = String::new();
//! let code = driver.ssh_exec(
//!     &mut stdout,
//!     &mut stderr,
//!     &[(OptionKey::Command, "uptime".into())],
//! )?;
//! println!("exit {code}: {stdout}");
//! # Ok(())
//! # }
//! ```
//!
//! # See also
//!
//! - [`ssh2`](https://docs.rs/ssh2/latest/ssh2/) for the library binding
//!   behind the LibSSH2 variant.
//! - The OpenSSH [`ssh(1)`](https://man.openbsd.org/ssh.1),
//!   [`scp(1)`](https://man.openbsd.org/scp.1), and
//!   [`ssh-keygen(1)`](https://man.openbsd.org/ssh-keygen.1) manuals for
//!   the flags the external-tool variant assembles.

mod askpass;
mod binary;
mod command;
mod driver;
mod error;
mod openssh;
mod options;
mod pty;

#[cfg(feature = "libssh2")]
mod libssh2;

pub use driver::{DriverKind, SshDriver, create_driver};
pub use error::{DriverError, INTERNAL_FAILURE_EXIT, Result};
pub use openssh::OpenSshDriver;
pub use options::{OptionKey, OptionValue};

#[cfg(feature = "libssh2")]
pub use libssh2::LibSsh2Driver;
