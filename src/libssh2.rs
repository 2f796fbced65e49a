//! Library-bound driver over in-process libssh2 sessions.
//!
//! Every operation opens its own TCP connection, handshakes, and
//! authenticates; nothing is reused between calls, so option changes
//! always take effect on the next call. Once an operation has begun,
//! failures are folded into its result instead of raised: the call
//! returns exit code 255 with the failure message appended to the
//! stdout accumulator, matching what callers observe when an external
//! `ssh` process dies on a transport error.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;

use ssh2::Session;
use tracing::debug;

use crate::command::REMOTE_INSTALL_PROGRAM;
use crate::driver::{SshDriver, read_public_identity};
use crate::error::{DriverError, INTERNAL_FAILURE_EXIT, Result};
use crate::options::{LIBSSH2_KEYS, OptionKey, OptionStore, OptionValue};

/// Failure inside an operation that already began.
///
/// Never surfaced as a [`DriverError`]; [`capture`] folds it into the
/// operation result.
struct OperationFailure(String);

impl From<std::io::Error> for OperationFailure {
    fn from(error: std::io::Error) -> Self {
        Self(error.to_string())
    }
}

impl From<ssh2::Error> for OperationFailure {
    fn from(error: ssh2::Error) -> Self {
        Self(error.to_string())
    }
}

impl From<DriverError> for OperationFailure {
    fn from(error: DriverError) -> Self {
        Self(error.to_string())
    }
}

type OpResult<T> = std::result::Result<T, OperationFailure>;

fn capture(stdout_acc: &mut String, outcome: OpResult<i32>) -> i32 {
    match outcome {
        Ok(code) => code,
        Err(OperationFailure(message)) => {
            debug!(message = %message, "session operation failed");
            stdout_acc.push_str(&message);
            INTERNAL_FAILURE_EXIT
        }
    }
}

fn required(store: &OptionStore, key: OptionKey) -> OpResult<String> {
    Ok(store
        .string(key)?
        .ok_or(DriverError::MissingRequiredOption { key: key.as_str() })?)
}

/// Connects and authenticates a fresh session for one operation.
///
/// A configured identity file selects public-key authentication, with
/// the password doubling as the key's passphrase; otherwise password
/// authentication is attempted. Clearing `identity_file` back to null is
/// therefore how callers force password authentication.
fn open_session(store: &OptionStore) -> OpResult<Session> {
    let hostname = required(store, OptionKey::Hostname)?;
    let login = required(store, OptionKey::LoginName)?;
    let port = store.integer(OptionKey::Port)?.unwrap_or(22);
    let port =
        u16::try_from(port).map_err(|_| OperationFailure(format!("port {port} is out of range")))?;

    debug!(host = %hostname, port, "opening session");
    let stream = TcpStream::connect((hostname.as_str(), port))?;
    let mut session = Session::new()?;
    session.set_tcp_stream(stream);
    session.handshake()?;

    let password = store.string(OptionKey::Password)?;
    if let Some(identity) = store.string(OptionKey::IdentityFile)? {
        let public = store.string(OptionKey::PublicIdentityFile)?;
        session.userauth_pubkey_file(
            &login,
            public.as_deref().map(Path::new),
            Path::new(&identity),
            password.as_deref(),
        )?;
    } else {
        session.userauth_password(&login, password.as_deref().unwrap_or(""))?;
    }
    Ok(session)
}

fn exec_op(store: &OptionStore, stdout_acc: &mut String, stderr_acc: &mut String) -> OpResult<i32> {
    let command = required(store, OptionKey::Command)?;
    let session = open_session(store)?;

    let mut channel = session.channel_session()?;
    channel.exec(&command)?;

    let mut raw_stdout = Vec::new();
    channel.read_to_end(&mut raw_stdout)?;
    let mut raw_stderr = Vec::new();
    channel.stderr().read_to_end(&mut raw_stderr)?;
    channel.wait_close()?;

    stdout_acc.push_str(&String::from_utf8_lossy(&raw_stdout));
    stderr_acc.push_str(&String::from_utf8_lossy(&raw_stderr));
    Ok(channel.exit_status()?)
}

/// Runs the same remote install program the external tools pipe the key
/// through, feeding the key material over the channel's stdin.
fn copy_id_op(store: &OptionStore, key_material: &str) -> OpResult<i32> {
    let session = open_session(store)?;

    let mut channel = session.channel_session()?;
    channel.exec(REMOTE_INSTALL_PROGRAM)?;
    channel.write_all(key_material.trim().as_bytes())?;
    channel.write_all(b"\n")?;
    channel.send_eof()?;
    channel.wait_eof()?;
    channel.close()?;
    channel.wait_close()?;
    Ok(channel.exit_status()?)
}

fn send_op(store: &OptionStore) -> OpResult<i32> {
    let local = required(store, OptionKey::LocalPath)?;
    let remote = required(store, OptionKey::RemotePath)?;
    let mode = store.integer(OptionKey::CreateMode)?.unwrap_or(0o644);
    let mode = i32::try_from(mode)
        .map_err(|_| OperationFailure(format!("create mode {mode} is out of range")))?;

    let contents = fs::read(&local)?;
    let session = open_session(store)?;

    debug!(size = contents.len(), remote = %remote, "sending file");
    let mut channel = session.scp_send(Path::new(&remote), mode, contents.len() as u64, None)?;
    channel.write_all(&contents)?;
    channel.send_eof()?;
    channel.wait_eof()?;
    channel.close()?;
    channel.wait_close()?;
    Ok(0)
}

fn receive_op(store: &OptionStore) -> OpResult<i32> {
    let local = required(store, OptionKey::LocalPath)?;
    let remote = required(store, OptionKey::RemotePath)?;

    let session = open_session(store)?;
    let (mut channel, stat) = session.scp_recv(Path::new(&remote))?;

    // Read exactly the announced size: the scp stream carries protocol
    // trailer bytes after the payload.
    let size = usize::try_from(stat.size())
        .map_err(|_| OperationFailure(format!("remote file size {} is too large", stat.size())))?;
    debug!(size, remote = %remote, "receiving file");
    let mut contents = vec![0_u8; size];
    channel.read_exact(&mut contents)?;

    channel.send_eof()?;
    channel.wait_eof()?;
    channel.close()?;
    channel.wait_close()?;

    fs::write(&local, &contents)?;
    Ok(0)
}

/// Driver variant backed by in-process libssh2 sessions.
pub struct LibSsh2Driver {
    options: OptionStore,
}

impl LibSsh2Driver {
    /// Creates the driver, validating the constructor options against
    /// this variant's allowlist.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidOption`] for keys outside the allowlist.
    pub fn new(options: &[(OptionKey, OptionValue)]) -> Result<Self> {
        let mut store = OptionStore::new(LIBSSH2_KEYS);
        store.apply(options)?;
        Ok(Self { options: store })
    }
}

impl SshDriver for LibSsh2Driver {
    fn ssh_exec(
        &mut self,
        stdout: &mut String,
        stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32> {
        self.options.apply(overrides)?;
        let outcome = exec_op(&self.options, stdout, stderr);
        Ok(capture(stdout, outcome))
    }

    fn ssh_copy_id(
        &mut self,
        stdout: &mut String,
        _stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32> {
        self.options.apply(overrides)?;
        let key_material = read_public_identity(&self.options)?;
        let outcome = copy_id_op(&self.options, &key_material);
        Ok(capture(stdout, outcome))
    }

    fn ssh_keygen(
        &mut self,
        _stdout: &mut String,
        _stderr: &mut String,
        _overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32> {
        Err(DriverError::Unsupported {
            operation: "ssh_keygen",
        })
    }

    fn scp_send(
        &mut self,
        stdout: &mut String,
        _stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32> {
        self.options.apply(overrides)?;
        let outcome = send_op(&self.options);
        Ok(capture(stdout, outcome))
    }

    fn scp_receive(
        &mut self,
        stdout: &mut String,
        _stderr: &mut String,
        overrides: &[(OptionKey, OptionValue)],
    ) -> Result<i32> {
        self.options.apply(overrides)?;
        let outcome = receive_op(&self.options);
        Ok(capture(stdout, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 127.0.0.1:1 refuses connections, so operations that reach the
    // transport fail fast without real network traffic.
    fn refused_endpoint() -> Vec<(OptionKey, OptionValue)> {
        vec![
            (OptionKey::Hostname, "127.0.0.1".into()),
            (OptionKey::Port, OptionValue::Int(1)),
            (OptionKey::LoginName, "nobody".into()),
        ]
    }

    #[test]
    fn constructor_rejects_keys_outside_the_allowlist() {
        let built = LibSsh2Driver::new(&[(OptionKey::Bits, OptionValue::Int(4096))]);
        assert!(matches!(
            built,
            Err(DriverError::InvalidOption { ref key }) if key == "bits"
        ));
    }

    #[test]
    fn keygen_is_refused() {
        let mut driver = LibSsh2Driver::new(&[]).unwrap();
        let (mut out, mut err) = (String::new(), String::new());
        assert!(matches!(
            driver.ssh_keygen(&mut out, &mut err, &[]),
            Err(DriverError::Unsupported {
                operation: "ssh_keygen"
            })
        ));
    }

    #[test]
    fn copy_id_preconditions_are_raised_not_captured() {
        let mut driver = LibSsh2Driver::new(&refused_endpoint()).unwrap();
        let (mut out, mut err) = (String::new(), String::new());

        assert!(matches!(
            driver.ssh_copy_id(&mut out, &mut err, &[]),
            Err(DriverError::MissingRequiredOption {
                key: "public_identity_file"
            })
        ));

        let unreadable = driver.ssh_copy_id(
            &mut out,
            &mut err,
            &[(OptionKey::PublicIdentityFile, "/missing/id.pub".into())],
        );
        assert!(matches!(
            unreadable,
            Err(DriverError::PublicKeyUnavailable { .. })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn missing_command_is_captured_into_the_result() {
        let mut driver = LibSsh2Driver::new(&refused_endpoint()).unwrap();
        let (mut out, mut err) = (String::new(), String::new());

        let code = driver.ssh_exec(&mut out, &mut err, &[]).unwrap();
        assert_eq!(code, INTERNAL_FAILURE_EXIT);
        assert!(out.contains("command"));
        assert!(err.is_empty());
    }

    #[test]
    fn connection_failures_are_captured_into_the_result() {
        let mut driver = LibSsh2Driver::new(&refused_endpoint()).unwrap();
        let (mut out, mut err) = (String::new(), String::new());

        let code = driver
            .ssh_exec(&mut out, &mut err, &[(OptionKey::Command, "true".into())])
            .unwrap();
        assert_eq!(code, INTERNAL_FAILURE_EXIT);
        assert!(!out.is_empty());
    }

    #[test]
    fn per_call_overrides_persist_on_the_driver() {
        let mut driver = LibSsh2Driver::new(&refused_endpoint()).unwrap();

        // The override carries the call past the command check into the
        // transport, which refuses.
        let (mut out, mut err) = (String::new(), String::new());
        let code = driver
            .ssh_exec(&mut out, &mut err, &[(OptionKey::Command, "true".into())])
            .unwrap();
        assert_eq!(code, INTERNAL_FAILURE_EXIT);
        assert!(!out.contains("command"));

        // The command stays on the driver, so the bare repeat clears the
        // same check and fails at the transport again.
        let (mut out, mut err) = (String::new(), String::new());
        let code = driver.ssh_exec(&mut out, &mut err, &[]).unwrap();
        assert_eq!(code, INTERNAL_FAILURE_EXIT);
        assert!(!out.contains("command"));
        assert!(!out.is_empty());

        // An explicit Null unsets it again.
        let (mut out, mut err) = (String::new(), String::new());
        let code = driver
            .ssh_exec(&mut out, &mut err, &[(OptionKey::Command, OptionValue::Null)])
            .unwrap();
        assert_eq!(code, INTERNAL_FAILURE_EXIT);
        assert!(out.contains("command"));
    }

    #[test]
    fn send_requires_both_paths() {
        let mut driver = LibSsh2Driver::new(&refused_endpoint()).unwrap();
        let (mut out, mut err) = (String::new(), String::new());

        let code = driver.scp_send(&mut out, &mut err, &[]).unwrap();
        assert_eq!(code, INTERNAL_FAILURE_EXIT);
        assert!(out.contains("local_path"));
    }

    #[test]
    fn send_surfaces_an_unreadable_local_file() {
        let mut driver = LibSsh2Driver::new(&refused_endpoint()).unwrap();
        let (mut out, mut err) = (String::new(), String::new());

        let code = driver
            .scp_send(
                &mut out,
                &mut err,
                &[
                    (OptionKey::LocalPath, "/missing/payload".into()),
                    (OptionKey::RemotePath, "/tmp/payload".into()),
                ],
            )
            .unwrap();
        assert_eq!(code, INTERNAL_FAILURE_EXIT);
        assert!(!out.is_empty());
    }
}
