//! Ephemeral askpass helper script for password delivery.
//!
//! The OpenSSH tools never receive the password as an argument. Instead a
//! throwaway owner-only script prints it when the tool, detached from its
//! terminal and pointed at the script through `SSH_ASKPASS`, asks for one.
//! The script lives exactly as long as its handle: a fresh one is written
//! for every password-bearing call and the last one is removed when the
//! driver goes away.

use std::fs;
use std::io::Write;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use tempfile::NamedTempFile;
use zeroize::Zeroizing;

use crate::command::shell_quote;
use crate::error::Result;

/// RAII handle over the helper script; dropping it deletes the file.
#[derive(Debug)]
pub(crate) struct AskpassScript {
    file: NamedTempFile,
}

impl AskpassScript {
    /// Writes a fresh helper script that prints `password`.
    ///
    /// The file starts out owner-read/write and is narrowed to owner-only
    /// execute permissions before the password is written, so it never
    /// holds the secret while readable by anyone else.
    pub(crate) fn create(password: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("askpass-")
            .suffix(".sh")
            .tempfile()?;

        #[cfg(unix)]
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o700))?;

        let quoted = Zeroizing::new(shell_quote(password));
        let body = Zeroizing::new(format!("#!/bin/sh\nprintf '%s\\n' {} < /dev/null\n", *quoted));
        file.write_all(body.as_bytes())?;
        file.flush()?;

        Ok(Self { file })
    }

    /// Path handed to the tools through `SSH_ASKPASS`.
    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }
}
