//! Allowlisted configuration store shared by the drivers.
//!
//! Each driver variant understands a fixed set of keys. Reads and writes
//! outside that set fail with [`DriverError::InvalidOption`] instead of
//! being silently accepted or ignored, and unset keys resolve documented
//! defaults. Values are loosely typed in the style of the wire format;
//! the typed readers perform the small coercions the command builders
//! rely on (numeric strings, `y`/`yes` truthiness, bare strings as
//! one-element lists).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{DriverError, Result};

/// Canonical configuration keys understood by at least one driver variant.
///
/// The wire name of each key (used for parsing and diagnostics) is given
/// by [`OptionKey::as_str`]; most are the snake_case variant name, but
/// [`OptionKey::SshOption`] goes by `option` and [`OptionKey::KeyType`]
/// by `type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptionKey {
    /// Remote host to contact.
    Hostname,
    /// Account name on the remote host.
    LoginName,
    /// Password delivered through the askpass helper or library auth.
    Password,
    /// TCP port of the remote SSH service.
    Port,
    /// Private identity (key) file used for authentication.
    IdentityFile,
    /// Public identity file installed by the copy-id operation.
    PublicIdentityFile,
    /// Command to run remotely, or a local script file to feed to the tool.
    Command,
    /// Local filesystem path for transfers.
    LocalPath,
    /// Remote filesystem path for transfers.
    RemotePath,
    /// Directory holding the OpenSSH client tools, overriding `PATH`.
    BinaryPath,
    /// Extra `-o` client configuration directives.
    SshOption,
    /// Transfer directories recursively.
    Recursive,
    /// Bandwidth cap for transfers, in Kbit/s.
    Limit,
    /// Quiet flag for key generation.
    Silence,
    /// Bit length of a newly generated key.
    Bits,
    /// Algorithm of a newly generated key.
    KeyType,
    /// Passphrase applied to a newly generated key.
    NewPassphrase,
    /// Comment embedded in a newly generated key.
    Comment,
    /// Destination file of a newly generated key.
    OutputKeyfile,
    /// Answer the key generation overwrite prompt positively.
    OverwriteExistingKey,
    /// Permissions applied to files uploaded by the library variant.
    CreateMode,
}

impl OptionKey {
    const ALL: &'static [Self] = &[
        Self::Hostname,
        Self::LoginName,
        Self::Password,
        Self::Port,
        Self::IdentityFile,
        Self::PublicIdentityFile,
        Self::Command,
        Self::LocalPath,
        Self::RemotePath,
        Self::BinaryPath,
        Self::SshOption,
        Self::Recursive,
        Self::Limit,
        Self::Silence,
        Self::Bits,
        Self::KeyType,
        Self::NewPassphrase,
        Self::Comment,
        Self::OutputKeyfile,
        Self::OverwriteExistingKey,
        Self::CreateMode,
    ];

    /// Canonical wire name of the key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hostname => "hostname",
            Self::LoginName => "login_name",
            Self::Password => "password",
            Self::Port => "port",
            Self::IdentityFile => "identity_file",
            Self::PublicIdentityFile => "public_identity_file",
            Self::Command => "command",
            Self::LocalPath => "local_path",
            Self::RemotePath => "remote_path",
            Self::BinaryPath => "binary_path",
            Self::SshOption => "option",
            Self::Recursive => "recursive",
            Self::Limit => "limit",
            Self::Silence => "silence",
            Self::Bits => "bits",
            Self::KeyType => "type",
            Self::NewPassphrase => "new_passphrase",
            Self::Comment => "comment",
            Self::OutputKeyfile => "output_keyfile",
            Self::OverwriteExistingKey => "overwrite_existing_key",
            Self::CreateMode => "create_mode",
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKey {
    type Err = DriverError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == name)
            .ok_or_else(|| DriverError::InvalidOption {
                key: name.to_owned(),
            })
    }
}

/// A configuration value in the loosely typed style of the wire format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionValue {
    /// Free-form text.
    Str(String),
    /// Signed integer.
    Int(i64),
    /// Boolean flag.
    Bool(bool),
    /// Repeated string values.
    List(Vec<String>),
    /// Explicitly unset; assigning it clears the key back to its default.
    Null,
}

impl OptionValue {
    fn to_text(&self) -> Option<String> {
        match self {
            Self::Str(text) => Some(text.clone()),
            Self::Int(number) => Some(number.to_string()),
            Self::Bool(_) | Self::List(_) | Self::Null => None,
        }
    }

    fn to_integer(&self) -> Option<i64> {
        match self {
            Self::Int(number) => Some(*number),
            Self::Str(text) => text.trim().parse().ok(),
            Self::Bool(_) | Self::List(_) | Self::Null => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Self::Bool(flag) => *flag,
            Self::Int(number) => *number != 0,
            Self::Str(text) => {
                matches!(
                    text.to_ascii_lowercase().as_str(),
                    "y" | "yes" | "true" | "1"
                )
            }
            Self::List(_) | Self::Null => false,
        }
    }

    fn to_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            Self::Str(text) => vec![text.clone()],
            Self::Int(_) | Self::Bool(_) | Self::Null => Vec::new(),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Allowlist of the OpenSSH (external tool) driver.
pub(crate) const OPENSSH_KEYS: &[OptionKey] = &[
    OptionKey::Hostname,
    OptionKey::LoginName,
    OptionKey::Password,
    OptionKey::Port,
    OptionKey::IdentityFile,
    OptionKey::PublicIdentityFile,
    OptionKey::Command,
    OptionKey::LocalPath,
    OptionKey::RemotePath,
    OptionKey::BinaryPath,
    OptionKey::SshOption,
    OptionKey::Recursive,
    OptionKey::Limit,
    OptionKey::Silence,
    OptionKey::Bits,
    OptionKey::KeyType,
    OptionKey::NewPassphrase,
    OptionKey::Comment,
    OptionKey::OutputKeyfile,
    OptionKey::OverwriteExistingKey,
];

/// Allowlist of the LibSSH2 (library binding) driver.
pub(crate) const LIBSSH2_KEYS: &[OptionKey] = &[
    OptionKey::Hostname,
    OptionKey::LoginName,
    OptionKey::Password,
    OptionKey::Port,
    OptionKey::IdentityFile,
    OptionKey::PublicIdentityFile,
    OptionKey::Command,
    OptionKey::LocalPath,
    OptionKey::RemotePath,
    OptionKey::CreateMode,
];

/// Default resolved when a key has no assigned value.
fn default_for(key: OptionKey) -> OptionValue {
    match key {
        OptionKey::Port => OptionValue::Int(22),
        OptionKey::NewPassphrase => OptionValue::Str(String::new()),
        OptionKey::CreateMode => OptionValue::Int(0o644),
        _ => OptionValue::Null,
    }
}

/// Allowlisted option storage for one driver instance.
///
/// The allowlist is fixed at construction; the stored values are whatever
/// the caller assigned through [`set`](Self::set) or
/// [`apply`](Self::apply). Reads fall back to the per-key defaults.
#[derive(Clone, Debug)]
pub struct OptionStore {
    allowed: &'static [OptionKey],
    values: HashMap<OptionKey, OptionValue>,
}

impl OptionStore {
    pub(crate) fn new(allowed: &'static [OptionKey]) -> Self {
        Self {
            allowed,
            values: HashMap::new(),
        }
    }

    fn check(&self, key: OptionKey) -> Result<()> {
        if self.allowed.contains(&key) {
            Ok(())
        } else {
            Err(DriverError::InvalidOption {
                key: key.as_str().to_owned(),
            })
        }
    }

    /// Assigns a value to a key.
    ///
    /// Assigning [`OptionValue::Null`] removes any stored value so reads
    /// resolve the default again.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidOption`] when the key is outside this
    /// store's allowlist.
    pub fn set(&mut self, key: OptionKey, value: OptionValue) -> Result<()> {
        self.check(key)?;
        if matches!(value, OptionValue::Null) {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value);
        }
        Ok(())
    }

    /// Reads the stored value for a key, or its default when unset.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidOption`] when the key is outside this
    /// store's allowlist.
    pub fn get(&self, key: OptionKey) -> Result<OptionValue> {
        self.check(key)?;
        Ok(self
            .values
            .get(&key)
            .cloned()
            .unwrap_or_else(|| default_for(key)))
    }

    /// Merges a sequence of key/value pairs through [`set`](Self::set).
    ///
    /// # Errors
    ///
    /// Fails on the first pair whose key is outside the allowlist; pairs
    /// before it stay applied.
    pub fn apply(&mut self, pairs: &[(OptionKey, OptionValue)]) -> Result<()> {
        for (key, value) in pairs {
            self.set(*key, value.clone())?;
        }
        Ok(())
    }

    /// Reads a key as text, rendering integers decimally.
    pub(crate) fn string(&self, key: OptionKey) -> Result<Option<String>> {
        Ok(self.get(key)?.to_text())
    }

    /// Reads a key as an integer, parsing numeric strings.
    pub(crate) fn integer(&self, key: OptionKey) -> Result<Option<i64>> {
        Ok(self.get(key)?.to_integer())
    }

    /// Reads a key as a flag; unset keys are false.
    pub(crate) fn boolean(&self, key: OptionKey) -> Result<bool> {
        Ok(self.get(key)?.truthy())
    }

    /// Reads a key as a list; bare strings become one-element lists and
    /// unset keys are empty.
    pub(crate) fn list(&self, key: OptionKey) -> Result<Vec<String>> {
        Ok(self.get(key)?.to_list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openssh_store() -> OptionStore {
        OptionStore::new(OPENSSH_KEYS)
    }

    #[test]
    fn unknown_key_is_rejected_on_write_and_read() {
        let mut store = OptionStore::new(LIBSSH2_KEYS);

        let written = store.set(OptionKey::Bits, OptionValue::Int(4096));
        assert!(matches!(
            written,
            Err(DriverError::InvalidOption { ref key }) if key == "bits"
        ));

        let read = store.get(OptionKey::BinaryPath);
        assert!(matches!(
            read,
            Err(DriverError::InvalidOption { ref key }) if key == "binary_path"
        ));
    }

    #[test]
    fn port_defaults_to_twenty_two_on_both_variants() {
        for allowed in [OPENSSH_KEYS, LIBSSH2_KEYS] {
            let store = OptionStore::new(allowed);
            assert_eq!(store.get(OptionKey::Port).unwrap(), OptionValue::Int(22));
        }
    }

    #[test]
    fn assigned_values_shadow_defaults() {
        let mut store = openssh_store();
        store.set(OptionKey::Port, OptionValue::Int(2222)).unwrap();
        assert_eq!(store.integer(OptionKey::Port).unwrap(), Some(2222));
    }

    #[test]
    fn null_assignment_restores_the_default() {
        let mut store = openssh_store();
        store
            .set(OptionKey::IdentityFile, OptionValue::from("/home/u/.ssh/id"))
            .unwrap();
        store.set(OptionKey::IdentityFile, OptionValue::Null).unwrap();
        assert_eq!(store.get(OptionKey::IdentityFile).unwrap(), OptionValue::Null);

        store.set(OptionKey::Port, OptionValue::Int(2022)).unwrap();
        store.set(OptionKey::Port, OptionValue::Null).unwrap();
        assert_eq!(store.integer(OptionKey::Port).unwrap(), Some(22));
    }

    #[test]
    fn apply_merges_pairs_in_order() {
        let mut store = openssh_store();
        store
            .apply(&[
                (OptionKey::Hostname, OptionValue::from("a.example")),
                (OptionKey::Hostname, OptionValue::from("b.example")),
                (OptionKey::Port, OptionValue::Int(2200)),
            ])
            .unwrap();
        assert_eq!(
            store.string(OptionKey::Hostname).unwrap().as_deref(),
            Some("b.example")
        );
        assert_eq!(store.integer(OptionKey::Port).unwrap(), Some(2200));
    }

    #[test]
    fn wire_names_round_trip_through_from_str() {
        for key in OptionKey::ALL {
            assert_eq!(*key, key.as_str().parse().unwrap());
        }
        // The two names that do not follow the variant spelling.
        assert_eq!("option".parse::<OptionKey>().unwrap(), OptionKey::SshOption);
        assert_eq!("type".parse::<OptionKey>().unwrap(), OptionKey::KeyType);
        assert!(matches!(
            "colour".parse::<OptionKey>(),
            Err(DriverError::InvalidOption { ref key }) if key == "colour"
        ));
    }

    #[test]
    fn integer_reader_parses_numeric_strings() {
        let mut store = openssh_store();
        store.set(OptionKey::Port, OptionValue::from("2222")).unwrap();
        assert_eq!(store.integer(OptionKey::Port).unwrap(), Some(2222));

        store.set(OptionKey::Port, OptionValue::from("not a port")).unwrap();
        assert_eq!(store.integer(OptionKey::Port).unwrap(), None);
    }

    #[test]
    fn boolean_reader_accepts_wire_truthiness() {
        let mut store = openssh_store();
        assert!(!store.boolean(OptionKey::Recursive).unwrap());

        for value in [
            OptionValue::from(true),
            OptionValue::Int(1),
            OptionValue::from("y"),
            OptionValue::from("Yes"),
            OptionValue::from("true"),
            OptionValue::from("1"),
        ] {
            store.set(OptionKey::Recursive, value).unwrap();
            assert!(store.boolean(OptionKey::Recursive).unwrap());
        }

        for value in [
            OptionValue::from(false),
            OptionValue::Int(0),
            OptionValue::from("n"),
            OptionValue::from("no"),
        ] {
            store.set(OptionKey::Recursive, value).unwrap();
            assert!(!store.boolean(OptionKey::Recursive).unwrap());
        }
    }

    #[test]
    fn list_reader_promotes_bare_strings() {
        let mut store = openssh_store();
        assert!(store.list(OptionKey::SshOption).unwrap().is_empty());

        store
            .set(OptionKey::SshOption, OptionValue::from("BatchMode=yes"))
            .unwrap();
        assert_eq!(
            store.list(OptionKey::SshOption).unwrap(),
            vec!["BatchMode=yes".to_owned()]
        );

        store
            .set(
                OptionKey::SshOption,
                OptionValue::from(vec![
                    "BatchMode=yes".to_owned(),
                    "StrictHostKeyChecking=no".to_owned(),
                ]),
            )
            .unwrap();
        assert_eq!(store.list(OptionKey::SshOption).unwrap().len(), 2);
    }

    #[test]
    fn string_reader_renders_integers() {
        let mut store = openssh_store();
        store.set(OptionKey::Bits, OptionValue::Int(4096)).unwrap();
        assert_eq!(
            store.string(OptionKey::Bits).unwrap().as_deref(),
            Some("4096")
        );
    }

    #[test]
    fn new_passphrase_defaults_to_the_empty_string() {
        let store = openssh_store();
        assert_eq!(
            store.string(OptionKey::NewPassphrase).unwrap().as_deref(),
            Some("")
        );
    }

    #[test]
    fn create_mode_defaults_to_group_readable() {
        let store = OptionStore::new(LIBSSH2_KEYS);
        assert_eq!(store.integer(OptionKey::CreateMode).unwrap(), Some(0o644));
    }
}
