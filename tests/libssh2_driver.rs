#![cfg(feature = "libssh2")]

//! Library-variant coverage. The offline tests run everywhere; the live
//! tests only run when `SSH2_KIT_TEST_HOST`, `SSH2_KIT_TEST_LOGIN`, and
//! `SSH2_KIT_TEST_PASSWORD` point at a disposable SSH account, and skip
//! silently otherwise.

use std::fs;
use std::io::Write;

use ssh2_kit::{DriverError, DriverKind, OptionKey, OptionValue, create_driver};

fn live_options() -> Option<Vec<(OptionKey, OptionValue)>> {
    let host = std::env::var("SSH2_KIT_TEST_HOST").ok()?;
    let login = std::env::var("SSH2_KIT_TEST_LOGIN").ok()?;
    let password = std::env::var("SSH2_KIT_TEST_PASSWORD").ok()?;

    // Session diagnostics for live runs, filtered through RUST_LOG.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let mut options = vec![
        (OptionKey::Hostname, OptionValue::Str(host)),
        (OptionKey::LoginName, OptionValue::Str(login)),
        (OptionKey::Password, OptionValue::Str(password)),
    ];
    if let Some(port) = std::env::var("SSH2_KIT_TEST_PORT")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
    {
        options.push((OptionKey::Port, OptionValue::Int(port)));
    }
    Some(options)
}

#[test]
fn keygen_is_not_offered_by_the_library_variant() {
    let mut driver = create_driver(DriverKind::LibSsh2, &[]).unwrap();
    let (mut out, mut err) = (String::new(), String::new());
    assert!(matches!(
        driver.ssh_keygen(&mut out, &mut err, &[]),
        Err(DriverError::Unsupported {
            operation: "ssh_keygen"
        })
    ));
}

#[test]
fn the_library_variant_rejects_tool_only_options() {
    let rejected = create_driver(
        DriverKind::LibSsh2,
        &[(OptionKey::Silence, OptionValue::Bool(true))],
    );
    assert!(matches!(
        rejected,
        Err(DriverError::InvalidOption { ref key }) if key == "silence"
    ));
}

#[test]
fn live_exec_reports_real_exit_codes_and_separates_streams() {
    let Some(options) = live_options() else {
        return;
    };
    let mut driver = create_driver(DriverKind::LibSsh2, &options).unwrap();

    let (mut out, mut err) = (String::new(), String::new());
    let code = driver
        .ssh_exec(
            &mut out,
            &mut err,
            &[(
                OptionKey::Command,
                OptionValue::Str("echo visible; echo hidden 1>&2; exit 5".to_owned()),
            )],
        )
        .unwrap();

    assert_eq!(code, 5);
    assert!(out.contains("visible"));
    assert!(!out.contains("hidden"));
    assert!(err.contains("hidden"));
}

#[test]
fn live_transfer_round_trips_file_contents() {
    let Some(options) = live_options() else {
        return;
    };
    let mut driver = create_driver(DriverKind::LibSsh2, &options).unwrap();

    let payload = b"line one\nline two\n";
    let mut local = tempfile::NamedTempFile::new().unwrap();
    local.write_all(payload).unwrap();

    let remote = format!("/tmp/ssh2-kit-roundtrip-{}", std::process::id());
    let fetched = tempfile::TempDir::new().unwrap();
    let fetched_path = fetched.path().join("fetched");

    let (mut out, mut err) = (String::new(), String::new());
    let sent = driver
        .scp_send(
            &mut out,
            &mut err,
            &[
                (
                    OptionKey::LocalPath,
                    OptionValue::Str(local.path().to_string_lossy().into_owned()),
                ),
                (OptionKey::RemotePath, OptionValue::Str(remote.clone())),
            ],
        )
        .unwrap();
    assert_eq!(sent, 0, "upload failed: {out}");

    let received = driver
        .scp_receive(
            &mut out,
            &mut err,
            &[
                (OptionKey::RemotePath, OptionValue::Str(remote.clone())),
                (
                    OptionKey::LocalPath,
                    OptionValue::Str(fetched_path.to_string_lossy().into_owned()),
                ),
            ],
        )
        .unwrap();
    assert_eq!(received, 0, "download failed: {out}");
    assert_eq!(fs::read(&fetched_path).unwrap(), payload);

    // Best-effort remote cleanup.
    let _ = driver.ssh_exec(
        &mut out,
        &mut err,
        &[(
            OptionKey::Command,
            OptionValue::Str(format!("rm -f {remote}")),
        )],
    );
}
